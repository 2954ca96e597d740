use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};
use validator::Validate;

use crate::error::{Error, Result};
use crate::middleware::AuthUser;
use crate::services::payment::{verify_webhook_signature, SessionMetadata};
use crate::services::reconcile::{PaymentSignal, ReconcileOutcome, ReportedStatus};
use crate::AppState;

const SIGNATURE_HEADER: &str = "x-checkout-signature";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payment/checkout", post(create_checkout))
        .route("/payment/retry/{booking_id}", post(retry_checkout))
        .route("/payment/verify", get(verify_session))
        .route("/payment/webhook", post(webhook))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateCheckoutRequest {
    show_id: i64,
    #[validate(length(min = 1, max = 5, message = "between 1 and 5 seats per booking"))]
    seat_ids: Vec<i64>,
}

/// POST /api/payment/checkout
///
/// Opens a checkout session for seats the buyer currently holds and records
/// the pending booking behind it.
async fn create_checkout(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<impl IntoResponse> {
    req.validate()
        .map_err(|e| Error::BadRequest(e.to_string()))?;

    let (booking, session) = state
        .bookings
        .open_pending(user.user_id, &user.email, req.show_id, &req.seat_ids)
        .await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "bookingId": booking.id,
            "sessionId": session.id,
            "url": session.url,
        })),
    ))
}

/// POST /api/payment/retry/{booking_id}
///
/// New session for an abandoned pending booking; same booking row.
async fn retry_checkout(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(booking_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let (booking, session) = state
        .bookings
        .retry_pending(booking_id, user.user_id, &user.email)
        .await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "bookingId": booking.id,
            "sessionId": session.id,
            "url": session.url,
        })),
    ))
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    session_id: String,
}

/// GET /api/payment/verify?session_id=...
///
/// The pull half of confirmation: the buyer's client lands back from
/// checkout and asks us to reconcile right now instead of waiting for the
/// provider's webhook.
async fn verify_session(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<VerifyQuery>,
) -> Result<impl IntoResponse> {
    let session = state
        .gateway
        .session_state(&query.session_id)
        .await
        .map_err(|e| Error::Gateway(e.to_string()))?;

    let booking_hint = session.metadata.as_ref().and_then(|m| m.booking_id);
    let booking = match state
        .stores
        .bookings
        .find_by_session_ref(&query.session_id)
        .await?
    {
        Some(b) => Some(b),
        None => match booking_hint {
            Some(id) => state.stores.bookings.find(id).await?,
            None => None,
        },
    }
    .ok_or(Error::NotFound("booking"))?;

    if booking.buyer_id != user.user_id {
        return Err(Error::Forbidden("booking"));
    }

    let outcome = state
        .reconciler
        .apply(PaymentSignal {
            session_ref: query.session_id.clone(),
            booking_hint,
            status: ReportedStatus::from_provider(&session.payment_status),
        })
        .await?;
    if outcome == ReconcileOutcome::Confirmed {
        state.cache.invalidate_seats(booking.show_id).await;
    }

    let settled = state
        .stores
        .bookings
        .find(booking.id)
        .await?
        .unwrap_or(booking);
    Ok((
        StatusCode::OK,
        Json(json!({
            "bookingId": settled.id,
            "status": settled.status,
            "paymentStatus": session.payment_status,
        })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload {
    session_id: String,
    payment_status: String,
    #[serde(default)]
    metadata: Option<SessionMetadata>,
}

/// POST /api/payment/webhook
///
/// The push half of confirmation. Returns 200 for anything authentic,
/// including events we do not track; reconciliation trouble is logged, not
/// bounced back to the provider for endless redelivery.
async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !verify_webhook_signature(&state.config.checkout.webhook_secret, &body, signature) {
        warn!("webhook rejected: bad signature");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "received": false })),
        );
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("webhook rejected: unparseable body: {e}");
            return (StatusCode::BAD_REQUEST, Json(json!({ "received": false })));
        }
    };

    let show_id = payload.metadata.as_ref().map(|m| m.show_id);
    let signal = PaymentSignal {
        session_ref: payload.session_id,
        booking_hint: payload.metadata.as_ref().and_then(|m| m.booking_id),
        status: ReportedStatus::from_provider(&payload.payment_status),
    };

    match state.reconciler.apply(signal).await {
        Ok(ReconcileOutcome::Confirmed) => {
            if let Some(show_id) = show_id {
                state.cache.invalidate_seats(show_id).await;
            }
        }
        Ok(_) => {}
        Err(e) => error!("webhook reconciliation failed: {e}"),
    }

    (StatusCode::OK, Json(json!({ "received": true })))
}
