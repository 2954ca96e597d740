use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::error::{Error, Result};
use crate::middleware::AuthUser;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/seats/show/{show_id}", get(get_seats_by_show))
        .route("/seats/hold", post(hold_seats))
        .route("/seats/release", post(release_seats))
}

/// GET /api/seats/show/{show_id}
///
/// Sweeps the show's lapsed holds first so the listed availability is not
/// stale-but-unswept, then serves the seat list through the cache.
async fn get_seats_by_show(
    State(state): State<Arc<AppState>>,
    Path(show_id): Path<i64>,
) -> Result<impl IntoResponse> {
    if state.stores.shows.find(show_id).await?.is_none() {
        return Err(Error::NotFound("show"));
    }

    let released = state.reservations.sweep_show(show_id, Utc::now()).await?;
    if !released.is_empty() {
        state.cache.invalidate_seats(show_id).await;
    }

    let seats = state.cache.get_seats(show_id).await?;
    Ok((StatusCode::OK, Json(seats)))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct HoldSeatsRequest {
    show_id: i64,
    #[validate(length(min = 1, max = 5, message = "between 1 and 5 seats per request"))]
    seat_ids: Vec<i64>,
}

/// POST /api/seats/hold
async fn hold_seats(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<HoldSeatsRequest>,
) -> Result<impl IntoResponse> {
    req.validate()
        .map_err(|e| Error::BadRequest(e.to_string()))?;

    let reserved_until = state
        .reservations
        .hold(req.show_id, &req.seat_ids, user.user_id)
        .await?;
    state.cache.invalidate_seats(req.show_id).await;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "Seats reserved for 5 minutes",
            "reservedUntil": reserved_until,
        })),
    ))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct ReleaseSeatsRequest {
    show_id: i64,
    #[validate(length(min = 1, message = "seatIds must not be empty"))]
    seat_ids: Vec<i64>,
}

/// POST /api/seats/release
///
/// Only the caller's own holds are affected; anything else in the list is
/// ignored, so the UI can fire this freely on unselect.
async fn release_seats(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<ReleaseSeatsRequest>,
) -> Result<impl IntoResponse> {
    req.validate()
        .map_err(|e| Error::BadRequest(e.to_string()))?;

    let released = state
        .reservations
        .release(req.show_id, &req.seat_ids, user.user_id)
        .await?;
    if !released.is_empty() {
        state.cache.invalidate_seats(req.show_id).await;
    }

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "message": "Seats released" })),
    ))
}
