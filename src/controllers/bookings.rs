use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use crate::middleware::AuthUser;
use crate::models::{Booking, BookingStatus};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/bookings/my", get(get_my_bookings))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BookingView {
    id: i64,
    status: BookingStatus,
    amount: f64,
    show_id: i64,
    movie_id: i64,
    booked_seats: Vec<String>,
    created_at: DateTime<Utc>,
    /// Hold deadline, present while the booking is pending.
    expires_at: Option<DateTime<Utc>>,
}

/// GET /api/bookings/my
async fn get_my_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let bookings = state.bookings.bookings_for_buyer(user.user_id).await?;

    let payload = futures::future::try_join_all(
        bookings.into_iter().map(|booking| view(&state, booking)),
    )
    .await?;
    Ok((StatusCode::OK, Json(payload)))
}

async fn view(state: &Arc<AppState>, booking: Booking) -> Result<BookingView> {
    let seats = state
        .stores
        .seats
        .seats_by_ids(booking.show_id, &booking.seat_ids)
        .await?;
    let expires_at = if booking.status == BookingStatus::Pending {
        seats
            .iter()
            .filter(|s| s.reserved_by == Some(booking.buyer_id))
            .filter_map(|s| s.reserved_until)
            .max()
    } else {
        None
    };
    Ok(BookingView {
        id: booking.id,
        status: booking.status,
        amount: booking.total_amount,
        show_id: booking.show_id,
        movie_id: booking.movie_id,
        booked_seats: seats.into_iter().map(|s| s.seat_number).collect(),
        created_at: booking.created_at,
        expires_at,
    })
}
