use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// One buyer's purchase attempt for a set of seats of one show.
///
/// `pending -> confirmed` and `pending -> cancelled` are the only
/// transitions; both targets are terminal. `ticket_issued` flips
/// false -> true at most once, guarding downstream ticket delivery.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub buyer_id: i64,
    pub show_id: i64,
    /// Denormalized from the show for reporting.
    pub movie_id: i64,
    pub seat_ids: Vec<i64>,
    pub total_amount: f64,
    /// Reference of the latest checkout session opened for this booking.
    /// A retry replaces it in place; the booking identity never changes.
    pub session_ref: String,
    pub status: BookingStatus,
    pub ticket_issued: bool,
    pub created_at: DateTime<Utc>,
}
