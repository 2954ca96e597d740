use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A scheduled screening. Owns a fixed seat layout created at setup time.
/// Once `starts_at` has passed the retirement sweep deletes the show and its
/// seats, unless a confirmed booking pins it for purchase history.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Show {
    pub id: i64,
    pub movie_id: i64,
    pub theatre: String,
    pub starts_at: DateTime<Utc>,
    pub price: f64,
    pub total_seats: i32,
}
