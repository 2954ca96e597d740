use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum SeatStatus {
    Available,
    Reserved,
    Booked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum SeatCategory {
    Normal,
    Premium,
}

impl SeatCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatCategory::Normal => "normal",
            SeatCategory::Premium => "premium",
        }
    }
}

/// One physical seat of one show instance. Seats are per-show; the pair
/// (show_id, seat_number) is unique.
///
/// `status = reserved` implies `reserved_by`/`reserved_until` are set; a
/// reservation whose `reserved_until` has passed counts as available even
/// before a sweep resets it. `status = booked` carries no reservation fields;
/// ownership lives on the booking from then on.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Seat {
    pub id: i64,
    pub show_id: i64,
    pub seat_number: String,
    pub row: String,
    pub category: SeatCategory,
    pub status: SeatStatus,
    pub reserved_by: Option<i64>,
    pub reserved_until: Option<DateTime<Utc>>,
}
