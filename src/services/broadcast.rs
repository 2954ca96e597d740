//! Real-time fan-out of seat-state deltas to viewers of a show.
//!
//! One lossy broadcast channel per show, created lazily on the first
//! subscriber. The broadcaster is a consumer of reservation output, never a
//! source of truth: a viewer that misses a delta re-syncs from the seat list.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

use crate::models::{Seat, SeatStatus};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatDelta {
    pub id: i64,
    pub show_id: i64,
    pub seat_number: String,
    pub row: String,
    pub status: SeatStatus,
    pub reserved_by: Option<i64>,
    pub reserved_until: Option<DateTime<Utc>>,
}

impl From<&Seat> for SeatDelta {
    fn from(seat: &Seat) -> Self {
        Self {
            id: seat.id,
            show_id: seat.show_id,
            seat_number: seat.seat_number.clone(),
            row: seat.row.clone(),
            status: seat.status,
            reserved_by: seat.reserved_by,
            reserved_until: seat.reserved_until,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ShowEvent {
    #[serde(rename_all = "camelCase")]
    SeatStatusUpdated { show_id: i64, seats: Vec<SeatDelta> },
    #[serde(rename_all = "camelCase")]
    ShowRetired { show_id: i64 },
}

#[derive(Clone, Default)]
pub struct Broadcaster {
    channels: Arc<RwLock<HashMap<i64, broadcast::Sender<ShowEvent>>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, show_id: i64) -> broadcast::Receiver<ShowEvent> {
        let mut channels = self.channels.write().unwrap();
        channels
            .entry(show_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn publish_seats(&self, show_id: i64, seats: &[Seat]) {
        if seats.is_empty() {
            return;
        }
        self.send(
            show_id,
            ShowEvent::SeatStatusUpdated {
                show_id,
                seats: seats.iter().map(SeatDelta::from).collect(),
            },
        );
    }

    /// Tells viewers the show is gone and drops its channel.
    pub fn publish_retired(&self, show_id: i64) {
        self.send(show_id, ShowEvent::ShowRetired { show_id });
        self.channels.write().unwrap().remove(&show_id);
    }

    fn send(&self, show_id: i64, event: ShowEvent) {
        let channels = self.channels.read().unwrap();
        if let Some(sender) = channels.get(&show_id) {
            // A send error only means nobody is listening right now.
            let _ = sender.send(event);
        }
    }
}
