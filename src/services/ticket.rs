//! Ticket issuance collaborator.
//!
//! The engine decides *that* a ticket is issued exactly once per booking
//! (the reconciler owns that guard); delivery mechanics live behind this
//! trait. The production implementation hands the booking to a delivery
//! service over HTTP.

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Duration;
use tracing::info;

use crate::models::Booking;

#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("ticket delivery request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ticket delivery rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait TicketDelivery: Send + Sync {
    async fn issue(&self, booking: &Booking) -> Result<(), TicketError>;
}

pub struct HttpTicketDelivery {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpTicketDelivery {
    pub fn new(endpoint: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build ticket HTTP client"),
            endpoint,
        }
    }
}

#[async_trait]
impl TicketDelivery for HttpTicketDelivery {
    async fn issue(&self, booking: &Booking) -> Result<(), TicketError> {
        self.http
            .post(&self.endpoint)
            .json(&json!({
                "bookingId": booking.id,
                "buyerId": booking.buyer_id,
                "showId": booking.show_id,
                "movieId": booking.movie_id,
                "seatIds": booking.seat_ids,
                "totalAmount": booking.total_amount,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Used when no delivery endpoint is configured.
pub struct NoopTicketDelivery;

#[async_trait]
impl TicketDelivery for NoopTicketDelivery {
    async fn issue(&self, booking: &Booking) -> Result<(), TicketError> {
        info!(booking_id = booking.id, "ticket issuance skipped (no delivery endpoint)");
        Ok(())
    }
}
