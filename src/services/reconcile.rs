//! Confirmation reconciler: the idempotent bridge between payment-provider
//! signals and the booking lifecycle.
//!
//! Two triggers can report the same payment success, the provider's webhook
//! push and the buyer's post-checkout verify pull. Both are normalized into a
//! `PaymentSignal` and fed through `apply`, which is keyed on persisted
//! booking status rather than any per-event bookkeeping: whichever trigger
//! wins the conditional `pending -> confirmed` transition performs the side
//! effects, the loser observes a settled booking and stops.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::models::{Booking, BookingStatus};
use crate::services::broadcast::Broadcaster;
use crate::services::ticket::TicketDelivery;
use crate::store::{SeatPatch, SeatPredicate, StoreError, Stores};

/// Provider payment state collapsed to the one distinction the engine cares
/// about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportedStatus {
    Paid,
    Unpaid(String),
}

impl ReportedStatus {
    pub fn from_provider(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("paid") {
            ReportedStatus::Paid
        } else {
            ReportedStatus::Unpaid(raw.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentSignal {
    pub session_ref: String,
    /// Stable booking id from the session metadata. Covers sessions whose
    /// reference on the booking was superseded by a payment retry.
    pub booking_hint: Option<i64>,
    pub status: ReportedStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// This call performed the confirmation.
    Confirmed,
    /// The booking was already out of `pending`; nothing was done.
    AlreadySettled(BookingStatus),
    /// Payment not (yet) successful; the booking stays pending.
    StillUnpaid,
    /// No booking matches the session; ignored (test or foreign event).
    Untracked,
}

pub struct ConfirmationReconciler {
    stores: Stores,
    broadcaster: Broadcaster,
    tickets: Arc<dyn TicketDelivery>,
}

impl ConfirmationReconciler {
    pub fn new(stores: Stores, broadcaster: Broadcaster, tickets: Arc<dyn TicketDelivery>) -> Self {
        Self {
            stores,
            broadcaster,
            tickets,
        }
    }

    pub async fn apply(&self, signal: PaymentSignal) -> Result<ReconcileOutcome> {
        let booking = match self.lookup(&signal).await? {
            Some(b) => b,
            None => {
                warn!(session_ref = %signal.session_ref, "ignoring signal for untracked session");
                return Ok(ReconcileOutcome::Untracked);
            }
        };

        if booking.status != BookingStatus::Pending {
            info!(
                booking_id = booking.id,
                status = ?booking.status,
                "duplicate confirmation signal, booking already settled"
            );
            return Ok(ReconcileOutcome::AlreadySettled(booking.status));
        }

        if let ReportedStatus::Unpaid(raw) = &signal.status {
            info!(booking_id = booking.id, provider_status = %raw, "payment not completed");
            return Ok(ReconcileOutcome::StillUnpaid);
        }

        // The winner of this conditional transition owns every downstream
        // side effect; the racing trigger lands in the branch above on its
        // own lookup, or right here on Ok(false).
        if !self
            .stores
            .bookings
            .transition_status(booking.id, BookingStatus::Pending, BookingStatus::Confirmed)
            .await?
        {
            return Ok(ReconcileOutcome::AlreadySettled(BookingStatus::Confirmed));
        }
        info!(booking_id = booking.id, "booking confirmed");

        self.book_seats(&booking).await;

        if self.stores.bookings.claim_ticket_issuance(booking.id).await? {
            if let Err(e) = self.tickets.issue(&booking).await {
                // The claim stays spent: issuance is at-most-once and this
                // failure goes to manual reconciliation, not to the buyer.
                error!(booking_id = booking.id, "ticket delivery failed: {e}");
            }
        }

        Ok(ReconcileOutcome::Confirmed)
    }

    async fn lookup(&self, signal: &PaymentSignal) -> Result<Option<Booking>> {
        if let Some(booking) = self
            .stores
            .bookings
            .find_by_session_ref(&signal.session_ref)
            .await?
        {
            return Ok(Some(booking));
        }
        match signal.booking_hint {
            Some(id) => Ok(self.stores.bookings.find(id).await?),
            None => Ok(None),
        }
    }

    /// Flips the booking's seats from reserved to booked. A paid buyer is
    /// never penalized here: if the strict flip is rejected (a seat slipped
    /// away to the sweep or, worse, another path), the booking stays
    /// confirmed, the seats still held by the buyer are flipped best-effort
    /// and the inconsistency is logged for manual follow-up.
    async fn book_seats(&self, booking: &Booking) {
        let now = Utc::now();
        let strict = self
            .stores
            .seats
            .try_transition(
                booking.show_id,
                &booking.seat_ids,
                SeatPredicate::ReservedBy(booking.buyer_id),
                SeatPatch::Book,
                now,
            )
            .await;

        match strict {
            Ok(booked) => self.broadcaster.publish_seats(booking.show_id, &booked),
            Err(StoreError::Rejected) => {
                warn!(
                    booking_id = booking.id,
                    seat_ids = ?booking.seat_ids,
                    "confirmed booking could not claim all its seats; flipping the remainder"
                );
                match self
                    .stores
                    .seats
                    .transition_matching(
                        Some(booking.show_id),
                        Some(&booking.seat_ids),
                        SeatPredicate::ReservedBy(booking.buyer_id),
                        SeatPatch::Book,
                        now,
                    )
                    .await
                {
                    Ok(booked) => self.broadcaster.publish_seats(booking.show_id, &booked),
                    Err(e) => error!(booking_id = booking.id, "partial seat flip failed: {e}"),
                }
            }
            Err(e) => {
                error!(booking_id = booking.id, "seat flip failed: {e}");
            }
        }
    }
}
