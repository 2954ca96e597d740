//! Store adapters for seats, bookings and shows.
//!
//! Every mutation of seat status goes through one primitive: the conditional
//! multi-seat transition. A call names a set of seats, the state they are
//! required to be in, and the state to move them to; the store applies the
//! patch to all of them atomically or rejects the whole set. Code that reads
//! seat state and writes it back outside this primitive is a correctness bug.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::models::{Booking, BookingStatus, Seat, SeatCategory, SeatStatus, Show};
use crate::policy;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The conditional transition found at least one seat outside the
    /// required state. Nothing was changed.
    #[error("conditional seat transition rejected")]
    Rejected,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Required current state of every seat in a conditional transition.
#[derive(Debug, Clone, Copy)]
pub enum SeatPredicate {
    /// Available, reserved with a lapsed deadline (lazy expiry), or
    /// live-reserved by this buyer (idempotent re-hold).
    AvailableOrHeldBy(i64),
    /// Live-reserved by this buyer; the deadline must still be in the future.
    HeldBy(i64),
    /// Reserved by this buyer, deadline ignored. Used for release (the owner
    /// may always give a seat back) and for booking confirmation (a paid
    /// buyer is honored even if the hold lapsed mid-payment).
    ReservedBy(i64),
    /// Reserved with a lapsed deadline, any holder. The sweep predicate.
    ReservedExpired,
}

impl SeatPredicate {
    /// Reference semantics; the Postgres adapter mirrors this in SQL.
    pub fn matches(&self, seat: &Seat, now: DateTime<Utc>) -> bool {
        let lapsed = seat.status == SeatStatus::Reserved
            && policy::hold_expired(seat.reserved_until, now);
        match *self {
            SeatPredicate::AvailableOrHeldBy(buyer) => {
                seat.status == SeatStatus::Available
                    || (seat.status == SeatStatus::Reserved
                        && (policy::hold_expired(seat.reserved_until, now)
                            || seat.reserved_by == Some(buyer)))
            }
            SeatPredicate::HeldBy(buyer) => {
                seat.status == SeatStatus::Reserved
                    && seat.reserved_by == Some(buyer)
                    && !policy::hold_expired(seat.reserved_until, now)
            }
            SeatPredicate::ReservedBy(buyer) => {
                seat.status == SeatStatus::Reserved && seat.reserved_by == Some(buyer)
            }
            SeatPredicate::ReservedExpired => lapsed,
        }
    }
}

/// Target state of a conditional transition.
#[derive(Debug, Clone, Copy)]
pub enum SeatPatch {
    /// Reserve for a buyer. A seat already live-held by the same buyer keeps
    /// its earlier deadline: re-holding never extends the timer.
    Reserve { buyer_id: i64, until: DateTime<Utc> },
    /// Back to available, reservation fields cleared.
    Release,
    /// Sold. Reservation fields cleared; ownership moves to the booking.
    Book,
}

impl SeatPatch {
    /// Reference semantics; the Postgres adapter mirrors this in SQL.
    pub fn apply(&self, seat: &mut Seat, now: DateTime<Utc>) {
        match *self {
            SeatPatch::Reserve { buyer_id, until } => {
                let keep_deadline = seat.status == SeatStatus::Reserved
                    && seat.reserved_by == Some(buyer_id)
                    && !policy::hold_expired(seat.reserved_until, now);
                if !keep_deadline {
                    seat.reserved_until = Some(until);
                }
                seat.status = SeatStatus::Reserved;
                seat.reserved_by = Some(buyer_id);
            }
            SeatPatch::Release => {
                seat.status = SeatStatus::Available;
                seat.reserved_by = None;
                seat.reserved_until = None;
            }
            SeatPatch::Book => {
                seat.status = SeatStatus::Booked;
                seat.reserved_by = None;
                seat.reserved_until = None;
            }
        }
    }
}

pub struct NewSeat {
    pub seat_number: String,
    pub row: String,
    pub category: SeatCategory,
}

#[async_trait]
pub trait SeatStore: Send + Sync {
    /// Bulk insert of a show's fixed layout at setup time.
    async fn insert_layout(&self, show_id: i64, layout: Vec<NewSeat>) -> StoreResult<Vec<Seat>>;

    async fn seats_for_show(&self, show_id: i64) -> StoreResult<Vec<Seat>>;

    /// Seats of the show matching the given ids; unknown ids are absent from
    /// the result, which is how callers detect them.
    async fn seats_by_ids(&self, show_id: i64, seat_ids: &[i64]) -> StoreResult<Vec<Seat>>;

    /// Conditional multi-seat transition, all-or-nothing. Applies `patch` to
    /// every listed seat iff every one of them satisfies `predicate` at
    /// commit time; otherwise fails with `StoreError::Rejected` and changes
    /// nothing. Returns the patched rows.
    async fn try_transition(
        &self,
        show_id: i64,
        seat_ids: &[i64],
        predicate: SeatPredicate,
        patch: SeatPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Seat>>;

    /// Best-effort variant for non-contended paths: patches the subset of
    /// seats matching `predicate` and returns exactly those. Never rejects.
    /// `show_id` of `None` scans all shows (the global sweep).
    async fn transition_matching(
        &self,
        show_id: Option<i64>,
        seat_ids: Option<&[i64]>,
        predicate: SeatPredicate,
        patch: SeatPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Seat>>;

    async fn delete_for_show(&self, show_id: i64) -> StoreResult<u64>;
}

pub struct NewBooking {
    pub buyer_id: i64,
    pub show_id: i64,
    pub movie_id: i64,
    pub seat_ids: Vec<i64>,
    pub total_amount: f64,
    pub session_ref: String,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert(&self, booking: NewBooking) -> StoreResult<Booking>;

    async fn find(&self, id: i64) -> StoreResult<Option<Booking>>;

    async fn find_by_session_ref(&self, session_ref: &str) -> StoreResult<Option<Booking>>;

    /// Replaces the booking's session reference in place (payment retry).
    async fn update_session_ref(&self, id: i64, session_ref: &str) -> StoreResult<()>;

    /// Conditional status transition. Ok(true) iff THIS call moved the
    /// booking from `from` to `to`; Ok(false) means the booking was no longer
    /// in `from` (someone else already settled it).
    async fn transition_status(
        &self,
        id: i64,
        from: BookingStatus,
        to: BookingStatus,
    ) -> StoreResult<bool>;

    /// One-shot flip of `ticket_issued`. Ok(true) iff this call won the flip.
    async fn claim_ticket_issuance(&self, id: i64) -> StoreResult<bool>;

    async fn pending_for_show(&self, show_id: i64) -> StoreResult<Vec<Booking>>;

    async fn for_buyer(&self, buyer_id: i64) -> StoreResult<Vec<Booking>>;

    async fn show_has_confirmed(&self, show_id: i64) -> StoreResult<bool>;

    async fn delete_for_show(&self, show_id: i64) -> StoreResult<u64>;
}

pub struct NewShow {
    pub movie_id: i64,
    pub theatre: String,
    pub starts_at: DateTime<Utc>,
    pub price: f64,
    pub total_seats: i32,
}

#[async_trait]
pub trait ShowStore: Send + Sync {
    async fn insert(&self, show: NewShow) -> StoreResult<Show>;

    async fn find(&self, id: i64) -> StoreResult<Option<Show>>;

    /// Shows whose start time has passed: retirement candidates.
    async fn started_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Show>>;

    async fn delete(&self, id: i64) -> StoreResult<bool>;
}

/// Handle bundle passed to every service.
#[derive(Clone)]
pub struct Stores {
    pub seats: Arc<dyn SeatStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub shows: Arc<dyn ShowStore>,
}
