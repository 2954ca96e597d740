//! In-memory store adapters.
//!
//! Same contract as the Postgres adapters, evaluated with the reference
//! `SeatPredicate::matches` / `SeatPatch::apply` semantics under one mutex,
//! so check-and-patch is atomic exactly like the SQL conditional update.
//! Used by the test suites; also handy for running the service without a
//! database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::{Booking, BookingStatus, Seat, SeatStatus, Show};
use crate::store::{
    BookingStore, NewBooking, NewSeat, NewShow, SeatPatch, SeatPredicate, SeatStore, ShowStore,
    StoreError, StoreResult, Stores,
};

#[derive(Default)]
struct State {
    seats: BTreeMap<i64, Seat>,
    bookings: BTreeMap<i64, Booking>,
    shows: BTreeMap<i64, Show>,
    next_seat_id: i64,
    next_booking_id: i64,
    next_show_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All three store handles backed by the same instance.
    pub fn stores(self: &Arc<Self>) -> Stores {
        Stores {
            seats: self.clone(),
            bookings: self.clone(),
            shows: self.clone(),
        }
    }

    /// Overwrites a seat's reservation fields directly. Test hook for
    /// constructing lapsed holds without waiting out the clock.
    pub async fn set_reservation(
        &self,
        seat_id: i64,
        buyer_id: Option<i64>,
        until: Option<DateTime<Utc>>,
    ) {
        let mut state = self.state.lock().await;
        if let Some(seat) = state.seats.get_mut(&seat_id) {
            seat.status = if buyer_id.is_some() {
                SeatStatus::Reserved
            } else {
                SeatStatus::Available
            };
            seat.reserved_by = buyer_id;
            seat.reserved_until = until;
        }
    }

    pub async fn seat(&self, seat_id: i64) -> Option<Seat> {
        self.state.lock().await.seats.get(&seat_id).cloned()
    }

    pub async fn booking(&self, booking_id: i64) -> Option<Booking> {
        self.state.lock().await.bookings.get(&booking_id).cloned()
    }
}

fn dedup_ids(seat_ids: &[i64]) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    seat_ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect()
}

#[async_trait]
impl SeatStore for MemoryStore {
    async fn insert_layout(&self, show_id: i64, layout: Vec<NewSeat>) -> StoreResult<Vec<Seat>> {
        let mut state = self.state.lock().await;
        let mut inserted = Vec::with_capacity(layout.len());
        for new_seat in layout {
            state.next_seat_id += 1;
            let seat = Seat {
                id: state.next_seat_id,
                show_id,
                seat_number: new_seat.seat_number,
                row: new_seat.row,
                category: new_seat.category,
                status: SeatStatus::Available,
                reserved_by: None,
                reserved_until: None,
            };
            state.seats.insert(seat.id, seat.clone());
            inserted.push(seat);
        }
        Ok(inserted)
    }

    async fn seats_for_show(&self, show_id: i64) -> StoreResult<Vec<Seat>> {
        let state = self.state.lock().await;
        Ok(state
            .seats
            .values()
            .filter(|s| s.show_id == show_id)
            .cloned()
            .collect())
    }

    async fn seats_by_ids(&self, show_id: i64, seat_ids: &[i64]) -> StoreResult<Vec<Seat>> {
        let state = self.state.lock().await;
        Ok(dedup_ids(seat_ids)
            .into_iter()
            .filter_map(|id| state.seats.get(&id))
            .filter(|s| s.show_id == show_id)
            .cloned()
            .collect())
    }

    async fn try_transition(
        &self,
        show_id: i64,
        seat_ids: &[i64],
        predicate: SeatPredicate,
        patch: SeatPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Seat>> {
        let ids = dedup_ids(seat_ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = self.state.lock().await;
        let all_match = ids.iter().all(|id| {
            state
                .seats
                .get(id)
                .map(|s| s.show_id == show_id && predicate.matches(s, now))
                .unwrap_or(false)
        });
        if !all_match {
            return Err(StoreError::Rejected);
        }

        let mut updated = Vec::with_capacity(ids.len());
        for id in &ids {
            let seat = state.seats.get_mut(id).expect("seat checked above");
            patch.apply(seat, now);
            updated.push(seat.clone());
        }
        Ok(updated)
    }

    async fn transition_matching(
        &self,
        show_id: Option<i64>,
        seat_ids: Option<&[i64]>,
        predicate: SeatPredicate,
        patch: SeatPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Seat>> {
        let ids = seat_ids.map(dedup_ids);
        let mut state = self.state.lock().await;
        let mut updated = Vec::new();
        for seat in state.seats.values_mut() {
            if let Some(show_id) = show_id {
                if seat.show_id != show_id {
                    continue;
                }
            }
            if let Some(ids) = &ids {
                if !ids.contains(&seat.id) {
                    continue;
                }
            }
            if predicate.matches(seat, now) {
                patch.apply(seat, now);
                updated.push(seat.clone());
            }
        }
        Ok(updated)
    }

    async fn delete_for_show(&self, show_id: i64) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.seats.len();
        state.seats.retain(|_, s| s.show_id != show_id);
        Ok((before - state.seats.len()) as u64)
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert(&self, booking: NewBooking) -> StoreResult<Booking> {
        let mut state = self.state.lock().await;
        state.next_booking_id += 1;
        let row = Booking {
            id: state.next_booking_id,
            buyer_id: booking.buyer_id,
            show_id: booking.show_id,
            movie_id: booking.movie_id,
            seat_ids: booking.seat_ids,
            total_amount: booking.total_amount,
            session_ref: booking.session_ref,
            status: BookingStatus::Pending,
            ticket_issued: false,
            created_at: Utc::now(),
        };
        state.bookings.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find(&self, id: i64) -> StoreResult<Option<Booking>> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn find_by_session_ref(&self, session_ref: &str) -> StoreResult<Option<Booking>> {
        Ok(self
            .state
            .lock()
            .await
            .bookings
            .values()
            .find(|b| b.session_ref == session_ref)
            .cloned())
    }

    async fn update_session_ref(&self, id: i64, session_ref: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if let Some(booking) = state.bookings.get_mut(&id) {
            booking.session_ref = session_ref.to_string();
        }
        Ok(())
    }

    async fn transition_status(
        &self,
        id: i64,
        from: BookingStatus,
        to: BookingStatus,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.bookings.get_mut(&id) {
            Some(booking) if booking.status == from => {
                booking.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_ticket_issuance(&self, id: i64) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.bookings.get_mut(&id) {
            Some(booking) if !booking.ticket_issued => {
                booking.ticket_issued = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn pending_for_show(&self, show_id: i64) -> StoreResult<Vec<Booking>> {
        Ok(self
            .state
            .lock()
            .await
            .bookings
            .values()
            .filter(|b| b.show_id == show_id && b.status == BookingStatus::Pending)
            .cloned()
            .collect())
    }

    async fn for_buyer(&self, buyer_id: i64) -> StoreResult<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .state
            .lock()
            .await
            .bookings
            .values()
            .filter(|b| b.buyer_id == buyer_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(bookings)
    }

    async fn show_has_confirmed(&self, show_id: i64) -> StoreResult<bool> {
        Ok(self
            .state
            .lock()
            .await
            .bookings
            .values()
            .any(|b| b.show_id == show_id && b.status == BookingStatus::Confirmed))
    }

    async fn delete_for_show(&self, show_id: i64) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.bookings.len();
        state.bookings.retain(|_, b| b.show_id != show_id);
        Ok((before - state.bookings.len()) as u64)
    }
}

#[async_trait]
impl ShowStore for MemoryStore {
    async fn insert(&self, show: NewShow) -> StoreResult<Show> {
        let mut state = self.state.lock().await;
        state.next_show_id += 1;
        let row = Show {
            id: state.next_show_id,
            movie_id: show.movie_id,
            theatre: show.theatre,
            starts_at: show.starts_at,
            price: show.price,
            total_seats: show.total_seats,
        };
        state.shows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find(&self, id: i64) -> StoreResult<Option<Show>> {
        Ok(self.state.lock().await.shows.get(&id).cloned())
    }

    async fn started_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Show>> {
        Ok(self
            .state
            .lock()
            .await
            .shows
            .values()
            .filter(|s| s.starts_at < cutoff)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        Ok(self.state.lock().await.shows.remove(&id).is_some())
    }
}
