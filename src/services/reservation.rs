//! Seat reservation manager: holds, releases and expiry sweeps.
//!
//! Correctness under contention rests entirely on the store's conditional
//! transition; this module never reads seat state and writes it back
//! separately. The eager pre-sweep in `hold` only reduces spurious
//! conflicts against stale reservations, the conditional transition
//! re-validates everything at commit time.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Seat;
use crate::policy;
use crate::services::broadcast::Broadcaster;
use crate::store::{SeatPatch, SeatPredicate, StoreError, Stores};

pub struct ReservationManager {
    stores: Stores,
    broadcaster: Broadcaster,
}

impl ReservationManager {
    pub fn new(stores: Stores, broadcaster: Broadcaster) -> Self {
        Self {
            stores,
            broadcaster,
        }
    }

    /// Holds the given seats for `buyer_id` for the policy hold duration.
    ///
    /// All-or-nothing: if any seat is taken the whole request fails with
    /// `Conflict` and no seat is held. Seats already live-held by the same
    /// buyer are accepted but keep their original deadline; repeated calls
    /// cannot stretch a hold forever. Returns the effective deadline (the
    /// earliest one among the held seats).
    pub async fn hold(
        &self,
        show_id: i64,
        seat_ids: &[i64],
        buyer_id: i64,
    ) -> Result<DateTime<Utc>> {
        if seat_ids.is_empty() {
            return Err(Error::BadRequest("no seats requested".to_string()));
        }
        let unique: std::collections::HashSet<i64> = seat_ids.iter().copied().collect();
        if unique.len() > policy::MAX_SEATS_PER_HOLD {
            return Err(Error::BadRequest(format!(
                "at most {} seats per request",
                policy::MAX_SEATS_PER_HOLD
            )));
        }

        let now = Utc::now();
        // Free anything already lapsed so the conflict answer reflects
        // reality rather than unswept leftovers.
        self.sweep_show(show_id, now).await?;

        let known = self.stores.seats.seats_by_ids(show_id, seat_ids).await?;
        if known.len() != unique.len() {
            return Err(Error::NotFound("seat"));
        }

        let until = policy::hold_deadline(now);
        let held = self
            .stores
            .seats
            .try_transition(
                show_id,
                seat_ids,
                SeatPredicate::AvailableOrHeldBy(buyer_id),
                SeatPatch::Reserve { buyer_id, until },
                now,
            )
            .await
            .map_err(|e| match e {
                StoreError::Rejected => Error::Conflict,
                other => Error::Store(other),
            })?;

        self.broadcaster.publish_seats(show_id, &held);

        let deadline = held
            .iter()
            .filter_map(|s| s.reserved_until)
            .min()
            .unwrap_or(until);
        debug!(show_id, buyer_id, seats = held.len(), %deadline, "seats held");
        Ok(deadline)
    }

    /// Releases the subset of `seat_ids` currently reserved by `buyer_id`.
    /// Seats held by others, already available, booked or unknown are
    /// silently skipped, so redundant release calls are harmless.
    pub async fn release(
        &self,
        show_id: i64,
        seat_ids: &[i64],
        buyer_id: i64,
    ) -> Result<Vec<Seat>> {
        let released = self
            .stores
            .seats
            .transition_matching(
                Some(show_id),
                Some(seat_ids),
                SeatPredicate::ReservedBy(buyer_id),
                SeatPatch::Release,
                Utc::now(),
            )
            .await?;
        self.broadcaster.publish_seats(show_id, &released);
        Ok(released)
    }

    /// Resets this show's lapsed holds to available and broadcasts them.
    pub async fn sweep_show(&self, show_id: i64, now: DateTime<Utc>) -> Result<Vec<Seat>> {
        let released = self
            .stores
            .seats
            .transition_matching(
                Some(show_id),
                None,
                SeatPredicate::ReservedExpired,
                SeatPatch::Release,
                now,
            )
            .await?;
        self.broadcaster.publish_seats(show_id, &released);
        Ok(released)
    }

    /// Global sweep across all shows; returns released seats grouped by
    /// show. The predicate requires `reserved`, so a seat that moved to
    /// booked meanwhile can never be resurrected.
    pub async fn sweep_all(&self, now: DateTime<Utc>) -> Result<HashMap<i64, Vec<Seat>>> {
        let released = self
            .stores
            .seats
            .transition_matching(None, None, SeatPredicate::ReservedExpired, SeatPatch::Release, now)
            .await?;

        let mut by_show: HashMap<i64, Vec<Seat>> = HashMap::new();
        for seat in released {
            by_show.entry(seat.show_id).or_default().push(seat);
        }
        for (show_id, seats) in &by_show {
            self.broadcaster.publish_seats(*show_id, seats);
        }
        Ok(by_show)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SeatCategory, SeatStatus};
    use crate::store::memory::MemoryStore;
    use crate::store::{NewSeat, NewShow, SeatStore, ShowStore};
    use chrono::Duration;
    use std::sync::Arc;

    async fn setup() -> (Arc<MemoryStore>, ReservationManager, i64, Vec<i64>) {
        let store = MemoryStore::new();
        let show = store
            .insert(NewShow {
                movie_id: 1,
                theatre: "T1".to_string(),
                starts_at: Utc::now() + Duration::hours(4),
                price: 12.0,
                total_seats: 4,
            })
            .await
            .unwrap();
        let seats = store
            .insert_layout(
                show.id,
                (1..=4)
                    .map(|n| NewSeat {
                        seat_number: format!("A{n}"),
                        row: "A".to_string(),
                        category: SeatCategory::Premium,
                    })
                    .collect(),
            )
            .await
            .unwrap();
        let manager = ReservationManager::new(store.stores(), Broadcaster::new());
        let seat_ids = seats.iter().map(|s| s.id).collect();
        (store, manager, show.id, seat_ids)
    }

    #[tokio::test]
    async fn hold_reserves_available_seats() {
        let (store, manager, show_id, seats) = setup().await;
        let deadline = manager.hold(show_id, &seats[..2], 7).await.unwrap();

        let seat = store.seat(seats[0]).await.unwrap();
        assert_eq!(seat.status, SeatStatus::Reserved);
        assert_eq!(seat.reserved_by, Some(7));
        assert_eq!(seat.reserved_until, Some(deadline));
        // Untouched seat stays available.
        let other = store.seat(seats[2]).await.unwrap();
        assert_eq!(other.status, SeatStatus::Available);
    }

    #[tokio::test]
    async fn hold_conflicts_are_all_or_nothing() {
        let (store, manager, show_id, seats) = setup().await;
        manager.hold(show_id, &seats[1..2], 1).await.unwrap();

        let err = manager.hold(show_id, &seats[..3], 2).await.unwrap_err();
        assert!(matches!(err, Error::Conflict));
        // The two free seats of the failed request were not partially held.
        assert_eq!(store.seat(seats[0]).await.unwrap().status, SeatStatus::Available);
        assert_eq!(store.seat(seats[2]).await.unwrap().status, SeatStatus::Available);
    }

    #[tokio::test]
    async fn concurrent_holds_on_one_seat_pick_one_winner() {
        let (_store, manager, show_id, seats) = setup().await;
        let target = &seats[..1];
        let (a, b) = tokio::join!(
            manager.hold(show_id, target, 100),
            manager.hold(show_id, target, 200),
        );
        assert!(
            a.is_ok() != b.is_ok(),
            "exactly one buyer must win: {a:?} / {b:?}"
        );
        assert!(matches!(
            if a.is_err() { a.unwrap_err() } else { b.unwrap_err() },
            Error::Conflict
        ));
    }

    #[tokio::test]
    async fn re_hold_by_same_buyer_does_not_extend_deadline() {
        let (_store, manager, show_id, seats) = setup().await;
        let first = manager.hold(show_id, &seats[..2], 7).await.unwrap();
        let second = manager.hold(show_id, &seats[..2], 7).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn lapsed_hold_can_be_taken_by_another_buyer() {
        let (store, manager, show_id, seats) = setup().await;
        store
            .set_reservation(seats[0], Some(1), Some(Utc::now() - Duration::seconds(1)))
            .await;

        manager.hold(show_id, &seats[..1], 2).await.unwrap();
        let seat = store.seat(seats[0]).await.unwrap();
        assert_eq!(seat.reserved_by, Some(2));
    }

    #[tokio::test]
    async fn hold_with_unknown_seat_is_not_found() {
        let (_store, manager, show_id, seats) = setup().await;
        let err = manager
            .hold(show_id, &[seats[0], 9999], 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn hold_rejects_oversized_requests_and_empty_input() {
        let (_store, manager, show_id, _seats) = setup().await;
        let too_many: Vec<i64> = (1..=6).collect();
        assert!(matches!(
            manager.hold(show_id, &too_many, 1).await.unwrap_err(),
            Error::BadRequest(_)
        ));
        assert!(matches!(
            manager.hold(show_id, &[], 1).await.unwrap_err(),
            Error::BadRequest(_)
        ));
    }

    #[tokio::test]
    async fn release_is_idempotent_and_scoped_to_owner() {
        let (store, manager, show_id, seats) = setup().await;
        manager.hold(show_id, &seats[..1], 1).await.unwrap();
        manager.hold(show_id, &seats[1..2], 2).await.unwrap();

        // Buyer 1 releasing both: only their own seat is touched.
        let released = manager.release(show_id, &seats[..2], 1).await.unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].id, seats[0]);
        assert_eq!(store.seat(seats[1]).await.unwrap().reserved_by, Some(2));

        // Releasing again (and seats never held) is a quiet no-op.
        let again = manager.release(show_id, &seats[..2], 1).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn sweep_releases_only_lapsed_holds() {
        let (store, manager, show_id, seats) = setup().await;
        let now = Utc::now();
        store
            .set_reservation(seats[0], Some(1), Some(now - Duration::seconds(10)))
            .await;
        store
            .set_reservation(seats[1], Some(2), Some(now + Duration::seconds(60)))
            .await;

        let by_show = manager.sweep_all(now).await.unwrap();
        let released = &by_show[&show_id];
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].id, seats[0]);
        assert_eq!(store.seat(seats[1]).await.unwrap().status, SeatStatus::Reserved);
    }

    #[tokio::test]
    async fn sweep_never_touches_booked_seats() {
        let (store, manager, show_id, seats) = setup().await;
        manager.hold(show_id, &seats[..1], 1).await.unwrap();
        store
            .try_transition(
                show_id,
                &seats[..1],
                SeatPredicate::ReservedBy(1),
                SeatPatch::Book,
                Utc::now(),
            )
            .await
            .unwrap();

        let by_show = manager.sweep_all(Utc::now() + Duration::hours(1)).await.unwrap();
        assert!(by_show.is_empty());
        assert_eq!(store.seat(seats[0]).await.unwrap().status, SeatStatus::Booked);
    }
}
