//! Booking lifecycle: pending bookings tied to a checkout session, and
//! their exactly-once settlement into confirmed or cancelled.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{Booking, BookingStatus, Seat, Show};
use crate::services::broadcast::Broadcaster;
use crate::services::payment::{
    CheckoutGateway, CheckoutSession, OpenSessionRequest, SessionMetadata,
};
use crate::store::{SeatPatch, SeatPredicate, Stores};

pub struct BookingLifecycle {
    stores: Stores,
    gateway: Arc<dyn CheckoutGateway>,
    broadcaster: Broadcaster,
}

impl BookingLifecycle {
    pub fn new(stores: Stores, gateway: Arc<dyn CheckoutGateway>, broadcaster: Broadcaster) -> Self {
        Self {
            stores,
            gateway,
            broadcaster,
        }
    }

    /// Opens a checkout session and a pending booking for seats the buyer
    /// currently holds. The holds are re-validated here, not trusted from
    /// the earlier selection step: the gap between "selected" and "clicked
    /// pay" is long enough for them to lapse.
    pub async fn open_pending(
        &self,
        buyer_id: i64,
        buyer_email: &str,
        show_id: i64,
        seat_ids: &[i64],
    ) -> Result<(Booking, CheckoutSession)> {
        if seat_ids.is_empty() {
            return Err(Error::BadRequest("no seats selected".to_string()));
        }
        let show = self
            .stores
            .shows
            .find(show_id)
            .await?
            .ok_or(Error::NotFound("show"))?;

        let seats = self.live_held_seats(&show, seat_ids, buyer_id).await?;
        let total_amount = show.price * seats.len() as f64;

        let session = self
            .gateway
            .open_session(session_request(
                &show,
                &seats,
                total_amount,
                buyer_email,
                SessionMetadata {
                    booking_id: None,
                    buyer_id,
                    show_id,
                },
            ))
            .await
            .map_err(|e| Error::Gateway(e.to_string()))?;

        let booking = self
            .stores
            .bookings
            .insert(crate::store::NewBooking {
                buyer_id,
                show_id,
                movie_id: show.movie_id,
                seat_ids: seats.iter().map(|s| s.id).collect(),
                total_amount,
                session_ref: session.id.clone(),
            })
            .await?;

        info!(
            booking_id = booking.id,
            buyer_id,
            show_id,
            session_ref = %session.id,
            "pending booking opened"
        );
        Ok((booking, session))
    }

    /// Opens a fresh checkout session for an abandoned pending booking and
    /// swaps the session reference in place. The booking identity is
    /// preserved so a confirmation for either session settles the same row.
    pub async fn retry_pending(
        &self,
        booking_id: i64,
        buyer_id: i64,
        buyer_email: &str,
    ) -> Result<(Booking, CheckoutSession)> {
        let booking = self
            .stores
            .bookings
            .find(booking_id)
            .await?
            .ok_or(Error::NotFound("booking"))?;
        if booking.buyer_id != buyer_id {
            return Err(Error::Forbidden("booking"));
        }
        if booking.status != BookingStatus::Pending {
            return Err(Error::BadRequest(
                "only pending bookings can be retried".to_string(),
            ));
        }

        let show = self
            .stores
            .shows
            .find(booking.show_id)
            .await?
            .ok_or(Error::NotFound("show"))?;
        let seats = self
            .live_held_seats(&show, &booking.seat_ids, buyer_id)
            .await?;

        let session = self
            .gateway
            .open_session(session_request(
                &show,
                &seats,
                booking.total_amount,
                buyer_email,
                SessionMetadata {
                    booking_id: Some(booking.id),
                    buyer_id,
                    show_id: show.id,
                },
            ))
            .await
            .map_err(|e| Error::Gateway(e.to_string()))?;

        self.stores
            .bookings
            .update_session_ref(booking.id, &session.id)
            .await?;
        info!(
            booking_id = booking.id,
            session_ref = %session.id,
            "pending booking rebound to a new checkout session"
        );

        let booking = Booking {
            session_ref: session.id.clone(),
            ..booking
        };
        Ok((booking, session))
    }

    /// Moves a pending booking whose seat holds lapsed to cancelled.
    /// Already-settled bookings are left alone; duplicate signals are
    /// expected here, not an error.
    pub async fn cancel_expired(&self, booking_id: i64) -> Result<()> {
        let cancelled = self
            .stores
            .bookings
            .transition_status(booking_id, BookingStatus::Pending, BookingStatus::Cancelled)
            .await?;
        if cancelled {
            info!(booking_id, "pending booking cancelled after its holds lapsed");
        } else {
            debug!(booking_id, "cancel skipped, booking already settled");
        }
        Ok(())
    }

    /// The buyer's pending and confirmed bookings, newest first. Pending
    /// bookings whose holds have fully lapsed are cancelled on the way out
    /// (their seats go back to the pool without waiting for the sweep).
    pub async fn bookings_for_buyer(&self, buyer_id: i64) -> Result<Vec<Booking>> {
        let now = Utc::now();
        let mut bookings = self.stores.bookings.for_buyer(buyer_id).await?;

        for booking in &mut bookings {
            if booking.status != BookingStatus::Pending {
                continue;
            }
            let seats = self
                .stores
                .seats
                .seats_by_ids(booking.show_id, &booking.seat_ids)
                .await?;
            let latest_deadline = seats
                .iter()
                .filter(|s| s.reserved_by == Some(buyer_id))
                .filter_map(|s| s.reserved_until)
                .max();
            if latest_deadline.map(|d| d <= now).unwrap_or(true) {
                self.cancel_expired(booking.id).await?;
                let released = self
                    .stores
                    .seats
                    .transition_matching(
                        Some(booking.show_id),
                        Some(&booking.seat_ids),
                        SeatPredicate::ReservedBy(buyer_id),
                        SeatPatch::Release,
                        now,
                    )
                    .await?;
                self.broadcaster.publish_seats(booking.show_id, &released);
                booking.status = BookingStatus::Cancelled;
            }
        }

        bookings.retain(|b| {
            matches!(b.status, BookingStatus::Pending | BookingStatus::Confirmed)
        });
        Ok(bookings)
    }

    /// Reads the seats and checks every one is a live hold by this buyer.
    async fn live_held_seats(
        &self,
        show: &Show,
        seat_ids: &[i64],
        buyer_id: i64,
    ) -> Result<Vec<Seat>> {
        let now = Utc::now();
        let seats = self.stores.seats.seats_by_ids(show.id, seat_ids).await?;
        let unique: std::collections::HashSet<i64> = seat_ids.iter().copied().collect();
        if seats.len() != unique.len() {
            return Err(Error::StaleReservation);
        }
        let all_live = seats
            .iter()
            .all(|s| SeatPredicate::HeldBy(buyer_id).matches(s, now));
        if !all_live {
            return Err(Error::StaleReservation);
        }
        Ok(seats)
    }
}

fn session_request(
    show: &Show,
    seats: &[Seat],
    total_amount: f64,
    buyer_email: &str,
    metadata: SessionMetadata,
) -> OpenSessionRequest {
    let seat_list: Vec<&str> = seats.iter().map(|s| s.seat_number.as_str()).collect();
    OpenSessionRequest {
        amount_cents: (total_amount * 100.0).round() as i64,
        product_name: format!("Screening {} at {}", show.movie_id, show.theatre),
        description: format!("Seats: {}", seat_list.join(", ")),
        customer_email: buyer_email.to_string(),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SeatCategory;
    use crate::services::reservation::ReservationManager;
    use crate::services::testutil::StubGateway;
    use crate::store::memory::MemoryStore;
    use crate::store::{NewSeat, NewShow, SeatStore, ShowStore};
    use chrono::Duration;

    async fn setup() -> (
        Arc<MemoryStore>,
        ReservationManager,
        BookingLifecycle,
        i64,
        Vec<i64>,
    ) {
        let store = MemoryStore::new();
        let show = ShowStore::insert(
            store.as_ref(),
            NewShow {
                movie_id: 5,
                theatre: "Main".to_string(),
                starts_at: Utc::now() + Duration::hours(6),
                price: 10.0,
                total_seats: 3,
            },
        )
        .await
        .unwrap();
        let seats = store
            .insert_layout(
                show.id,
                (1..=3)
                    .map(|n| NewSeat {
                        seat_number: format!("B{n}"),
                        row: "B".to_string(),
                        category: SeatCategory::Normal,
                    })
                    .collect(),
            )
            .await
            .unwrap();
        let broadcaster = Broadcaster::new();
        let reservations = ReservationManager::new(store.stores(), broadcaster.clone());
        let lifecycle =
            BookingLifecycle::new(store.stores(), StubGateway::new(), broadcaster);
        (
            store,
            reservations,
            lifecycle,
            show.id,
            seats.iter().map(|s| s.id).collect(),
        )
    }

    #[tokio::test]
    async fn open_pending_creates_booking_against_live_holds() {
        let (store, reservations, lifecycle, show_id, seats) = setup().await;
        reservations.hold(show_id, &seats[..2], 9).await.unwrap();

        let (booking, session) = lifecycle
            .open_pending(9, "b@example.com", show_id, &seats[..2])
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.total_amount, 20.0);
        assert_eq!(booking.session_ref, session.id);
        assert_eq!(booking.seat_ids, &seats[..2]);
        assert!(!booking.ticket_issued);
        assert!(store.booking(booking.id).await.is_some());
    }

    #[tokio::test]
    async fn open_pending_rejects_lapsed_holds() {
        let (store, reservations, lifecycle, show_id, seats) = setup().await;
        reservations.hold(show_id, &seats[..2], 9).await.unwrap();
        store
            .set_reservation(seats[0], Some(9), Some(Utc::now() - Duration::seconds(1)))
            .await;

        let err = lifecycle
            .open_pending(9, "b@example.com", show_id, &seats[..2])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StaleReservation));
    }

    #[tokio::test]
    async fn open_pending_rejects_seats_held_by_someone_else() {
        let (_store, reservations, lifecycle, show_id, seats) = setup().await;
        reservations.hold(show_id, &seats[..1], 1).await.unwrap();

        let err = lifecycle
            .open_pending(2, "b@example.com", show_id, &seats[..1])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StaleReservation));
    }

    #[tokio::test]
    async fn retry_swaps_session_but_keeps_booking_identity() {
        let (store, reservations, lifecycle, show_id, seats) = setup().await;
        reservations.hold(show_id, &seats[..2], 9).await.unwrap();
        let (booking, first) = lifecycle
            .open_pending(9, "b@example.com", show_id, &seats[..2])
            .await
            .unwrap();

        let (retried, second) = lifecycle
            .retry_pending(booking.id, 9, "b@example.com")
            .await
            .unwrap();
        assert_eq!(retried.id, booking.id);
        assert_ne!(first.id, second.id);
        assert_eq!(
            store.booking(booking.id).await.unwrap().session_ref,
            second.id
        );
    }

    #[tokio::test]
    async fn retry_is_for_pending_bookings_only() {
        let (store, reservations, lifecycle, show_id, seats) = setup().await;
        reservations.hold(show_id, &seats[..1], 9).await.unwrap();
        let (booking, _) = lifecycle
            .open_pending(9, "b@example.com", show_id, &seats[..1])
            .await
            .unwrap();
        lifecycle.cancel_expired(booking.id).await.unwrap();
        assert_eq!(
            store.booking(booking.id).await.unwrap().status,
            BookingStatus::Cancelled
        );

        let err = lifecycle
            .retry_pending(booking.id, 9, "b@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn cancel_expired_is_idempotent() {
        let (store, reservations, lifecycle, show_id, seats) = setup().await;
        reservations.hold(show_id, &seats[..1], 9).await.unwrap();
        let (booking, _) = lifecycle
            .open_pending(9, "b@example.com", show_id, &seats[..1])
            .await
            .unwrap();

        lifecycle.cancel_expired(booking.id).await.unwrap();
        lifecycle.cancel_expired(booking.id).await.unwrap();
        assert_eq!(
            store.booking(booking.id).await.unwrap().status,
            BookingStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn listing_lazily_cancels_fully_lapsed_pending_bookings() {
        let (store, reservations, lifecycle, show_id, seats) = setup().await;
        reservations.hold(show_id, &seats[..2], 9).await.unwrap();
        let (booking, _) = lifecycle
            .open_pending(9, "b@example.com", show_id, &seats[..2])
            .await
            .unwrap();

        let past = Utc::now() - Duration::seconds(5);
        store.set_reservation(seats[0], Some(9), Some(past)).await;
        store.set_reservation(seats[1], Some(9), Some(past)).await;

        let listed = lifecycle.bookings_for_buyer(9).await.unwrap();
        assert!(listed.is_empty());
        assert_eq!(
            store.booking(booking.id).await.unwrap().status,
            BookingStatus::Cancelled
        );
        assert_eq!(
            store.seat(seats[0]).await.unwrap().status,
            crate::models::SeatStatus::Available
        );
    }
}
