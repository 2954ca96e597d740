//! Property tests: arbitrary hold/release interleavings never violate the
//! single-holder invariant, and hold outcomes always agree with the seat
//! state observed right before the call.

use chrono::Utc;
use proptest::prelude::*;

use cinebook::error::Error;
use cinebook::models::{SeatCategory, SeatStatus};
use cinebook::policy;
use cinebook::services::broadcast::Broadcaster;
use cinebook::services::reservation::ReservationManager;
use cinebook::store::memory::MemoryStore;
use cinebook::store::{NewSeat, NewShow, SeatStore, ShowStore};

#[derive(Debug, Clone)]
struct Op {
    hold: bool,
    buyer: i64,
    seat_mask: u8,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    (any::<bool>(), 0..2i64, 1..8u8).prop_map(|(hold, buyer, seat_mask)| Op {
        hold,
        buyer: buyer + 1,
        seat_mask,
    })
}

async fn run_ops(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let store = MemoryStore::new();
    let show = ShowStore::insert(
        store.as_ref(),
        NewShow {
            movie_id: 1,
            theatre: "P".to_string(),
            starts_at: Utc::now() + chrono::Duration::hours(1),
            price: 5.0,
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
                    seat_number: format!("A{n}"),
                    row: "A".to_string(),
                    category: SeatCategory::Normal,
                })
                .collect(),
        )
        .await
        .unwrap();
    let seat_ids: Vec<i64> = seats.iter().map(|s| s.id).collect();
    let manager = ReservationManager::new(store.stores(), Broadcaster::new());

    for op in ops {
        let requested: Vec<i64> = seat_ids
            .iter()
            .enumerate()
            .filter(|(i, _)| op.seat_mask & (1 << i) != 0)
            .map(|(_, id)| *id)
            .collect();

        // Snapshot before the call; nothing else mutates in between.
        let mut blocked = false;
        for id in &requested {
            let seat = store.seat(*id).await.unwrap();
            if seat.status == SeatStatus::Reserved
                && seat.reserved_by != Some(op.buyer)
                && !policy::hold_expired(seat.reserved_until, Utc::now())
            {
                blocked = true;
            }
        }

        if op.hold {
            match manager.hold(show.id, &requested, op.buyer).await {
                Ok(_) => {
                    prop_assert!(!blocked, "hold succeeded over a live foreign hold");
                    for id in &requested {
                        let seat = store.seat(*id).await.unwrap();
                        prop_assert_eq!(seat.status, SeatStatus::Reserved);
                        prop_assert_eq!(seat.reserved_by, Some(op.buyer));
                        prop_assert!(seat.reserved_until.is_some());
                    }
                }
                Err(Error::Conflict) => {
                    prop_assert!(blocked, "conflict without a live foreign hold");
                }
                Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
            }
        } else {
            let released = manager.release(show.id, &requested, op.buyer).await.unwrap();
            for seat in &released {
                prop_assert_eq!(seat.status, SeatStatus::Available);
            }
            // Foreign holds must have survived the release untouched.
            for id in &requested {
                let seat = store.seat(*id).await.unwrap();
                if let Some(holder) = seat.reserved_by {
                    prop_assert_ne!(holder, op.buyer);
                }
            }
        }

        // Global invariant: reserved implies a holder and a deadline.
        for id in &seat_ids {
            let seat = store.seat(*id).await.unwrap();
            if seat.status == SeatStatus::Reserved {
                prop_assert!(seat.reserved_by.is_some());
                prop_assert!(seat.reserved_until.is_some());
            } else {
                prop_assert_eq!(seat.reserved_by, None);
                prop_assert_eq!(seat.reserved_until, None);
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn hold_release_interleavings_preserve_single_holder(
        ops in proptest::collection::vec(op_strategy(), 1..40)
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(run_ops(ops))?;
    }
}
