//! Periodic expiry sweeps.
//!
//! Two independent loops owned by one scheduler with an explicit start/stop
//! lifecycle: the seat-hold sweep reclaims lapsed reservations and cancels
//! the pending bookings they backed, the show-retirement sweep deletes shows
//! whose start time has passed unless a confirmed booking pins them. Each
//! tick is self-contained and idempotent; a failure in one tick (or for one
//! show) is logged and never stops the loop.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::cache::CacheService;
use crate::error::Result;
use crate::services::booking::BookingLifecycle;
use crate::services::broadcast::Broadcaster;
use crate::services::reservation::ReservationManager;
use crate::store::Stores;

/// Everything one sweep tick needs. Cloneable so each loop owns a handle.
#[derive(Clone)]
pub struct SweepContext {
    pub stores: Stores,
    pub reservations: Arc<ReservationManager>,
    pub lifecycle: Arc<BookingLifecycle>,
    pub broadcaster: Broadcaster,
    pub cache: Option<CacheService>,
}

impl SweepContext {
    /// One seat-hold sweep pass: release every lapsed hold, then cancel
    /// still-pending bookings that were counting on the released seats.
    pub async fn sweep_seat_holds(&self) -> Result<()> {
        let now = Utc::now();
        let released = self.reservations.sweep_all(now).await?;
        if released.is_empty() {
            return Ok(());
        }

        for (show_id, seats) in released {
            info!(show_id, count = seats.len(), "released lapsed seat holds");
            self.invalidate_cache(show_id).await;

            let released_ids: HashSet<i64> = seats.iter().map(|s| s.id).collect();
            let pending = match self.stores.bookings.pending_for_show(show_id).await {
                Ok(pending) => pending,
                Err(e) => {
                    // One show's bookings failing must not block the rest.
                    error!(show_id, "failed to list pending bookings: {e}");
                    continue;
                }
            };
            for booking in pending {
                if !booking.seat_ids.iter().any(|id| released_ids.contains(id)) {
                    continue;
                }
                if let Err(e) = self.lifecycle.cancel_expired(booking.id).await {
                    error!(booking_id = booking.id, "failed to cancel expired booking: {e}");
                }
            }
        }
        Ok(())
    }

    /// One retirement pass over shows whose start time has passed.
    pub async fn retire_elapsed_shows(&self) -> Result<()> {
        let now = Utc::now();
        for show in self.stores.shows.started_before(now).await? {
            if let Err(e) = self.retire_show(show.id).await {
                error!(show_id = show.id, "failed to retire show: {e}");
            }
        }
        Ok(())
    }

    async fn retire_show(&self, show_id: i64) -> Result<()> {
        // A confirmed booking pins the show: purchase history and issued
        // tickets must keep resolving.
        if self.stores.bookings.show_has_confirmed(show_id).await? {
            return Ok(());
        }

        let seats = self.stores.seats.delete_for_show(show_id).await?;
        let bookings = self.stores.bookings.delete_for_show(show_id).await?;
        self.stores.shows.delete(show_id).await?;
        self.broadcaster.publish_retired(show_id);
        self.invalidate_cache(show_id).await;
        info!(show_id, seats, bookings, "retired elapsed show");
        Ok(())
    }

    async fn invalidate_cache(&self, show_id: i64) {
        if let Some(cache) = &self.cache {
            cache.invalidate_seats(show_id).await;
        }
    }
}

pub struct SweepScheduler {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl SweepScheduler {
    pub fn start(ctx: SweepContext, seat_interval: Duration, show_interval: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);

        let handles = vec![
            spawn_loop(
                "seat-hold sweep",
                seat_interval,
                shutdown.subscribe(),
                ctx.clone(),
                |ctx| Box::pin(async move { ctx.sweep_seat_holds().await }),
            ),
            spawn_loop(
                "show-retirement sweep",
                show_interval,
                shutdown.subscribe(),
                ctx,
                |ctx| Box::pin(async move { ctx.retire_elapsed_shows().await }),
            ),
        ];

        Self { shutdown, handles }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("sweep scheduler stopped");
    }
}

type TickFuture = std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>>;

fn spawn_loop(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    ctx: SweepContext,
    tick: fn(SweepContext) -> TickFuture,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // In-process overlap guard: if a tick outlives the period, the next
        // one is skipped rather than piled on top.
        let running = Arc::new(Mutex::new(()));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(sweep = name, period_secs = period.as_secs(), "sweep loop started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let Ok(_guard) = running.try_lock() else {
                        warn!(sweep = name, "previous tick still running, skipping");
                        continue;
                    };
                    if let Err(e) = tick(ctx.clone()).await {
                        error!(sweep = name, "sweep tick failed: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    info!(sweep = name, "sweep loop stopping");
                    break;
                }
            }
        }
    })
}
