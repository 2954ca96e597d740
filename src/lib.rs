pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod redis_client;
pub mod services;
pub mod store;

use std::sync::Arc;

use services::booking::BookingLifecycle;
use services::broadcast::Broadcaster;
use services::payment::{CheckoutClient, CheckoutGateway};
use services::reconcile::ConfirmationReconciler;
use services::reservation::ReservationManager;
use services::sweeper::SweepContext;
use services::ticket::{HttpTicketDelivery, NoopTicketDelivery, TicketDelivery};
use store::postgres::PgStore;
use store::Stores;

// Shared state for the whole application.
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub redis: redis_client::RedisClient,
    pub cache: cache::CacheService,
    pub config: config::Config,
    pub stores: Stores,
    pub broadcaster: Broadcaster,
    pub gateway: Arc<dyn CheckoutGateway>,
    pub reservations: Arc<ReservationManager>,
    pub bookings: Arc<BookingLifecycle>,
    pub reconciler: Arc<ConfirmationReconciler>,
}

impl AppState {
    pub async fn new(config: config::Config) -> Result<Arc<Self>, Box<dyn std::error::Error>> {
        let db = database::Database::new(&config.database.url, config.database.pool_size).await?;
        db.run_migrations().await?;

        let redis = redis_client::RedisClient::new(&config.redis.url).await?;

        let pg = Arc::new(PgStore::new(db.pool.clone()));
        let stores = Stores {
            seats: pg.clone(),
            bookings: pg.clone(),
            shows: pg,
        };
        let cache = cache::CacheService::new(redis.clone(), stores.clone());

        let broadcaster = Broadcaster::new();
        let gateway: Arc<dyn CheckoutGateway> =
            Arc::new(CheckoutClient::from_config(&config.checkout));
        let tickets: Arc<dyn TicketDelivery> = match &config.ticket.delivery_url {
            Some(url) => Arc::new(HttpTicketDelivery::new(url.clone())),
            None => Arc::new(NoopTicketDelivery),
        };

        let reservations = Arc::new(ReservationManager::new(
            stores.clone(),
            broadcaster.clone(),
        ));
        let bookings = Arc::new(BookingLifecycle::new(
            stores.clone(),
            gateway.clone(),
            broadcaster.clone(),
        ));
        let reconciler = Arc::new(ConfirmationReconciler::new(
            stores.clone(),
            broadcaster.clone(),
            tickets,
        ));

        Ok(Arc::new(Self {
            db,
            redis,
            cache,
            config,
            stores,
            broadcaster,
            gateway,
            reservations,
            bookings,
            reconciler,
        }))
    }

    pub fn sweep_context(&self) -> SweepContext {
        SweepContext {
            stores: self.stores.clone(),
            reservations: self.reservations.clone(),
            lifecycle: self.bookings.clone(),
            broadcaster: self.broadcaster.clone(),
            cache: Some(self.cache.clone()),
        }
    }
}
