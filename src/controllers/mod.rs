pub mod bookings;
pub mod payment;
pub mod seats;
pub mod shows;
pub mod ws;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(seats::routes())
        .merge(bookings::routes())
        .merge(payment::routes())
        .merge(shows::routes())
        .merge(ws::routes())
}
