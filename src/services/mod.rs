pub mod booking;
pub mod broadcast;
pub mod payment;
pub mod reconcile;
pub mod reservation;
pub mod sweeper;
pub mod ticket;

#[cfg(test)]
pub(crate) mod testutil;
