//! Shared stubs for the service unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::models::Booking;
use crate::services::payment::{
    CheckoutGateway, CheckoutSession, GatewayError, OpenSessionRequest, SessionState,
};
use crate::services::ticket::{TicketDelivery, TicketError};

/// Gateway that mints sequential session references without any I/O.
pub struct StubGateway {
    counter: AtomicU64,
}

impl StubGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            counter: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl CheckoutGateway for StubGateway {
    async fn open_session(
        &self,
        _request: OpenSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CheckoutSession {
            id: format!("cs_{n}"),
            url: format!("https://checkout.example/cs_{n}"),
        })
    }

    async fn session_state(&self, _session_ref: &str) -> Result<SessionState, GatewayError> {
        Err(GatewayError::Rejected("not used by this stub".to_string()))
    }
}

/// Counts issuance calls; optionally fails each one.
pub struct CountingTickets {
    issued: AtomicUsize,
    fail: bool,
}

impl CountingTickets {
    pub fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            issued: AtomicUsize::new(0),
            fail,
        })
    }

    pub fn count(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TicketDelivery for CountingTickets {
    async fn issue(&self, _booking: &Booking) -> Result<(), TicketError> {
        self.issued.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(TicketError::Rejected("stub delivery failure".to_string()));
        }
        Ok(())
    }
}
