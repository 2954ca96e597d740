//! Checkout-gateway client.
//!
//! The engine only opens checkout sessions and asks for their payment
//! status; redirect pages, card handling and retries on the provider side
//! are the provider's business. All network calls go through a circuit
//! breaker so a dead gateway fails fast instead of piling up requests.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::CheckoutConfig;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("checkout gateway temporarily unavailable (circuit open)")]
    CircuitOpen,

    #[error("checkout gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("checkout gateway rejected the request: {0}")]
    Rejected(String),
}

/// Metadata attached to every session; echoed back by the provider in both
/// the webhook push and the status pull. `booking_id` is only present for
/// retried sessions, where the session reference alone may be superseded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<i64>,
    pub buyer_id: i64,
    pub show_id: i64,
}

pub struct OpenSessionRequest {
    pub amount_cents: i64,
    pub product_name: String,
    pub description: String,
    pub customer_email: String,
    pub metadata: SessionMetadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Pull-side view of a session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub id: String,
    pub payment_status: String,
    #[serde(default)]
    pub metadata: Option<SessionMetadata>,
}

#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn open_session(
        &self,
        request: OpenSessionRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    async fn session_state(&self, session_ref: &str) -> Result<SessionState, GatewayError>;
}

/* ---------- circuit breaker ---------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerMode {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    mode: BreakerMode,
    failures: u32,
    opened_at: Option<Instant>,
}

/// Minimal circuit breaker for the gateway HTTP surface: `threshold`
/// consecutive failures open it, one probe is allowed after `cooldown`.
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                mode: BreakerMode::Closed,
                failures: 0,
                opened_at: None,
            }),
            threshold,
            cooldown,
        }
    }

    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.mode {
            BreakerMode::Closed | BreakerMode::HalfOpen => true,
            BreakerMode::Open => {
                let cooled = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.cooldown)
                    .unwrap_or(true);
                if cooled {
                    inner.mode = BreakerMode::HalfOpen;
                    info!("checkout circuit breaker half-open, allowing a probe");
                }
                cooled
            }
        }
    }

    pub fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.mode == BreakerMode::HalfOpen {
            info!("checkout circuit breaker closed again");
        }
        inner.mode = BreakerMode::Closed;
        inner.failures = 0;
        inner.opened_at = None;
    }

    pub fn on_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures += 1;
        if inner.mode == BreakerMode::HalfOpen || inner.failures >= self.threshold {
            if inner.mode != BreakerMode::Open {
                warn!(
                    failures = inner.failures,
                    "checkout circuit breaker opened"
                );
            }
            inner.mode = BreakerMode::Open;
            inner.opened_at = Some(Instant::now());
        }
    }
}

/* ---------- HTTP client ---------- */

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OpenSessionBody<'a> {
    amount_cents: i64,
    currency: &'a str,
    product_name: &'a str,
    description: &'a str,
    success_url: &'a str,
    cancel_url: &'a str,
    customer_email: &'a str,
    metadata: &'a SessionMetadata,
}

#[derive(Deserialize)]
struct OpenSessionReply {
    success: bool,
    #[serde(flatten)]
    session: Option<CheckoutSession>,
    message: Option<String>,
}

pub struct CheckoutClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    currency: String,
    success_url: String,
    cancel_url: String,
    breaker: Arc<CircuitBreaker>,
}

impl CheckoutClient {
    pub fn from_config(config: &CheckoutConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build checkout HTTP client"),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            currency: config.currency.clone(),
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
            breaker: Arc::new(CircuitBreaker::new(
                config.breaker_failure_threshold,
                Duration::from_secs(config.breaker_cooldown_secs),
            )),
        }
    }

    async fn guarded<T, F>(&self, operation: F) -> Result<T, GatewayError>
    where
        F: std::future::Future<Output = Result<T, reqwest::Error>>,
    {
        if !self.breaker.allow() {
            return Err(GatewayError::CircuitOpen);
        }
        match operation.await {
            Ok(value) => {
                self.breaker.on_success();
                Ok(value)
            }
            Err(e) => {
                self.breaker.on_failure();
                Err(GatewayError::Http(e))
            }
        }
    }
}

#[async_trait]
impl CheckoutGateway for CheckoutClient {
    async fn open_session(
        &self,
        request: OpenSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let body = OpenSessionBody {
            amount_cents: request.amount_cents,
            currency: &self.currency,
            product_name: &request.product_name,
            description: &request.description,
            success_url: &self.success_url,
            cancel_url: &self.cancel_url,
            customer_email: &request.customer_email,
            metadata: &request.metadata,
        };

        // One key per attempt: a provider-side retry of this request must
        // not mint a second session.
        let idempotency_key = uuid::Uuid::new_v4().to_string();
        let reply: OpenSessionReply = self
            .guarded(async {
                self.http
                    .post(format!("{}/v1/checkout/sessions", self.base_url))
                    .bearer_auth(&self.api_key)
                    .header("Idempotency-Key", &idempotency_key)
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await
            })
            .await?;

        if !reply.success {
            let message = reply
                .message
                .unwrap_or_else(|| "unknown gateway error".to_string());
            return Err(GatewayError::Rejected(message));
        }
        reply
            .session
            .ok_or_else(|| GatewayError::Rejected("gateway reply carried no session".to_string()))
    }

    async fn session_state(&self, session_ref: &str) -> Result<SessionState, GatewayError> {
        self.guarded(async {
            self.http
                .get(format!(
                    "{}/v1/checkout/sessions/{session_ref}",
                    self.base_url
                ))
                .bearer_auth(&self.api_key)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
        })
        .await
    }
}

/* ---------- webhook authenticity ---------- */

/// Checks the hex HMAC-SHA256 of the raw webhook body against the value the
/// provider put in `X-Checkout-Signature`.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
