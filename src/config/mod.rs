use std::env;

use crate::policy;

// Top-level configuration container, populated from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub checkout: CheckoutConfig,
    pub ticket: TicketConfig,
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

// Checkout gateway settings, including the webhook shared secret and the
// circuit breaker knobs.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub base_url: String,
    pub api_key: String,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub webhook_secret: String,
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_secs: u64,
}

#[derive(Debug, Clone)]
pub struct TicketConfig {
    /// Delivery service endpoint; absent means issuance is logged only.
    pub delivery_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub seat_interval_secs: u64,
    pub show_interval_secs: u64,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: &str) -> T {
    env_or(key, default)
        .parse()
        .unwrap_or_else(|_| panic!("{key} must be a valid number"))
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            app: AppConfig {
                host: env_or("HOST", "0.0.0.0"),
                port: env_parse("PORT", "8000"),
                rust_log: env_or("RUST_LOG", "cinebook=debug,tower_http=info"),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
                pool_size: env_parse("DB_POOL_SIZE", "20"),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").expect("REDIS_URL must be set"),
            },
            checkout: CheckoutConfig {
                base_url: env_or("CHECKOUT_BASE_URL", "https://checkout.example.com"),
                api_key: env::var("CHECKOUT_API_KEY").expect("CHECKOUT_API_KEY must be set"),
                currency: env_or("CHECKOUT_CURRENCY", "usd"),
                success_url: env_or(
                    "CHECKOUT_SUCCESS_URL",
                    "http://localhost:5173/booking/success?session_id={CHECKOUT_SESSION_ID}",
                ),
                cancel_url: env_or("CHECKOUT_CANCEL_URL", "http://localhost:5173/booking/cancel"),
                webhook_secret: env::var("CHECKOUT_WEBHOOK_SECRET")
                    .expect("CHECKOUT_WEBHOOK_SECRET must be set"),
                breaker_failure_threshold: env_parse("CHECKOUT_BREAKER_FAILURES", "5"),
                breaker_cooldown_secs: env_parse("CHECKOUT_BREAKER_COOLDOWN_SECONDS", "60"),
            },
            ticket: TicketConfig {
                delivery_url: env::var("TICKET_DELIVERY_URL").ok(),
            },
            sweep: SweepConfig {
                seat_interval_secs: env_parse(
                    "SEAT_SWEEP_INTERVAL_SECONDS",
                    &policy::SEAT_SWEEP_INTERVAL_SECS.to_string(),
                ),
                show_interval_secs: env_parse(
                    "SHOW_SWEEP_INTERVAL_SECONDS",
                    &policy::SHOW_SWEEP_INTERVAL_SECS.to_string(),
                ),
            },
        }
    }
}
