//! Redis-backed cache for per-show seat lists.
//!
//! Read-path optimization only: every seat mutation path invalidates the
//! show's entry, and the TTL is short enough that a missed invalidation
//! heals on its own. The store stays the single source of truth.

use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::models::Seat;
use crate::redis_client::RedisClient;
use crate::store::Stores;

const SEATS_TTL_SECS: u64 = 60;

#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
    stores: Stores,
}

impl CacheService {
    pub fn new(redis: RedisClient, stores: Stores) -> Self {
        Self { redis, stores }
    }

    fn seats_key(show_id: i64) -> String {
        format!("seats:{show_id}")
    }

    /// The show's seat list, from cache when possible. Cache trouble is
    /// logged and falls through to the store.
    pub async fn get_seats(&self, show_id: i64) -> Result<Vec<Seat>, crate::store::StoreError> {
        let key = Self::seats_key(show_id);
        let mut conn = self.redis.conn.clone();

        if let Ok(raw) = conn.get::<_, String>(&key).await {
            if let Ok(seats) = serde_json::from_str::<Vec<Seat>>(&raw) {
                debug!(show_id, "seat list served from cache");
                return Ok(seats);
            }
        }

        let seats = self.stores.seats.seats_for_show(show_id).await?;
        match serde_json::to_string(&seats) {
            Ok(raw) => {
                if let Err(e) = conn.set_ex::<_, _, ()>(&key, raw, SEATS_TTL_SECS).await {
                    warn!(show_id, "failed to fill seat cache: {e}");
                }
            }
            Err(e) => warn!(show_id, "failed to serialize seat list: {e}"),
        }
        Ok(seats)
    }

    pub async fn invalidate_seats(&self, show_id: i64) {
        let mut conn = self.redis.conn.clone();
        if let Err(e) = conn.del::<_, ()>(Self::seats_key(show_id)).await {
            warn!(show_id, "failed to invalidate seat cache: {e}");
        }
    }
}
