//! Redis cache for package price quotes.
//!
//! Keys embed the package `revision`, so a reference-data change that bumps
//! the revision makes old entries unreachable. They then age out via TTL or
//! are dropped eagerly with [`QuoteCache::invalidate_package`].

use redis::AsyncCommands;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Occupancy, PackagePriceQuote};
use crate::redis_client::RedisClient;

const KEY_PREFIX: &str = "quote";

#[derive(Clone)]
pub struct QuoteCache {
    redis: RedisClient,
    ttl_seconds: u64,
}

pub fn quote_key(package_id: Uuid, revision: i64, occupancy: &Occupancy) -> String {
    let ages = if occupancy.has_ages() {
        occupancy.child_ages.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(".")
    } else {
        "-".to_string()
    };
    format!(
        "{}:{}:r{}:a{}:c{}:{}",
        KEY_PREFIX, package_id, revision, occupancy.adults, occupancy.children, ages
    )
}

impl QuoteCache {
    pub fn new(redis: RedisClient, ttl_seconds: u64) -> Self {
        Self { redis, ttl_seconds }
    }

    /// Cache misses and Redis failures both come back as `None`.
    pub async fn get(&self, key: &str) -> Option<PackagePriceQuote> {
        let mut conn = self.redis.conn.clone();
        let data: Option<String> = match conn.get(key).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Quote cache read failed for {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&data?) {
            Ok(quote) => Some(quote),
            Err(e) => {
                warn!("Discarding unreadable cached quote {}: {}", key, e);
                None
            }
        }
    }

    pub async fn put(&self, key: &str, quote: &PackagePriceQuote) {
        let data = match serde_json::to_string(quote) {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to serialize quote {}: {}", key, e);
                return;
            }
        };
        let mut conn = self.redis.conn.clone();
        if let Err(e) = conn.set_ex::<_, _, ()>(key, data, self.ttl_seconds).await {
            warn!("Quote cache write failed for {}: {}", key, e);
        }
    }

    /// Drops every cached quote of the package, whatever its revision.
    pub async fn invalidate_package(&self, package_id: Uuid) -> redis::RedisResult<usize> {
        let mut conn = self.redis.conn.clone();
        let pattern = format!("{}:{}:*", KEY_PREFIX, package_id);
        let mut cursor: u64 = 0;
        let mut removed = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: usize = conn.del(keys).await?;
                removed += deleted;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!("Invalidated {} cached quotes for package {}", removed, package_id);
        Ok(removed)
    }
}
