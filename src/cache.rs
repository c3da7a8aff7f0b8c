//! Read-through cache for single-event detail views, backed by Redis.
//!
//! The cache is best-effort: when Redis is unreachable at startup the layer
//! runs disabled, and per-call failures are logged and treated as misses.
//! Search listings never go through here (result sets are criteria-dependent).

use redis::aio::ConnectionManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

const KEY_PREFIX: &str = "event_locator:";

#[derive(Clone)]
pub struct CacheLayer {
    conn: Option<ConnectionManager>,
    ttl_seconds: u64,
}

impl CacheLayer {
    /// Connect to Redis, or run disabled when it is not reachable.
    pub async fn connect(redis_url: &str, ttl_seconds: u64) -> Self {
        let conn = match redis::Client::open(redis_url) {
            Ok(client) => match ConnectionManager::new(client).await {
                Ok(conn) => {
                    tracing::info!("Event cache connected to Redis");
                    Some(conn)
                }
                Err(e) => {
                    tracing::warn!("Redis connection failed - continuing without caching: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Invalid Redis URL - continuing without caching: {}", e);
                None
            }
        };
        Self { conn, ttl_seconds }
    }

    pub fn disabled() -> Self {
        Self {
            conn: None,
            ttl_seconds: 0,
        }
    }

    pub fn event_key(event_id: Uuid) -> String {
        format!("{}event:{}", KEY_PREFIX, event_id)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone()?;
        match redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await
        {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!("Discarding unreadable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Error getting from cache: {}", e);
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Error serializing cache entry {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = redis::cmd("SET")
            .arg(key)
            .arg(raw)
            .arg("EX")
            .arg(self.ttl_seconds)
            .query_async::<_, ()>(&mut conn)
            .await
        {
            tracing::warn!("Error setting cache: {}", e);
        }
    }

    pub async fn invalidate(&self, key: &str) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };
        if let Err(e) = redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await
        {
            tracing::warn!("Error invalidating cache: {}", e);
        }
    }
}
