//! Message channel the dispatcher publishes notification messages to.
//!
//! Pluggable behind a trait so the dispatcher can be exercised with an
//! in-memory channel in tests. Production uses Redis pub/sub; consumers
//! (email/push renderers) are separate processes outside this service.

use std::sync::Mutex;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::error::ApiError;
use crate::models::NotificationMessage;

#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Publish a single notification message. Failures surface as
    /// `ApiError::ChannelUnavailable`; the caller decides whether that is
    /// fatal (for the dispatcher it never is).
    async fn publish(&self, message: &NotificationMessage) -> Result<(), ApiError>;
}

/// Redis pub/sub channel.
pub struct RedisChannel {
    conn: ConnectionManager,
    channel: String,
}

impl RedisChannel {
    pub async fn connect(redis_url: &str, channel: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Notification channel connected to Redis ({})", channel);
        Ok(Self {
            conn,
            channel: channel.to_string(),
        })
    }
}

#[async_trait]
impl MessageChannel for RedisChannel {
    async fn publish(&self, message: &NotificationMessage) -> Result<(), ApiError> {
        let payload = serde_json::to_string(message)
            .map_err(|e| ApiError::ChannelUnavailable(format!("serialize: {}", e)))?;
        let mut conn = self.conn.clone();
        redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(payload)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| ApiError::ChannelUnavailable(e.to_string()))?;
        Ok(())
    }
}

/// Used when no message transport is configured; publishes are dropped.
pub struct NoopChannel;

#[async_trait]
impl MessageChannel for NoopChannel {
    async fn publish(&self, _message: &NotificationMessage) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Collects published messages in memory. Used by tests and local runs that
/// need to observe what would have been published.
#[derive(Default)]
pub struct InMemoryChannel {
    messages: Mutex<Vec<NotificationMessage>>,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<NotificationMessage> {
        self.messages.lock().expect("channel mutex poisoned").clone()
    }
}

#[async_trait]
impl MessageChannel for InMemoryChannel {
    async fn publish(&self, message: &NotificationMessage) -> Result<(), ApiError> {
        self.messages
            .lock()
            .expect("channel mutex poisoned")
            .push(message.clone());
        Ok(())
    }
}
