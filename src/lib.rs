// Library root - exports for integration tests

pub mod background;
pub mod cache;
pub mod channel;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

pub use config::Config;

use std::sync::Arc;

use cache::CacheLayer;
use channel::MessageChannel;
use database::DatabasePool;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DatabasePool,
    pub config: Arc<Config>,
    pub cache: CacheLayer,
    pub channel: Arc<dyn MessageChannel>,
}
