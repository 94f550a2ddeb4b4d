pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::app::activity::ActivityLogger;
use crate::config::AppConfig;
use crate::infra::{
    cache::RedisCache,
    db::Db,
    documents::DocumentStore,
    response_cache::{MemoryResponseCache, ResponseCache},
    storage::FileStorage,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub cache: RedisCache,
    pub documents: DocumentStore,
    pub storage: FileStorage,
    pub response_cache: Arc<dyn ResponseCache>,
    pub activity: ActivityLogger,
    pub token_key: [u8; 32],
    pub token_ttl_days: u64,
}

impl AppState {
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let db = Db::connect(config).await?;
        let cache = RedisCache::connect(&config.redis_url).await?;
        let documents = DocumentStore::new(db.clone());
        let storage = FileStorage::new(&config.static_dir, config.upload_max_bytes).await?;
        let response_cache: Arc<dyn ResponseCache> = Arc::new(MemoryResponseCache::new(
            Duration::from_secs(config.cache_ttl_seconds),
        ));
        let activity = ActivityLogger::new(documents.clone(), config.log_batch_size);

        Ok(Self {
            db,
            cache,
            documents,
            storage,
            response_cache,
            activity,
            token_key: config.token_key,
            token_ttl_days: config.token_ttl_days,
        })
    }
}
