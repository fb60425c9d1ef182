use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::models::Session;
use super::sessionstore::{SessionStore, StoreError};

/// Session store kept in process memory.
///
/// Entries expire `ttl` after their last write; reads do not extend them.
pub struct MemorySessionStore {
    sessions: Cache<String, Session>,
}

impl MemorySessionStore {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let sessions = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        info!("Session store initialized (capacity {}, ttl {:?})", max_capacity, ttl);
        Self { sessions }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.session_store_capacity, config.session_ttl())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: Session) -> Result<(), StoreError> {
        debug!(session_id = %session.id, "Creating session");
        self.sessions.insert(session.id.clone(), session).await;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Session, StoreError> {
        self.sessions
            .get(id)
            .await
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update(&self, session: Session) -> Result<(), StoreError> {
        // Re-inserting restarts the entry's time to live.
        self.sessions.insert(session.id.clone(), session).await;
        Ok(())
    }

    fn entry_count(&self) -> u64 {
        self.sessions.entry_count()
    }
}
