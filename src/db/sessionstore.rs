use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Participant, Session};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session '{0}' not found")]
    NotFound(String),
}

/// Durable per-session state with expiry.
///
/// Each operation is an independent read-modify-write; nothing is atomic
/// across calls. Every write refreshes the session's time to live.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: Session) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Session, StoreError>;

    /// Full overwrite of a session.
    async fn update(&self, session: Session) -> Result<(), StoreError>;

    /// No-op when a participant with the same id is already present.
    async fn add_participant(&self, id: &str, participant: Participant) -> Result<(), StoreError> {
        let mut session = self.get(id).await?;
        if !session.add_participant(participant) {
            return Ok(());
        }
        self.update(session).await
    }

    async fn remove_participant(&self, id: &str, participant_id: &str) -> Result<(), StoreError> {
        let mut session = self.get(id).await?;
        session.remove_participant(participant_id);
        self.update(session).await
    }

    async fn update_code(&self, id: &str, code: &str) -> Result<(), StoreError> {
        let mut session = self.get(id).await?;
        session.code = code.to_string();
        self.update(session).await
    }

    async fn update_language(&self, id: &str, language: &str) -> Result<(), StoreError> {
        let mut session = self.get(id).await?;
        session.language = language.to_string();
        self.update(session).await
    }

    /// Number of sessions currently held, for diagnostics.
    fn entry_count(&self) -> u64;
}
