use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A user taking part in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub image_url: String,
}

/// A shared editing session as kept by the session store.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Session {
    pub id: String,
    pub code: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub users: Vec<Participant>,
}

impl Session {
    pub fn new(id: String, code: String, language: String) -> Self {
        Self {
            id,
            code,
            language,
            created_at: Utc::now(),
            users: Vec::new(),
        }
    }

    /// Add a participant unless one with the same id is already present.
    /// Returns true if the list changed.
    pub fn add_participant(&mut self, participant: Participant) -> bool {
        if self.users.iter().any(|u| u.id == participant.id) {
            return false;
        }
        self.users.push(participant);
        true
    }

    /// Returns true if a participant was removed.
    pub fn remove_participant(&mut self, participant_id: &str) -> bool {
        let before = self.users.len();
        self.users.retain(|u| u.id != participant_id);
        self.users.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Participant {
        Participant {
            id: "u-1".to_string(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            color: "#ff0000".to_string(),
            image_url: String::new(),
        }
    }

    #[test]
    fn adding_same_participant_twice_keeps_one_entry() {
        let mut session = Session::new("s".into(), String::new(), "rust".into());
        assert!(session.add_participant(alice()));
        assert!(!session.add_participant(alice()));
        assert_eq!(session.users.len(), 1);
    }

    #[test]
    fn remove_participant_by_id() {
        let mut session = Session::new("s".into(), String::new(), "rust".into());
        session.add_participant(alice());
        assert!(!session.remove_participant("nobody"));
        assert!(session.remove_participant("u-1"));
        assert!(session.users.is_empty());
    }
}
