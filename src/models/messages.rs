use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::Participant;

/// Discriminant of a websocket frame (the `type` field on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CursorMove,
    CodeChange,
    LanguageChange,
    Ping,
    Pong,
    UserJoin,
    UserLeave,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CursorPosition {
    pub line: u32,
    pub column: u32,
    /// Client-supplied extras (e.g. the user's label) relayed untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CodeChange {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LanguageChange {
    pub language: String,
}

/// Typed payload of a websocket frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    CursorMove(CursorPosition),
    CodeChange(CodeChange),
    LanguageChange(LanguageChange),
    Ping,
    Pong,
    UserJoin(Participant),
    UserLeave,
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::CursorMove(_) => EventType::CursorMove,
            Event::CodeChange(_) => EventType::CodeChange,
            Event::LanguageChange(_) => EventType::LanguageChange,
            Event::Ping => EventType::Ping,
            Event::Pong => EventType::Pong,
            Event::UserJoin(_) => EventType::UserJoin,
            Event::UserLeave => EventType::UserLeave,
        }
    }
}

/// A websocket message: routing header plus typed event.
#[derive(Debug, Clone, PartialEq)]
pub struct WsMessage {
    pub session_id: String,
    pub user_id: String,
    pub event: Event,
}

/// Wire layout: `{type, session_id, user_id, user?, data?}`.
#[derive(Serialize, Deserialize, Debug)]
struct Frame {
    #[serde(rename = "type")]
    kind: EventType,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<Participant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0:?} frame carries no data")]
    MissingData(EventType),
    #[error("{0:?} frame carries no user")]
    MissingUser(EventType),
    #[error("invalid {kind:?} data: {source}")]
    InvalidData {
        kind: EventType,
        source: serde_json::Error,
    },
}

fn payload<T: serde::de::DeserializeOwned>(kind: EventType, data: Option<Value>) -> Result<T, DecodeError> {
    let data = data.ok_or(DecodeError::MissingData(kind))?;
    serde_json::from_value(data).map_err(|source| DecodeError::InvalidData { kind, source })
}

impl WsMessage {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>, event: Event) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            event,
        }
    }

    /// Current code of a session, as sent to late joiners.
    pub fn code_change(session_id: &str, code: &str) -> Self {
        Self::new(session_id, "", Event::CodeChange(CodeChange { code: code.to_string(), timestamp: None }))
    }

    /// Current language of a session, as sent to late joiners.
    pub fn language_change(session_id: &str, language: &str) -> Self {
        Self::new(session_id, "", Event::LanguageChange(LanguageChange { language: language.to_string() }))
    }

    pub fn pong(session_id: &str) -> Self {
        Self::new(session_id, "", Event::Pong)
    }

    pub fn user_join(session_id: &str, participant: &Participant) -> Self {
        Self::new(session_id, participant.id.clone(), Event::UserJoin(participant.clone()))
    }

    pub fn user_leave(session_id: &str, user_id: &str) -> Self {
        Self::new(session_id, user_id, Event::UserLeave)
    }

    pub fn event_type(&self) -> EventType {
        self.event.event_type()
    }

    /// Decode a text frame. Unknown `type` values fail as `DecodeError::Json`.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let frame: Frame = serde_json::from_str(text)?;
        let kind = frame.kind;
        let event = match kind {
            EventType::CursorMove => Event::CursorMove(payload(kind, frame.data)?),
            EventType::CodeChange => Event::CodeChange(payload(kind, frame.data)?),
            EventType::LanguageChange => Event::LanguageChange(payload(kind, frame.data)?),
            EventType::Ping => Event::Ping,
            EventType::Pong => Event::Pong,
            EventType::UserJoin => Event::UserJoin(frame.user.ok_or(DecodeError::MissingUser(kind))?),
            EventType::UserLeave => Event::UserLeave,
        };
        Ok(Self {
            session_id: frame.session_id.unwrap_or_default(),
            user_id: frame.user_id.unwrap_or_default(),
            event,
        })
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let (user, data) = match &self.event {
            Event::CursorMove(cursor) => (None, Some(serde_json::to_value(cursor)?)),
            Event::CodeChange(change) => (None, Some(serde_json::to_value(change)?)),
            Event::LanguageChange(change) => (None, Some(serde_json::to_value(change)?)),
            Event::UserJoin(participant) => (Some(participant.clone()), None),
            Event::Ping | Event::Pong | Event::UserLeave => (None, None),
        };
        serde_json::to_string(&Frame {
            kind: self.event_type(),
            session_id: Some(self.session_id.clone()),
            user_id: Some(self.user_id.clone()),
            user,
            data,
        })
    }
}
