use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Session;

/// Request body for creating a session
#[derive(Serialize, Deserialize, ToSchema, Default)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Response for a created session
#[derive(Serialize, Deserialize, ToSchema)]
pub struct CreateSessionResponse {
    pub session: Session,
}

/// Request body for joining a session
#[derive(Serialize, Deserialize, ToSchema)]
pub struct JoinSessionRequest {
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub image_url: String,
}
