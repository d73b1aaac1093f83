use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{GameKind, Language, SessionSettings},
    dto::view::ViewResponse,
};

/// Optional overrides for a new session. An empty object uses the configured defaults.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct CreateSessionRequest {
    pub language: Option<Language>,
    #[validate(range(min = 2, max = 12))]
    pub max_players: Option<u8>,
    pub settings: Option<SessionSettings>,
}

/// Response to a successful session creation.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedSession {
    pub session_id: Uuid,
    pub room_code: String,
    pub join_url: String,
    pub qr_url: String,
    pub view: ViewResponse,
}

/// Settings panel submission.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateSettingsRequest {
    pub settings: SessionSettings,
    #[validate(range(min = 2, max = 12))]
    pub max_players: u8,
}

/// Game picked by the host.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectGameRequest {
    pub game: GameKind,
}

/// Join link and QR image of the attached session.
#[derive(Debug, Serialize, ToSchema)]
pub struct LinksResponse {
    pub room_code: String,
    pub join_url: String,
    pub qr_url: String,
}
