use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{dao::models::SessionStatus, dto::view::ViewResponse};

/// Nickname form submission. Blank nicknames are refused by admission, not here.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct JoinRequest {
    #[validate(length(max = 200))]
    pub nickname: String,
}

/// What the join form shows before submitting.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinPreview {
    pub room_code: String,
    pub status: SessionStatus,
    pub connected: usize,
    pub max_players: u8,
    /// Whether a join attempt would currently pass admission.
    pub joinable: bool,
}

/// The player row created for this device.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinedPlayer {
    /// Datastore id of the player row.
    pub id: Uuid,
    pub session_id: Uuid,
    pub nickname: String,
    pub avatar_emoji: String,
    pub view: ViewResponse,
}
