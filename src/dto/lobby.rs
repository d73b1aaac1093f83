use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{
        GameKind, Language, PlayerRow, PlayerStatus, SessionRow, SessionSettings, SessionStatus,
        Team,
    },
    dto::format_timestamp,
    links::can_reconnect,
    state::projection::LobbyProjection,
};

/// Players needed before the host may start.
pub const MIN_PLAYERS_TO_START: usize = 2;

/// Session fields shown around the roster.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionSummary {
    pub id: Uuid,
    pub room_code: String,
    pub status: SessionStatus,
    pub language: Language,
    pub max_players: u8,
    pub current_game: Option<GameKind>,
    pub settings: SessionSettings,
    /// RFC 3339 expiry.
    pub expires_at: String,
}

impl From<&SessionRow> for SessionSummary {
    fn from(row: &SessionRow) -> Self {
        Self {
            id: row.id,
            room_code: row.room_code.clone(),
            status: row.status,
            language: row.language,
            max_players: row.max_players,
            current_game: row.current_game,
            settings: row.settings,
            expires_at: format_timestamp(row.expires_at),
        }
    }
}

/// Roster entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LobbyPlayer {
    pub id: Uuid,
    pub nickname: String,
    pub avatar_emoji: String,
    pub status: PlayerStatus,
    pub team: Option<Team>,
    pub score: u32,
    /// Heartbeat seen within the reconnect window.
    pub fresh: bool,
}

impl LobbyPlayer {
    fn from_row(row: &PlayerRow, now: OffsetDateTime, window: Duration) -> Self {
        Self {
            id: row.id,
            nickname: row.nickname.clone(),
            avatar_emoji: row.avatar_emoji.clone(),
            status: row.status,
            team: row.team,
            score: row.score,
            fresh: can_reconnect(row.last_seen, now, window),
        }
    }
}

/// Session plus roster, as rendered by both lobby screens.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LobbySnapshot {
    pub session: SessionSummary,
    /// Every player row, kicked ones included, in join order.
    pub players: Vec<LobbyPlayer>,
    /// Players holding a seat.
    pub connected: usize,
    /// Whether the host may start.
    pub can_start: bool,
}

impl LobbySnapshot {
    /// Snapshot of `projection`, `None` while detached.
    pub fn from_projection(
        projection: &LobbyProjection,
        now: OffsetDateTime,
        window: Duration,
    ) -> Option<Self> {
        let session = projection.session()?;
        let connected = projection.connected_count();
        Some(Self {
            session: session.into(),
            players: projection
                .players()
                .map(|row| LobbyPlayer::from_row(row, now, window))
                .collect(),
            connected,
            can_start: session.status == SessionStatus::Lobby && connected >= MIN_PLAYERS_TO_START,
        })
    }
}
