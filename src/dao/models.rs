use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::games::GameData;

/// Lifecycle status of a session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Players may join.
    Lobby,
    /// Everyone is shown the onboarding tutorial.
    Tutorial,
    /// A game is being picked or played.
    Playing,
    /// The host closed the session.
    Ended,
}

/// Display language chosen by the host (or the joining player).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    /// Farsi, the platform default.
    #[default]
    Fa,
    /// English.
    En,
}

/// Games a session can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    /// Find words starting with a given letter.
    NameGame,
    /// Guess the song.
    SongGuess,
    /// Find the spy.
    Spy,
}

impl GameKind {
    /// Every game offered on the selection screen, in display order.
    pub const ALL: [GameKind; 3] = [GameKind::NameGame, GameKind::SongGuess, GameKind::Spy];
}

/// Connection status of a player row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    /// Joined and considered present.
    Connected,
    /// Left or timed out.
    Disconnected,
    /// Removed by the host. Terminal.
    Kicked,
}

/// Team assignment for team-based games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    /// First team.
    TeamA,
    /// Second team.
    TeamB,
}

/// Phase of the current round stored in `game_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Round created, nothing asked yet.
    Waiting,
    /// A question is on screen.
    Question,
    /// Answers are being collected.
    Answer,
    /// Round results are shown.
    Results,
}

/// Host-controlled accessibility and content switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    /// Render text larger on the shared screen.
    pub big_text: bool,
    /// Use a color-blind friendly palette.
    pub color_blind: bool,
    /// Restrict content to kid-friendly material.
    pub kids_mode: bool,
    /// Allow players to join without a real name.
    pub allow_anonymous: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            big_text: false,
            color_blind: false,
            kids_mode: true,
            allow_anonymous: true,
        }
    }
}

/// Row of the `sessions` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    /// Primary key assigned by the datastore.
    pub id: Uuid,
    /// Six character code players type to join.
    pub room_code: String,
    /// Capability token held by the creating device.
    pub host_id: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Display language.
    pub language: Language,
    /// Capacity, between 2 and 12.
    pub max_players: u8,
    /// Selected game, only set while playing.
    pub current_game: Option<GameKind>,
    /// Host switches.
    pub settings: SessionSettings,
    /// Creation timestamp.
    #[serde(with = "timestamp")]
    pub created_at: OffsetDateTime,
    /// After this instant the session is considered gone.
    #[serde(with = "timestamp")]
    pub expires_at: OffsetDateTime,
    /// Last host-side write.
    #[serde(with = "timestamp")]
    pub last_activity: OffsetDateTime,
}

/// Insert payload for the `sessions` collection.
#[derive(Debug, Clone, Serialize)]
pub struct NewSession {
    pub room_code: String,
    pub host_id: String,
    pub status: SessionStatus,
    pub language: Language,
    pub max_players: u8,
    pub current_game: Option<GameKind>,
    pub settings: SessionSettings,
    #[serde(with = "timestamp")]
    pub expires_at: OffsetDateTime,
    #[serde(with = "timestamp")]
    pub last_activity: OffsetDateTime,
}

/// Partial update of a session row. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    /// `Some(None)` clears the column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_game: Option<Option<GameKind>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<SessionSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_players: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none", with = "timestamp::option")]
    pub last_activity: Option<OffsetDateTime>,
}

impl SessionPatch {
    /// Write every populated field onto `row`.
    pub fn apply_to(&self, row: &mut SessionRow) {
        if let Some(status) = self.status {
            row.status = status;
        }
        if let Some(current_game) = self.current_game {
            row.current_game = current_game;
        }
        if let Some(settings) = self.settings {
            row.settings = settings;
        }
        if let Some(max_players) = self.max_players {
            row.max_players = max_players;
        }
        if let Some(last_activity) = self.last_activity {
            row.last_activity = last_activity;
        }
    }
}

/// Row of the `players` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRow {
    /// Primary key assigned by the datastore.
    pub id: Uuid,
    /// Session this player joined.
    pub session_id: Uuid,
    /// Filtered display name.
    pub nickname: String,
    /// Randomly assigned avatar.
    pub avatar_emoji: String,
    /// Capability token held by the joining device.
    pub player_id: String,
    /// Presence status.
    pub status: PlayerStatus,
    /// Optional team.
    pub team: Option<Team>,
    /// Accumulated score.
    pub score: u32,
    /// Join timestamp, used for roster ordering.
    #[serde(with = "timestamp")]
    pub joined_at: OffsetDateTime,
    /// Last heartbeat written by the player's device.
    #[serde(with = "timestamp")]
    pub last_seen: OffsetDateTime,
    /// Reserved for reconnect flows.
    pub reconnect_token: Option<String>,
}

impl PlayerRow {
    /// Whether the player currently occupies a seat.
    pub fn is_connected(&self) -> bool {
        self.status == PlayerStatus::Connected
    }

    /// Whether the host removed this player.
    pub fn is_kicked(&self) -> bool {
        self.status == PlayerStatus::Kicked
    }
}

/// Insert payload for the `players` collection.
#[derive(Debug, Clone, Serialize)]
pub struct NewPlayer {
    pub session_id: Uuid,
    pub nickname: String,
    pub avatar_emoji: String,
    pub player_id: String,
    pub status: PlayerStatus,
    pub team: Option<Team>,
    pub score: u32,
    #[serde(with = "timestamp")]
    pub last_seen: OffsetDateTime,
    pub reconnect_token: Option<String>,
}

/// Partial update of a player row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlayerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PlayerStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<Option<Team>>,
    #[serde(skip_serializing_if = "Option::is_none", with = "timestamp::option")]
    pub last_seen: Option<OffsetDateTime>,
}

impl PlayerPatch {
    /// Write every populated field onto `row`. A kicked row keeps its status.
    pub fn apply_to(&self, row: &mut PlayerRow) {
        if let Some(status) = self.status.filter(|_| !row.is_kicked()) {
            row.status = status;
        }
        if let Some(score) = self.score {
            row.score = score;
        }
        if let Some(team) = self.team {
            row.team = team;
        }
        if let Some(last_seen) = self.last_seen {
            row.last_seen = last_seen;
        }
    }
}

/// Row of the `game_state` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateRow {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Round number, starting at 1.
    pub round: u32,
    pub phase: RoundPhase,
    /// Game-specific payload.
    pub data: GameData,
    #[serde(with = "timestamp")]
    pub updated_at: OffsetDateTime,
}

/// Insert payload for the `game_state` collection.
#[derive(Debug, Clone, Serialize)]
pub struct NewGameState {
    pub session_id: Uuid,
    pub round: u32,
    pub phase: RoundPhase,
    pub data: GameData,
}

/// Row of the append-only `telemetry` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRow {
    pub id: Uuid,
    pub session_id: Option<Uuid>,
    pub event_type: String,
    pub metadata: Value,
    #[serde(with = "timestamp")]
    pub created_at: OffsetDateTime,
}

/// Insert payload for the `telemetry` collection.
#[derive(Debug, Clone, Serialize)]
pub struct NewTelemetry {
    pub session_id: Option<Uuid>,
    pub event_type: String,
    pub metadata: Value,
}

/// RFC 3339 timestamps on the wire. Change-feed records sometimes omit the
/// offset, in which case UTC is assumed.
pub mod timestamp {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use time::{
        OffsetDateTime, PrimitiveDateTime,
        format_description::well_known::{Iso8601, Rfc3339},
    };

    /// Format a timestamp as RFC 3339.
    pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let text = value
            .format(&Rfc3339)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    /// Parse an RFC 3339 timestamp, or an ISO 8601 one without offset.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        parse(&text).map_err(D::Error::custom)
    }

    /// Lenient parser shared by both serde paths.
    pub fn parse(text: &str) -> Result<OffsetDateTime, time::error::Parse> {
        match OffsetDateTime::parse(text, &Rfc3339) {
            Ok(value) => Ok(value),
            Err(err) => PrimitiveDateTime::parse(text, &Iso8601::DEFAULT)
                .map(PrimitiveDateTime::assume_utc)
                .map_err(|_| err),
        }
    }

    /// Same as the parent module for optional columns.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer, de::Error};
        use time::OffsetDateTime;

        /// Format an optional timestamp, `None` becoming `null`.
        pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        /// Parse an optional timestamp.
        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|text| super::parse(&text).map_err(D::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn session_row_decodes_datastore_payload() {
        let payload = json!({
            "id": "5b1e7c0e-8f4b-4a53-9d0e-0d6c2b9f4a11",
            "room_code": "AB3X7K",
            "host_id": "host_1700000000000_abc123xyz",
            "status": "lobby",
            "language": "en",
            "max_players": 12,
            "current_game": null,
            "settings": {"bigText": false, "colorBlind": true, "kidsMode": true, "allowAnonymous": true},
            "created_at": "2024-05-01T10:00:00.123456+00:00",
            "expires_at": "2024-05-01T14:00:00+00:00",
            "last_activity": "2024-05-01T10:00:00"
        });

        let row: SessionRow = serde_json::from_value(payload).unwrap();
        assert_eq!(row.status, SessionStatus::Lobby);
        assert_eq!(row.language, Language::En);
        assert!(row.settings.color_blind);
        assert_eq!(row.last_activity, datetime!(2024-05-01 10:00:00 UTC));
    }

    #[test]
    fn session_patch_only_serializes_populated_fields() {
        let patch = SessionPatch {
            current_game: Some(None),
            status: Some(SessionStatus::Ended),
            ..Default::default()
        };

        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, json!({"status": "ended", "current_game": null}));
    }

    #[test]
    fn player_patch_applies_heartbeat() {
        let mut row = PlayerRow {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            nickname: "Sam".into(),
            avatar_emoji: "🦊".into(),
            player_id: "player_1_abc".into(),
            status: PlayerStatus::Connected,
            team: None,
            score: 0,
            joined_at: datetime!(2024-05-01 10:00:00 UTC),
            last_seen: datetime!(2024-05-01 10:00:00 UTC),
            reconnect_token: None,
        };

        PlayerPatch {
            last_seen: Some(datetime!(2024-05-01 10:00:05 UTC)),
            ..Default::default()
        }
        .apply_to(&mut row);

        assert_eq!(row.last_seen, datetime!(2024-05-01 10:00:05 UTC));
        assert!(row.is_connected());
    }

    #[test]
    fn kicked_player_keeps_status_under_later_patches() {
        let mut row = PlayerRow {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            nickname: "Sam".into(),
            avatar_emoji: "🦊".into(),
            player_id: "player_1_abc".into(),
            status: PlayerStatus::Kicked,
            team: None,
            score: 0,
            joined_at: datetime!(2024-05-01 10:00:00 UTC),
            last_seen: datetime!(2024-05-01 10:00:00 UTC),
            reconnect_token: None,
        };

        PlayerPatch {
            status: Some(PlayerStatus::Connected),
            last_seen: Some(datetime!(2024-05-01 10:00:05 UTC)),
            ..Default::default()
        }
        .apply_to(&mut row);

        assert!(row.is_kicked());
        assert_eq!(row.last_seen, datetime!(2024-05-01 10:00:05 UTC));
    }
}
