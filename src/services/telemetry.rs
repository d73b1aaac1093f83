//! Append-only analytics events written next to the session data.

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{dao::models::NewTelemetry, state::SharedState};

/// A host created a session.
pub const SESSION_CREATED: &str = "session_created";
/// A player took a seat.
pub const PLAYER_JOINED: &str = "player_joined";
/// The host moved the lobby to the tutorial.
pub const GAME_STARTED: &str = "game_started";
/// The host finished or skipped the tutorial.
pub const TUTORIAL_COMPLETED: &str = "tutorial_completed";
/// The host picked a game.
pub const GAME_SELECTED: &str = "game_selected";
/// The host changed the session switches.
pub const SETTINGS_UPDATED: &str = "settings_updated";
/// The host removed a player.
pub const PLAYER_KICKED: &str = "player_kicked";
/// The host closed the session.
pub const SESSION_ENDED: &str = "session_ended";

/// Append an analytics event. Failures are logged and swallowed.
pub async fn record(state: &SharedState, session_id: Option<Uuid>, event_type: &str, metadata: Value) {
    if state.is_degraded() {
        debug!(event_type, "skipping telemetry while degraded");
        return;
    }

    let event = NewTelemetry {
        session_id,
        event_type: event_type.to_string(),
        metadata,
    };
    if let Err(err) = state.store().insert_telemetry(event).await {
        warn!(event_type, error = %err, "failed to record telemetry");
    }
}
