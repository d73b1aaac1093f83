use serde::Serialize;
use time::OffsetDateTime;
use tracing::warn;

use crate::{
    dto::{
        lobby::LobbySnapshot,
        sse::{ServerEvent, SystemStatus},
    },
    services::{network_monitor::NetworkReport, view_service},
    state::SharedState,
};

const EVENT_VIEW: &str = "view";
const EVENT_LOBBY: &str = "lobby";
const EVENT_NETWORK: &str = "network";
const EVENT_SYSTEM: &str = "system";

/// Broadcast the resolved view of this device.
pub async fn broadcast_view(state: &SharedState) {
    let view = view_service::current_view(state).await;
    send_event(state, EVENT_VIEW, &view);
}

/// Broadcast the session and roster, when attached.
pub async fn broadcast_lobby(state: &SharedState) {
    let window = state.config().reconnect_window;
    let snapshot = state
        .read_device(|device| {
            LobbySnapshot::from_projection(&device.projection, OffsetDateTime::now_utc(), window)
        })
        .await;
    if let Some(snapshot) = snapshot {
        send_event(state, EVENT_LOBBY, &snapshot);
    }
}

/// Broadcast a change of link quality.
pub fn broadcast_network(state: &SharedState, report: NetworkReport) {
    send_event(state, EVENT_NETWORK, &report);
}

/// Broadcast entering or leaving degraded mode.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_event(state, EVENT_SYSTEM, &SystemStatus { degraded });
}

fn send_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize SSE payload"),
    }
}
