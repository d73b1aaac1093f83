//! Join admission: the checks a player passes before a seat is written.

use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    codes::{generate_player_id, is_room_code, random_emoji, sanitize_nickname},
    dao::models::{NewPlayer, PlayerStatus, SessionRow, SessionStatus},
    dto::join::{JoinPreview, JoinedPlayer},
    error::{JoinRejection, ServiceError},
    services::{liveness, sse_events, sync_service, telemetry, view_service},
    state::{
        SharedState,
        credentials::{DeviceCredentials, StoredCredentials},
        view::ViewState,
    },
};

/// Show what joining `code` would look like, without writing anything.
pub async fn preview(state: &SharedState, code: &str) -> Result<JoinPreview, ServiceError> {
    let session = find_by_code(state, code).await?;
    let connected = state
        .require_store()
        .await?
        .count_connected_players(session.id)
        .await?;

    Ok(JoinPreview {
        room_code: session.room_code,
        status: session.status,
        connected,
        max_players: session.max_players,
        joinable: session.status == SessionStatus::Lobby
            && connected < usize::from(session.max_players),
    })
}

/// Admit this device into the session behind `code` as `nickname`.
///
/// Counting seats and inserting the row are two separate calls, so two
/// devices racing for the last seat may both get in.
pub async fn join(
    state: &SharedState,
    code: &str,
    nickname: &str,
) -> Result<JoinedPlayer, ServiceError> {
    if nickname.trim().is_empty() {
        return Err(JoinRejection::EmptyNickname.into());
    }

    let session = find_by_code(state, code).await?;
    if session.status != SessionStatus::Lobby {
        return Err(JoinRejection::AlreadyStarted.into());
    }

    let store = state.require_store().await?;
    let connected = store.count_connected_players(session.id).await?;
    if connected >= usize::from(session.max_players) {
        return Err(JoinRejection::RoomFull.into());
    }

    sync_service::detach(state).await;
    state.device().write().await.detach(ViewState::home());

    let player_id = generate_player_id();
    let player = store
        .insert_player(NewPlayer {
            session_id: session.id,
            nickname: sanitize_nickname(nickname, state.word_filter()),
            avatar_emoji: random_emoji().to_string(),
            player_id: player_id.clone(),
            status: PlayerStatus::Connected,
            team: None,
            score: 0,
            last_seen: OffsetDateTime::now_utc(),
            reconnect_token: None,
        })
        .await?;

    let credentials = StoredCredentials::player(player_id.clone(), session.id, player.id);
    if let Err(err) = state.credential_store().save(credentials).await {
        warn!(session_id = %session.id, error = %err, "failed to persist player credentials");
    }

    {
        let mut device = state.device().write().await;
        device.credentials = Some(DeviceCredentials::Player {
            player_id: Some(player_id),
            session_id: session.id,
            player_db_id: player.id,
        });
        device.projection.reset(session.clone(), vec![player.clone()]);
        device.refresh_view(state.registry(), state.config().round_duration);
    }

    state
        .install_liveness(liveness::start(state, player.id))
        .await;
    sync_service::attach(state, session.id).await;

    info!(session_id = %session.id, player_id = %player.id, "player joined");
    telemetry::record(
        state,
        Some(session.id),
        telemetry::PLAYER_JOINED,
        json!({ "player_id": player.id, "connected": connected + 1 }),
    )
    .await;
    sse_events::broadcast_view(state).await;

    Ok(JoinedPlayer {
        id: player.id,
        session_id: session.id,
        nickname: player.nickname,
        avatar_emoji: player.avatar_emoji,
        view: view_service::current_view(state).await,
    })
}

async fn find_by_code(state: &SharedState, code: &str) -> Result<SessionRow, ServiceError> {
    if !is_room_code(code) {
        return Err(JoinRejection::InvalidCode.into());
    }

    state
        .require_store()
        .await?
        .find_session_by_code(code.to_ascii_uppercase())
        .await?
        .ok_or_else(|| JoinRejection::InvalidCode.into())
}
