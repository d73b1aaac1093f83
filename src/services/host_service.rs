use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    codes::{generate_host_id, generate_room_code},
    dao::models::{
        GameKind, NewGameState, NewSession, PlayerPatch, PlayerStatus, RoundPhase, SessionPatch,
        SessionStatus,
    },
    dto::{
        host::{CreateSessionRequest, CreatedSession, UpdateSettingsRequest},
        lobby::{LobbySnapshot, MIN_PLAYERS_TO_START},
        view::ViewResponse,
    },
    error::ServiceError,
    links::{join_url, qr_url},
    services::{lobby_service, sse_events, sync_service, telemetry, view_service},
    state::{
        SharedState,
        credentials::{DeviceCredentials, StoredCredentials},
        state_machine::{SessionEvent, SessionPhase},
        view::ViewState,
    },
};

/// Smallest and largest accepted session capacity.
pub const MAX_PLAYERS_RANGE: std::ops::RangeInclusive<u8> = 2..=12;

/// Create a new session hosted by this device and attach to it.
pub async fn create_session(
    state: &SharedState,
    request: CreateSessionRequest,
) -> Result<CreatedSession, ServiceError> {
    let store = state.require_store().await?;
    let config = state.config();

    let max_players = request.max_players.unwrap_or(config.default_max_players);
    if !MAX_PLAYERS_RANGE.contains(&max_players) {
        return Err(ServiceError::InvalidInput(format!(
            "max_players must be between 2 and 12 (got {max_players})"
        )));
    }

    sync_service::detach(state).await;
    state.device().write().await.detach(ViewState::home());

    let now = OffsetDateTime::now_utc();
    let host_id = generate_host_id();
    let new_session = NewSession {
        room_code: generate_room_code(),
        host_id: host_id.clone(),
        status: SessionStatus::Lobby,
        language: request.language.unwrap_or(config.default_language),
        max_players,
        current_game: None,
        settings: request.settings.unwrap_or(config.default_settings),
        expires_at: now + config.session_ttl,
        last_activity: now,
    };

    let (session, _) = state
        .run_transition(SessionEvent::Open, move || async move {
            store
                .insert_session(new_session)
                .await
                .map_err(ServiceError::from)
        })
        .await?;

    let credentials = StoredCredentials::host(host_id.clone(), session.id);
    if let Err(err) = state.credential_store().save(credentials).await {
        warn!(session_id = %session.id, error = %err, "failed to persist host credentials");
    }

    {
        let mut device = state.device().write().await;
        device.credentials = Some(DeviceCredentials::Host {
            host_id,
            session_id: session.id,
        });
        device.projection.reset(session.clone(), Vec::new());
        device.refresh_view(state.registry(), config.round_duration);
    }

    sync_service::attach(state, session.id).await;

    info!(session_id = %session.id, room_code = %session.room_code, "session created");
    telemetry::record(
        state,
        Some(session.id),
        telemetry::SESSION_CREATED,
        json!({ "room_code": session.room_code, "max_players": session.max_players }),
    )
    .await;
    sse_events::broadcast_view(state).await;

    let join = join_url(&config.public_origin, &session.room_code);
    Ok(CreatedSession {
        session_id: session.id,
        room_code: session.room_code.clone(),
        qr_url: qr_url(&config.qr_endpoint, config.qr_size, &join),
        join_url: join,
        view: view_service::current_view(state).await,
    })
}

/// Move the lobby to the tutorial. Needs at least two connected players.
pub async fn start_game(state: &SharedState) -> Result<ViewResponse, ServiceError> {
    let session_id = host_session(state).await?;
    let connected = state
        .read_device(|device| device.projection.connected_count())
        .await;
    if connected < MIN_PLAYERS_TO_START {
        return Err(ServiceError::InvalidState(format!(
            "at least {MIN_PLAYERS_TO_START} connected players are needed to start (have {connected})"
        )));
    }

    let patch = SessionPatch {
        status: Some(SessionStatus::Tutorial),
        last_activity: Some(OffsetDateTime::now_utc()),
        ..Default::default()
    };
    write_session(state, session_id, SessionEvent::BeginTutorial, patch).await?;

    telemetry::record(
        state,
        Some(session_id),
        telemetry::GAME_STARTED,
        json!({ "players": connected }),
    )
    .await;
    Ok(view_service::current_view(state).await)
}

/// Leave the tutorial for the game selection.
pub async fn complete_tutorial(state: &SharedState) -> Result<(), ServiceError> {
    let session_id = host_session(state).await?;
    let patch = SessionPatch {
        status: Some(SessionStatus::Playing),
        current_game: Some(None),
        last_activity: Some(OffsetDateTime::now_utc()),
        ..Default::default()
    };
    write_session(state, session_id, SessionEvent::FinishTutorial, patch).await?;

    telemetry::record(
        state,
        Some(session_id),
        telemetry::TUTORIAL_COMPLETED,
        json!({}),
    )
    .await;
    Ok(())
}

/// Pick the game and create its first round.
pub async fn select_game(state: &SharedState, game: GameKind) -> Result<ViewResponse, ServiceError> {
    let session_id = host_session(state).await?;
    let language = state
        .read_device(|device| device.projection.session().map(|session| session.language))
        .await
        .unwrap_or(state.config().default_language);

    let patch = SessionPatch {
        status: Some(SessionStatus::Playing),
        current_game: Some(Some(game)),
        last_activity: Some(OffsetDateTime::now_utc()),
        ..Default::default()
    };
    write_session(state, session_id, SessionEvent::SelectGame(game), patch).await?;

    let round = NewGameState {
        session_id,
        round: 1,
        phase: RoundPhase::Waiting,
        data: state.registry().initial_data(game, language),
    };
    state.require_store().await?.insert_game_state(round).await?;

    info!(%session_id, ?game, "game selected");
    telemetry::record(
        state,
        Some(session_id),
        telemetry::GAME_SELECTED,
        json!({ "game": game }),
    )
    .await;
    Ok(view_service::current_view(state).await)
}

/// Replace the session switches and capacity.
pub async fn update_settings(
    state: &SharedState,
    request: UpdateSettingsRequest,
) -> Result<LobbySnapshot, ServiceError> {
    if !MAX_PLAYERS_RANGE.contains(&request.max_players) {
        return Err(ServiceError::InvalidInput(format!(
            "max_players must be between 2 and 12 (got {})",
            request.max_players
        )));
    }

    let session_id = host_session(state).await?;
    let patch = SessionPatch {
        settings: Some(request.settings),
        max_players: Some(request.max_players),
        last_activity: Some(OffsetDateTime::now_utc()),
        ..Default::default()
    };
    write_session(state, session_id, SessionEvent::UpdateSettings, patch).await?;

    telemetry::record(
        state,
        Some(session_id),
        telemetry::SETTINGS_UPDATED,
        json!({ "settings": request.settings, "max_players": request.max_players }),
    )
    .await;
    lobby_service::snapshot(state).await
}

/// Remove a player from the session. Kicked is terminal.
pub async fn kick_player(
    state: &SharedState,
    player_db_id: Uuid,
) -> Result<LobbySnapshot, ServiceError> {
    let session_id = host_session(state).await?;
    let status = state
        .read_device(|device| device.projection.player(player_db_id).map(|row| row.status))
        .await
        .ok_or_else(|| ServiceError::NotFound(format!("player {player_db_id}")))?;
    if status == PlayerStatus::Kicked {
        return Err(ServiceError::InvalidState(format!(
            "player {player_db_id} was already kicked"
        )));
    }

    let store = state.require_store().await?;
    let patch = PlayerPatch {
        status: Some(PlayerStatus::Kicked),
        ..Default::default()
    };
    let remote_patch = patch.clone();
    state
        .run_transition(SessionEvent::KickPlayer, move || async move {
            store
                .update_player(player_db_id, remote_patch)
                .await
                .map_err(ServiceError::from)
        })
        .await?;

    state
        .device()
        .write()
        .await
        .patch_player(player_db_id, &patch);

    info!(%session_id, player_id = %player_db_id, "player kicked");
    telemetry::record(
        state,
        Some(session_id),
        telemetry::PLAYER_KICKED,
        json!({ "player_id": player_db_id }),
    )
    .await;
    sse_events::broadcast_lobby(state).await;
    lobby_service::snapshot(state).await
}

/// Close the session for everyone. The stored host credentials are dropped.
pub async fn end_session(state: &SharedState) -> Result<ViewResponse, ServiceError> {
    let session_id = host_session(state).await?;
    let patch = SessionPatch {
        status: Some(SessionStatus::Ended),
        current_game: Some(None),
        last_activity: Some(OffsetDateTime::now_utc()),
        ..Default::default()
    };
    write_session(state, session_id, SessionEvent::EndSession, patch).await?;

    if let Err(err) = state.credential_store().clear().await {
        warn!(%session_id, error = %err, "failed to clear host credentials");
    }

    info!(%session_id, "session ended");
    telemetry::record(state, Some(session_id), telemetry::SESSION_ENDED, json!({})).await;
    Ok(view_service::current_view(state).await)
}

/// Session id of the host credentials held by this device.
///
/// Only the local credential is checked; the datastore does not verify it.
pub async fn host_session(state: &SharedState) -> Result<Uuid, ServiceError> {
    state
        .read_device(|device| match &device.credentials {
            Some(DeviceCredentials::Host { session_id, .. }) => Some(*session_id),
            _ => None,
        })
        .await
        .ok_or_else(|| ServiceError::Unauthorized("this device is not hosting a session".into()))
}

/// Run a session row write as a state machine transition, then fold it into
/// the projection ahead of the change-feed echo.
async fn write_session(
    state: &SharedState,
    session_id: Uuid,
    event: SessionEvent,
    patch: SessionPatch,
) -> Result<SessionPhase, ServiceError> {
    let store = state.require_store().await?;
    let remote_patch = patch.clone();
    let ((), phase) = state
        .run_transition(event, move || async move {
            store
                .update_session(session_id, remote_patch)
                .await
                .map_err(ServiceError::from)
        })
        .await?;

    let view_changed = {
        let mut device = state.device().write().await;
        device.patch_session(&patch);
        device.refresh_view(state.registry(), state.config().round_duration)
    };

    sse_events::broadcast_lobby(state).await;
    if view_changed {
        sse_events::broadcast_view(state).await;
    }
    Ok(phase)
}
