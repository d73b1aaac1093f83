use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    dao::models::{PlayerPatch, PlayerStatus},
    dto::{host::LinksResponse, lobby::LobbySnapshot, view::ViewResponse},
    error::ServiceError,
    links::{join_url, qr_url},
    services::{sse_events, sync_service, view_service},
    state::{SharedState, view::ViewState},
};

/// Session and roster of the attached session.
pub async fn snapshot(state: &SharedState) -> Result<LobbySnapshot, ServiceError> {
    let window = state.config().reconnect_window;
    state
        .read_device(|device| {
            LobbySnapshot::from_projection(&device.projection, OffsetDateTime::now_utc(), window)
        })
        .await
        .ok_or_else(|| ServiceError::NotFound("no session attached".into()))
}

/// Join link and QR image for the attached session.
pub async fn links(state: &SharedState) -> Result<LinksResponse, ServiceError> {
    let room_code = state
        .read_device(|device| device.projection.session().map(|s| s.room_code.clone()))
        .await
        .ok_or_else(|| ServiceError::NotFound("no session attached".into()))?;

    let config = state.config();
    let join = join_url(&config.public_origin, &room_code);
    Ok(LinksResponse {
        qr_url: qr_url(&config.qr_endpoint, config.qr_size, &join),
        join_url: join,
        room_code,
    })
}

/// Leave the attached session and forget its credentials. A player's row is
/// marked disconnected on a best-effort basis so the seat frees up.
pub async fn leave(state: &SharedState) -> Result<ViewResponse, ServiceError> {
    let (session_id, player_db_id) = state
        .read_device(|device| {
            (
                device.credentials.as_ref().and_then(|c| c.session_id()),
                device.player_db_id(),
            )
        })
        .await;
    let Some(session_id) = session_id else {
        return Err(ServiceError::InvalidState("no session attached".into()));
    };

    sync_service::detach(state).await;

    if let Some(player_db_id) = player_db_id {
        let patch = PlayerPatch {
            status: Some(PlayerStatus::Disconnected),
            last_seen: Some(OffsetDateTime::now_utc()),
            ..Default::default()
        };
        let kicked = state.read_device(|device| device.is_removed()).await;
        if !kicked {
            match state.require_store().await {
                Ok(store) => {
                    if let Err(err) = store.update_player(player_db_id, patch).await {
                        warn!(player_id = %player_db_id, error = %err, "failed to mark player disconnected");
                    }
                }
                Err(err) => warn!(player_id = %player_db_id, error = %err, "leaving while degraded"),
            }
        }
    }

    if let Err(err) = state.credential_store().clear().await {
        warn!(%session_id, error = %err, "failed to clear credentials");
    }
    state.device().write().await.detach(ViewState::home());

    info!(%session_id, "left session");
    sse_events::broadcast_view(state).await;
    Ok(view_service::current_view(state).await)
}
