use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::view::ViewResponse,
    error::ServiceError,
    links::{is_expired, parse_join_path},
    services::{liveness, sse_events, sync_service, view_service},
    state::{SharedState, credentials::DeviceCredentials, view::ViewState},
};

/// Resolve the first view of the device.
///
/// A `/join/<CODE>` start path wins over stored credentials. Otherwise host
/// credentials are tried before player ones; a session that is gone or
/// expired lands on the home screen.
pub async fn resume(
    state: &SharedState,
    start_path: Option<&str>,
) -> Result<ViewResponse, ServiceError> {
    if let Some(code) = start_path.and_then(parse_join_path) {
        info!(room_code = %code, "starting on join link");
        sync_service::detach(state).await;
        state.device().write().await.detach(ViewState::join(code));
        return publish(state).await;
    }

    let credentials = match state.credential_store().load().await {
        Ok(stored) => stored.resolve(),
        Err(err) => {
            warn!(error = %err, "failed to load stored credentials; starting fresh");
            DeviceCredentials::None
        }
    };

    match credentials {
        DeviceCredentials::None => {
            state.device().write().await.detach(ViewState::home());
            publish(state).await
        }
        DeviceCredentials::Host { session_id, .. } => {
            let store = state.require_store().await?;
            let session = store.find_session(session_id).await?;
            let live = session
                .as_ref()
                .is_some_and(|row| !is_expired(row.expires_at, OffsetDateTime::now_utc()));
            if !live {
                info!(%session_id, "hosted session gone or expired");
                state.device().write().await.detach(ViewState::home());
                return publish(state).await;
            }

            attach(state, credentials, None).await
        }
        DeviceCredentials::Player {
            session_id,
            player_db_id,
            ..
        } => {
            let store = state.require_store().await?;
            let session = store.find_session(session_id).await?;
            let player = store.find_player(player_db_id).await?;
            let Some(player) = player.filter(|_| session.is_some()) else {
                info!(%session_id, player_id = %player_db_id, "joined session or player row gone");
                state.device().write().await.detach(ViewState::home());
                return publish(state).await;
            };

            let heartbeat = player.is_connected().then_some(player_db_id);
            attach(state, credentials, heartbeat).await
        }
    }
}

async fn attach(
    state: &SharedState,
    credentials: DeviceCredentials,
    heartbeat: Option<Uuid>,
) -> Result<ViewResponse, ServiceError> {
    let Some(session_id) = credentials.session_id() else {
        return publish(state).await;
    };

    {
        let mut device = state.device().write().await;
        device.detach(ViewState::home());
        device.credentials = Some(credentials);
    }
    if let Some(player_db_id) = heartbeat {
        state
            .install_liveness(liveness::start(state, player_db_id))
            .await;
    }
    sync_service::attach(state, session_id).await;

    info!(%session_id, "resumed session");
    Ok(view_service::current_view(state).await)
}

async fn publish(state: &SharedState) -> Result<ViewResponse, ServiceError> {
    sse_events::broadcast_view(state).await;
    Ok(view_service::current_view(state).await)
}
