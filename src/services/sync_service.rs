//! Keeps the device projection in step with the datastore: subscribe to the
//! session and roster channels, re-read both, then fold every change in.
//!
//! A channel that closes is reopened with a doubling delay, each time under a
//! fresh epoch. Once the configured attempts are spent the device leaves the
//! session and stops its heartbeat.

use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{PlayerRow, SessionRow},
    error::ServiceError,
    realtime::{ChangeEvent, Subscription, subscribe_players, subscribe_session},
    services::sse_events,
    state::{SharedState, state_machine::SessionPhase, view::ViewState},
};

type Channels = (Subscription<SessionRow>, Subscription<PlayerRow>);

/// How a run over open channels ended.
enum Outcome {
    /// The loop has nothing left to follow.
    Done,
    /// A channel closed. `active` tells whether any change arrived first.
    Closed { active: bool },
}

/// Start synchronizing `session_id`, replacing any previous loop.
///
/// Subscriptions are opened before the re-read so no change falls between
/// the two. When that first opening fails the loop keeps retrying in the
/// background.
pub async fn attach(state: &SharedState, session_id: Uuid) {
    let epoch = state.begin_sync_epoch().await;

    let channels = match open(state, epoch, session_id).await {
        Ok(Some(channels)) => Some(channels),
        Ok(None) => return,
        Err(err) => {
            warn!(%session_id, error = %err, "initial session sync failed; retrying");
            None
        }
    };

    let task_state = state.clone();
    state
        .spawn_sync_task(epoch, run_loop(task_state, epoch, session_id, channels))
        .await;

    info!(%session_id, epoch, "session sync attached");
}

/// Stop synchronizing and the heartbeat. The projection is left to the caller.
pub async fn detach(state: &SharedState) {
    let epoch = state.begin_sync_epoch().await;
    state.stop_liveness().await;
    state.reset_phase().await;
    debug!(epoch, "session sync detached");
}

/// Re-read the session and its roster and replace the projection with them.
///
/// Returns whether the session still exists; a missing one sends the device
/// home. A re-read whose epoch is no longer current is dropped.
pub async fn refetch(
    state: &SharedState,
    epoch: u64,
    session_id: Uuid,
) -> Result<bool, ServiceError> {
    let store = state.require_store().await?;
    let session = store.find_session(session_id).await?;
    let players = store.list_players(session_id).await?;

    if !state.is_current_epoch(epoch) {
        debug!(%session_id, epoch, "discarding stale re-read");
        return Ok(false);
    }

    let Some(session) = session else {
        warn!(%session_id, "attached session no longer exists");
        state.device().write().await.detach(ViewState::home());
        state.stop_liveness().await;
        state.reset_phase().await;
        sse_events::broadcast_view(state).await;
        return Ok(false);
    };

    let phase = SessionPhase::from_row(&session);
    let finished = {
        let mut device = state.device().write().await;
        device.projection.reset(session, players);
        device.refresh_view(state.registry(), state.config().round_duration);
        device.is_finished()
    };
    state.sync_phase(phase).await;
    if finished {
        state.stop_liveness().await;
    }

    sse_events::broadcast_lobby(state).await;
    sse_events::broadcast_view(state).await;
    Ok(true)
}

/// Subscribe to both channels, then re-read. `None` when there is nothing
/// to follow anymore.
async fn open(
    state: &SharedState,
    epoch: u64,
    session_id: Uuid,
) -> Result<Option<Channels>, ServiceError> {
    let feed = state.feed();
    let sessions = subscribe_session(feed.as_ref(), session_id).await?;
    let players = subscribe_players(feed.as_ref(), session_id).await?;

    if !refetch(state, epoch, session_id).await? {
        sessions.unsubscribe();
        players.unsubscribe();
        return Ok(None);
    }
    Ok(Some((sessions, players)))
}

async fn run_loop(
    state: SharedState,
    mut epoch: u64,
    session_id: Uuid,
    mut channels: Option<Channels>,
) {
    let config = state.config();
    let mut attempt: u32 = 0;

    loop {
        if let Some((mut sessions, mut players)) = channels.take() {
            let outcome = follow(&state, epoch, &mut sessions, &mut players).await;
            sessions.unsubscribe();
            players.unsubscribe();
            match outcome {
                Outcome::Done => return,
                Outcome::Closed { active: true } => attempt = 0,
                Outcome::Closed { active: false } => {}
            }
        }

        if attempt >= config.resync_attempts {
            give_up(&state, epoch, session_id).await;
            return;
        }
        let delay = config.resync_backoff.saturating_mul(1 << attempt.min(16));
        attempt += 1;
        warn!(%session_id, attempt, ?delay, "change feed lost; reopening");
        sleep(delay).await;

        let Some(next) = state.renew_sync_epoch(epoch) else {
            return;
        };
        epoch = next;
        match open(&state, epoch, session_id).await {
            Ok(Some(opened)) => channels = Some(opened),
            Ok(None) => return,
            Err(err) => warn!(%session_id, attempt, error = %err, "reopening session sync failed"),
        }
    }
}

async fn follow(
    state: &SharedState,
    epoch: u64,
    sessions: &mut Subscription<SessionRow>,
    players: &mut Subscription<PlayerRow>,
) -> Outcome {
    let mut active = false;
    loop {
        let keep_going = tokio::select! {
            change = sessions.next() => match change {
                Some(event) => on_session_change(state, epoch, event).await,
                None => {
                    warn!(topic = sessions.topic(), "session channel closed");
                    return Outcome::Closed { active };
                }
            },
            change = players.next() => match change {
                Some(event) => on_player_change(state, epoch, event).await,
                None => {
                    warn!(topic = players.topic(), "players channel closed");
                    return Outcome::Closed { active };
                }
            },
        };

        if !keep_going {
            return Outcome::Done;
        }
        active = true;
    }
}

/// Leave the session after the feed could not be reopened. A removed player
/// or an ended session keeps its final screen.
async fn give_up(state: &SharedState, epoch: u64, session_id: Uuid) {
    if !state.is_current_epoch(epoch) {
        return;
    }
    warn!(%session_id, "change feed unavailable; leaving the session");
    state.stop_liveness().await;
    state.reset_phase().await;

    let left = {
        let mut device = state.device().write().await;
        if device.is_finished() {
            false
        } else {
            device.detach(ViewState::home());
            true
        }
    };
    if left {
        sse_events::broadcast_view(state).await;
    }
}

async fn on_session_change(state: &SharedState, epoch: u64, event: ChangeEvent<SessionRow>) -> bool {
    if !state.is_current_epoch(epoch) {
        return false;
    }

    let (view_changed, phase, ended) = {
        let mut device = state.device().write().await;
        if !device.projection.apply_session(event) {
            return true;
        }
        let Some(session) = device.projection.session() else {
            device.detach(ViewState::home());
            drop(device);
            info!("attached session was deleted");
            state.stop_liveness().await;
            state.reset_phase().await;
            sse_events::broadcast_view(state).await;
            return false;
        };
        let phase = SessionPhase::from_row(session);
        let view_changed = device.refresh_view(state.registry(), state.config().round_duration);
        (view_changed, phase, device.is_finished())
    };

    if state.sync_phase(phase).await {
        debug!(?phase, "adopted remote session phase");
    }
    if ended {
        state.stop_liveness().await;
    }
    sse_events::broadcast_lobby(state).await;
    if view_changed {
        sse_events::broadcast_view(state).await;
    }
    true
}

async fn on_player_change(state: &SharedState, epoch: u64, event: ChangeEvent<PlayerRow>) -> bool {
    if !state.is_current_epoch(epoch) {
        return false;
    }

    let (view_changed, finished) = {
        let mut device = state.device().write().await;
        if !device.projection.apply_player(event) {
            return true;
        }
        let view_changed = device.refresh_view(state.registry(), state.config().round_duration);
        (view_changed, device.is_finished())
    };

    if finished {
        info!("local player removed or session over; stopping heartbeat");
        state.stop_liveness().await;
    }
    sse_events::broadcast_lobby(state).await;
    if view_changed {
        sse_events::broadcast_view(state).await;
    }
    true
}
