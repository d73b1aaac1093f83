use time::OffsetDateTime;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{dao::models::PlayerPatch, state::SharedState};

/// Running heartbeat task of the local player.
pub struct LivenessHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LivenessHandle {
    /// Ask the task to stop after its current write.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Whether the task is still writing heartbeats.
    pub fn is_running(&self) -> bool {
        !*self.stop.borrow() && !self.task.is_finished()
    }
}

/// Spawn the heartbeat of `player_db_id`, writing `last_seen` every
/// configured interval until stopped, until the row is kicked or until the
/// session ends.
pub fn start(state: &SharedState, player_db_id: Uuid) -> LivenessHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let period = state.config().heartbeat_interval;
    let state = state.clone();

    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if state.read_device(|device| device.is_finished()).await {
                        info!(player_id = %player_db_id, "player removed or session over; stopping heartbeat");
                        break;
                    }
                    beat(&state, player_db_id).await;
                }
            }
        }

        debug!(player_id = %player_db_id, "heartbeat stopped");
    });

    LivenessHandle {
        stop: stop_tx,
        task,
    }
}

async fn beat(state: &SharedState, player_db_id: Uuid) {
    let store = match state.require_store().await {
        Ok(store) => store,
        Err(_) => {
            debug!(player_id = %player_db_id, "skipping heartbeat while degraded");
            return;
        }
    };

    let patch = PlayerPatch {
        last_seen: Some(OffsetDateTime::now_utc()),
        ..Default::default()
    };
    if let Err(err) = store.update_player(player_db_id, patch).await {
        warn!(player_id = %player_db_id, error = %err, "heartbeat write failed");
    }
}
