use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::{
        lobby_store::LobbyStore,
        models::{
            GameStateRow, NewGameState, NewPlayer, NewSession, NewTelemetry, PlayerPatch,
            PlayerRow, SessionPatch, SessionRow, SessionStatus, TelemetryRow,
        },
        storage::{StorageError, StorageResult},
    },
    realtime::{ChangeHub, ChangeKind, RawChange, Table},
};

/// Datastore kept in process memory. Every session and player write is
/// published on the attached [`ChangeHub`], mirroring what the hosted
/// realtime service does for the hosted store.
#[derive(Clone)]
pub struct MemoryLobbyStore {
    inner: Arc<Inner>,
}

struct Inner {
    sessions: DashMap<Uuid, SessionRow>,
    players: RwLock<IndexMap<Uuid, PlayerRow>>,
    game_states: Mutex<Vec<GameStateRow>>,
    telemetry: Mutex<Vec<TelemetryRow>>,
    hub: ChangeHub,
    online: AtomicBool,
}

impl MemoryLobbyStore {
    /// Empty store publishing on a fresh hub.
    pub fn new() -> Self {
        Self::with_hub(ChangeHub::default())
    }

    /// Empty store publishing on `hub`.
    pub fn with_hub(hub: ChangeHub) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: DashMap::new(),
                players: RwLock::new(IndexMap::new()),
                game_states: Mutex::new(Vec::new()),
                telemetry: Mutex::new(Vec::new()),
                hub,
                online: AtomicBool::new(true),
            }),
        }
    }

    /// Change feed fed by this store.
    pub fn hub(&self) -> ChangeHub {
        self.inner.hub.clone()
    }

    /// Simulate the datastore going away (or coming back).
    pub fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::SeqCst);
    }

    /// Every telemetry event recorded so far, oldest first.
    pub async fn telemetry_events(&self) -> Vec<TelemetryRow> {
        self.inner.telemetry.lock().await.clone()
    }

    /// Every game state row recorded so far, oldest first.
    pub async fn game_states(&self) -> Vec<GameStateRow> {
        self.inner.game_states.lock().await.clone()
    }
}

impl Default for MemoryLobbyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn ensure_online(&self) -> StorageResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::unavailable(
                "memory store offline".into(),
                io::Error::new(io::ErrorKind::NotConnected, "memory store offline"),
            ))
        }
    }

    fn publish<T: Serialize>(&self, table: Table, kind: ChangeKind, row: &T) {
        match serde_json::to_value(row) {
            Ok(record) => self.hub.publish(RawChange {
                kind,
                table,
                record,
                old_record: Value::Null,
            }),
            Err(err) => warn!(table = table.as_str(), error = %err, "failed to encode change"),
        }
    }
}

impl LobbyStore for MemoryLobbyStore {
    fn insert_session(&self, session: NewSession) -> BoxFuture<'static, StorageResult<SessionRow>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;

            let taken = inner.sessions.iter().any(|entry| {
                entry.room_code == session.room_code && entry.status != SessionStatus::Ended
            });
            if taken {
                return Err(StorageError::rejected(format!(
                    "room code `{}` already in use",
                    session.room_code
                )));
            }

            let row = SessionRow {
                id: Uuid::new_v4(),
                room_code: session.room_code,
                host_id: session.host_id,
                status: session.status,
                language: session.language,
                max_players: session.max_players,
                current_game: session.current_game,
                settings: session.settings,
                created_at: OffsetDateTime::now_utc(),
                expires_at: session.expires_at,
                last_activity: session.last_activity,
            };
            inner.sessions.insert(row.id, row.clone());
            inner.publish(Table::Sessions, ChangeKind::Insert, &row);
            Ok(row)
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionRow>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            Ok(inner.sessions.get(&id).map(|entry| entry.clone()))
        })
    }

    fn find_session_by_code(
        &self,
        room_code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionRow>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            Ok(inner
                .sessions
                .iter()
                .filter(|entry| entry.room_code == room_code)
                .max_by_key(|entry| entry.created_at)
                .map(|entry| entry.clone()))
        })
    }

    fn update_session(
        &self,
        id: Uuid,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            // An update matching no row is not an error, same as the hosted store.
            if let Some(mut entry) = inner.sessions.get_mut(&id) {
                patch.apply_to(&mut entry);
                inner.publish(Table::Sessions, ChangeKind::Update, &*entry);
            }
            Ok(())
        })
    }

    fn insert_player(&self, player: NewPlayer) -> BoxFuture<'static, StorageResult<PlayerRow>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            if !inner.sessions.contains_key(&player.session_id) {
                return Err(StorageError::rejected(format!(
                    "session `{}` does not exist",
                    player.session_id
                )));
            }

            let row = PlayerRow {
                id: Uuid::new_v4(),
                session_id: player.session_id,
                nickname: player.nickname,
                avatar_emoji: player.avatar_emoji,
                player_id: player.player_id,
                status: player.status,
                team: player.team,
                score: player.score,
                joined_at: OffsetDateTime::now_utc(),
                last_seen: player.last_seen,
                reconnect_token: player.reconnect_token,
            };
            inner.players.write().await.insert(row.id, row.clone());
            inner.publish(Table::Players, ChangeKind::Insert, &row);
            Ok(row)
        })
    }

    fn find_player(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PlayerRow>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            Ok(inner.players.read().await.get(&id).cloned())
        })
    }

    fn list_players(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerRow>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            Ok(inner
                .players
                .read()
                .await
                .values()
                .filter(|player| player.session_id == session_id)
                .cloned()
                .collect())
        })
    }

    fn count_connected_players(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<usize>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            Ok(inner
                .players
                .read()
                .await
                .values()
                .filter(|player| player.session_id == session_id && player.is_connected())
                .count())
        })
    }

    fn update_player(&self, id: Uuid, patch: PlayerPatch) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            // Published under the write lock so images reach the feed in write order.
            let mut players = inner.players.write().await;
            if let Some(row) = players.get_mut(&id) {
                patch.apply_to(row);
                inner.publish(Table::Players, ChangeKind::Update, &*row);
            }
            Ok(())
        })
    }

    fn insert_game_state(
        &self,
        state: NewGameState,
    ) -> BoxFuture<'static, StorageResult<GameStateRow>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            let row = GameStateRow {
                id: Uuid::new_v4(),
                session_id: state.session_id,
                round: state.round,
                phase: state.phase,
                data: state.data,
                updated_at: OffsetDateTime::now_utc(),
            };
            inner.game_states.lock().await.push(row.clone());
            Ok(row)
        })
    }

    fn latest_game_state(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GameStateRow>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            Ok(inner
                .game_states
                .lock()
                .await
                .iter()
                .rev()
                .find(|row| row.session_id == session_id)
                .cloned())
        })
    }

    fn insert_telemetry(&self, event: NewTelemetry) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            inner.telemetry.lock().await.push(TelemetryRow {
                id: Uuid::new_v4(),
                session_id: event.session_id,
                event_type: event.event_type,
                metadata: event.metadata,
                created_at: OffsetDateTime::now_utc(),
            });
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ensure_online() })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        dao::models::{Language, PlayerStatus, SessionSettings},
        realtime::subscribe_players,
    };

    async fn seeded() -> (MemoryLobbyStore, SessionRow, PlayerRow) {
        let store = MemoryLobbyStore::new();
        let now = OffsetDateTime::now_utc();
        let session = store
            .insert_session(NewSession {
                room_code: "AB3X7K".into(),
                host_id: "host_1_abc".into(),
                status: SessionStatus::Lobby,
                language: Language::En,
                max_players: 12,
                current_game: None,
                settings: SessionSettings::default(),
                expires_at: now + time::Duration::hours(1),
                last_activity: now,
            })
            .await
            .unwrap();
        let player = store
            .insert_player(NewPlayer {
                session_id: session.id,
                nickname: "Sam".into(),
                avatar_emoji: "🦊".into(),
                player_id: "player_1_abc".into(),
                status: PlayerStatus::Connected,
                team: None,
                score: 0,
                last_seen: now,
                reconnect_token: None,
            })
            .await
            .unwrap();
        (store, session, player)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn no_image_after_a_kick_revives_the_player() {
        let (store, session, player) = seeded().await;
        let hub = store.hub();
        let mut changes = subscribe_players(&hub, session.id).await.unwrap();

        let player_id = player.id;
        let mut writes = Vec::new();
        for i in 0..40 {
            let store = store.clone();
            writes.push(tokio::spawn(async move {
                let patch = if i == 20 {
                    PlayerPatch {
                        status: Some(PlayerStatus::Kicked),
                        ..Default::default()
                    }
                } else {
                    PlayerPatch {
                        status: Some(PlayerStatus::Connected),
                        last_seen: Some(OffsetDateTime::now_utc()),
                        ..Default::default()
                    }
                };
                store.update_player(player_id, patch).await.unwrap();
            }));
        }
        for write in writes {
            write.await.unwrap();
        }

        let mut statuses = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(100), changes.next()).await
        {
            statuses.push(event.row.unwrap().status);
        }

        assert_eq!(statuses.len(), 40);
        let kicked_at = statuses
            .iter()
            .position(|status| *status == PlayerStatus::Kicked)
            .unwrap();
        assert!(statuses[kicked_at..].iter().all(|status| *status == PlayerStatus::Kicked));
        let stored = store.find_player(player_id).await.unwrap().unwrap();
        assert!(stored.is_kicked());
    }
}
