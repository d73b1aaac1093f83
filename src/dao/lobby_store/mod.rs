#[cfg(feature = "hosted-store")]
pub mod hosted;
pub mod memory;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    GameStateRow, NewGameState, NewPlayer, NewSession, NewTelemetry, PlayerPatch, PlayerRow,
    SessionPatch, SessionRow,
};
use crate::dao::storage::StorageResult;

/// Abstraction over the shared datastore holding sessions, players and game state.
pub trait LobbyStore: Send + Sync {
    fn insert_session(&self, session: NewSession) -> BoxFuture<'static, StorageResult<SessionRow>>;
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionRow>>>;
    /// `room_code` must already be normalized to upper case.
    fn find_session_by_code(
        &self,
        room_code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionRow>>>;
    fn update_session(&self, id: Uuid, patch: SessionPatch)
    -> BoxFuture<'static, StorageResult<()>>;
    fn insert_player(&self, player: NewPlayer) -> BoxFuture<'static, StorageResult<PlayerRow>>;
    fn find_player(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PlayerRow>>>;
    /// Every player of the session, oldest join first.
    fn list_players(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerRow>>>;
    fn count_connected_players(&self, session_id: Uuid)
    -> BoxFuture<'static, StorageResult<usize>>;
    fn update_player(&self, id: Uuid, patch: PlayerPatch) -> BoxFuture<'static, StorageResult<()>>;
    fn insert_game_state(
        &self,
        state: NewGameState,
    ) -> BoxFuture<'static, StorageResult<GameStateRow>>;
    /// Most recently updated game state of the session, if any.
    fn latest_game_state(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GameStateRow>>>;
    fn insert_telemetry(&self, event: NewTelemetry) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
