/// Session, player, game state and telemetry persistence.
pub mod lobby_store;
/// Datastore row definitions.
pub mod models;
/// Storage abstraction layer errors.
pub mod storage;
