/// OpenAPI documentation generation.
pub mod documentation;
/// Naming round read model.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Host-only session writes.
pub mod host_service;
/// Join admission.
pub mod join_service;
/// Periodic `last_seen` writes of the local player.
pub mod liveness;
/// Lobby reads, links and leaving a session.
pub mod lobby_service;
/// Datastore latency probe and degraded mode switch.
pub mod network_monitor;
/// Startup resolution of the stored credentials.
pub mod resume_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// Change feed reconciliation loop.
pub mod sync_service;
/// Best-effort analytics events.
pub mod telemetry;
/// View snapshot and tutorial overlay actions.
pub mod view_service;
