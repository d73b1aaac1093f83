use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification of the party lobby device API.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::view::current_view,
        crate::routes::view::view_stream,
        crate::routes::host::create_session,
        crate::routes::host::update_settings,
        crate::routes::host::start_game,
        crate::routes::host::select_game,
        crate::routes::host::kick_player,
        crate::routes::host::end_session,
        crate::routes::join::preview,
        crate::routes::join::join,
        crate::routes::lobby::lobby,
        crate::routes::lobby::links,
        crate::routes::lobby::leave,
        crate::routes::tutorial::next_step,
        crate::routes::tutorial::skip,
        crate::routes::game::name_game,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::view::ViewResponse,
            crate::dto::view::TutorialResponse,
            crate::dto::host::CreateSessionRequest,
            crate::dto::host::CreatedSession,
            crate::dto::host::UpdateSettingsRequest,
            crate::dto::host::SelectGameRequest,
            crate::dto::host::LinksResponse,
            crate::dto::join::JoinRequest,
            crate::dto::join::JoinPreview,
            crate::dto::join::JoinedPlayer,
            crate::dto::lobby::LobbySnapshot,
            crate::dto::game::NameGameView,
            crate::dto::sse::SystemStatus,
            crate::services::network_monitor::NetworkReport,
            crate::error::ErrorBody,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "view", description = "Screen resolution and its event stream"),
        (name = "host", description = "Session creation and host controls"),
        (name = "join", description = "Join admission"),
        (name = "lobby", description = "Roster, links and leaving"),
        (name = "tutorial", description = "Onboarding overlay"),
        (name = "game", description = "Game screens"),
    )
)]
pub struct ApiDoc;
