use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{post, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        host::{CreateSessionRequest, CreatedSession, SelectGameRequest, UpdateSettingsRequest},
        lobby::LobbySnapshot,
        view::ViewResponse,
    },
    error::{AppError, ErrorBody},
    services::host_service,
    state::{SharedState, view::Role},
};

/// Session creation plus the host-only controls, the latter guarded by the
/// device role.
pub fn router(state: SharedState) -> Router<SharedState> {
    let controls = Router::new()
        .route("/host/settings", put(update_settings))
        .route("/host/start", post(start_game))
        .route("/host/games", post(select_game))
        .route("/host/players/{id}/kick", post(kick_player))
        .route("/host/end", post(end_session))
        .route_layer(middleware::from_fn_with_state(state, require_host_role));

    Router::new()
        .route("/host/sessions", post(create_session))
        .merge(controls)
}

/// Create a session hosted by this device.
#[utoipa::path(
    post,
    path = "/host/sessions",
    tag = "host",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = CreatedSession),
        (status = 400, description = "Invalid overrides", body = ErrorBody),
        (status = 503, description = "Datastore unavailable", body = ErrorBody)
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<CreatedSession>), AppError> {
    let created = host_service::create_session(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Replace the session settings and capacity.
#[utoipa::path(
    put,
    path = "/host/settings",
    tag = "host",
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Settings saved", body = LobbySnapshot),
        (status = 401, description = "Not the host", body = ErrorBody)
    )
)]
pub async fn update_settings(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<UpdateSettingsRequest>>,
) -> Result<Json<LobbySnapshot>, AppError> {
    Ok(Json(host_service::update_settings(&state, payload).await?))
}

/// Start the game: everyone moves to the tutorial.
#[utoipa::path(
    post,
    path = "/host/start",
    tag = "host",
    responses(
        (status = 200, description = "Tutorial started", body = ViewResponse),
        (status = 409, description = "Not enough players or not in the lobby", body = ErrorBody)
    )
)]
pub async fn start_game(State(state): State<SharedState>) -> Result<Json<ViewResponse>, AppError> {
    Ok(Json(host_service::start_game(&state).await?))
}

/// Pick the game to play.
#[utoipa::path(
    post,
    path = "/host/games",
    tag = "host",
    request_body = SelectGameRequest,
    responses(
        (status = 200, description = "Game selected", body = ViewResponse),
        (status = 409, description = "A game is already selected", body = ErrorBody)
    )
)]
pub async fn select_game(
    State(state): State<SharedState>,
    Json(payload): Json<SelectGameRequest>,
) -> Result<Json<ViewResponse>, AppError> {
    Ok(Json(host_service::select_game(&state, payload.game).await?))
}

/// Remove a player from the session.
#[utoipa::path(
    post,
    path = "/host/players/{id}/kick",
    tag = "host",
    params(("id" = Uuid, Path, description = "Datastore id of the player row")),
    responses(
        (status = 200, description = "Player kicked", body = LobbySnapshot),
        (status = 404, description = "Unknown player", body = ErrorBody),
        (status = 409, description = "Player already kicked", body = ErrorBody)
    )
)]
pub async fn kick_player(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LobbySnapshot>, AppError> {
    Ok(Json(host_service::kick_player(&state, id).await?))
}

/// Close the session for everyone.
#[utoipa::path(
    post,
    path = "/host/end",
    tag = "host",
    responses((status = 200, description = "Session ended", body = ViewResponse))
)]
pub async fn end_session(State(state): State<SharedState>) -> Result<Json<ViewResponse>, AppError> {
    Ok(Json(host_service::end_session(&state).await?))
}

async fn require_host_role(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    match state.read_device(|device| device.role()).await {
        Some(Role::Host) => Ok(next.run(req).await),
        Some(Role::Player) => Err(AppError::Unauthorized(
            "host controls are not available to players".into(),
        )),
        None => Err(AppError::Unauthorized("no session attached".into())),
    }
}
