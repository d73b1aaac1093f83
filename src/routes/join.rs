use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dto::join::{JoinPreview, JoinRequest, JoinedPlayer},
    error::{AppError, ErrorBody},
    services::join_service,
    state::SharedState,
};

/// Join form endpoints, keyed by room code.
pub fn router() -> Router<SharedState> {
    Router::new().route("/join/{code}", get(preview).post(join))
}

/// Look a room code up before joining.
#[utoipa::path(
    get,
    path = "/join/{code}",
    tag = "join",
    params(("code" = String, Path, description = "Room code, case-insensitive")),
    responses(
        (status = 200, description = "Session found", body = JoinPreview),
        (status = 404, description = "Unknown room code", body = ErrorBody)
    )
)]
pub async fn preview(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<JoinPreview>, AppError> {
    Ok(Json(join_service::preview(&state, &code).await?))
}

/// Join the session as a player.
#[utoipa::path(
    post,
    path = "/join/{code}",
    tag = "join",
    params(("code" = String, Path, description = "Room code, case-insensitive")),
    request_body = JoinRequest,
    responses(
        (status = 201, description = "Joined", body = JoinedPlayer),
        (status = 400, description = "Empty nickname (`empty_nickname`)", body = ErrorBody),
        (status = 404, description = "Unknown room code (`invalid_code`)", body = ErrorBody),
        (status = 409, description = "Game started (`already_started`) or room full (`room_full`)", body = ErrorBody)
    )
)]
pub async fn join(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Valid(Json(payload)): Valid<Json<JoinRequest>>,
) -> Result<(StatusCode, Json<JoinedPlayer>), AppError> {
    let joined = join_service::join(&state, &code, &payload.nickname).await?;
    Ok((StatusCode::CREATED, Json(joined)))
}
