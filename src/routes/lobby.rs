use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};

use crate::{
    dto::{host::LinksResponse, lobby::LobbySnapshot, view::ViewResponse},
    error::{AppError, ErrorBody},
    services::lobby_service,
    state::SharedState,
};

/// Roster, links and leaving.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/lobby", get(lobby))
        .route("/links", get(links))
        .route("/leave", post(leave))
}

/// Session and roster of the attached session.
#[utoipa::path(
    get,
    path = "/lobby",
    tag = "lobby",
    responses(
        (status = 200, description = "Lobby snapshot", body = LobbySnapshot),
        (status = 404, description = "No session attached", body = ErrorBody)
    )
)]
pub async fn lobby(State(state): State<SharedState>) -> Result<Json<LobbySnapshot>, AppError> {
    Ok(Json(lobby_service::snapshot(&state).await?))
}

/// Join link and QR image URL.
#[utoipa::path(
    get,
    path = "/links",
    tag = "lobby",
    responses(
        (status = 200, description = "Links", body = LinksResponse),
        (status = 404, description = "No session attached", body = ErrorBody)
    )
)]
pub async fn links(State(state): State<SharedState>) -> Result<Json<LinksResponse>, AppError> {
    Ok(Json(lobby_service::links(&state).await?))
}

/// Leave the session and forget its credentials.
#[utoipa::path(
    post,
    path = "/leave",
    tag = "lobby",
    responses(
        (status = 200, description = "Back on the home screen", body = ViewResponse),
        (status = 409, description = "No session attached", body = ErrorBody)
    )
)]
pub async fn leave(State(state): State<SharedState>) -> Result<Json<ViewResponse>, AppError> {
    Ok(Json(lobby_service::leave(&state).await?))
}
