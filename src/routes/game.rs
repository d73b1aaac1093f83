use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::game::NameGameView,
    error::{AppError, ErrorBody},
    services::game_service,
    state::SharedState,
};

/// Game screens.
pub fn router() -> Router<SharedState> {
    Router::new().route("/game/name", get(name_game))
}

/// Letter, countdown and scoreboard of the naming round.
#[utoipa::path(
    get,
    path = "/game/name",
    tag = "game",
    responses(
        (status = 200, description = "Round state", body = NameGameView),
        (status = 409, description = "The naming round is not on screen", body = ErrorBody)
    )
)]
pub async fn name_game(State(state): State<SharedState>) -> Result<Json<NameGameView>, AppError> {
    Ok(Json(game_service::name_game_view(&state).await?))
}
