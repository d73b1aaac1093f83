use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::view::TutorialResponse,
    error::{AppError, ErrorBody},
    services::view_service,
    state::SharedState,
};

/// Tutorial overlay controls, for hosts and players alike.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/tutorial/next", post(next_step))
        .route("/tutorial/skip", post(skip))
}

/// Advance the overlay; past the last step the host moves everyone on.
#[utoipa::path(
    post,
    path = "/tutorial/next",
    tag = "tutorial",
    responses(
        (status = 200, description = "Step advanced", body = TutorialResponse),
        (status = 409, description = "No tutorial shown", body = ErrorBody)
    )
)]
pub async fn next_step(State(state): State<SharedState>) -> Result<Json<TutorialResponse>, AppError> {
    Ok(Json(view_service::tutorial_next(&state).await?))
}

/// Close the overlay.
#[utoipa::path(
    post,
    path = "/tutorial/skip",
    tag = "tutorial",
    responses(
        (status = 200, description = "Tutorial completed", body = TutorialResponse),
        (status = 409, description = "No tutorial shown", body = ErrorBody)
    )
)]
pub async fn skip(State(state): State<SharedState>) -> Result<Json<TutorialResponse>, AppError> {
    Ok(Json(view_service::tutorial_skip(&state).await?))
}
