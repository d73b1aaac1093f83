use std::convert::Infallible;

use axum::{Json, Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{
    dto::view::ViewResponse,
    services::{sse_events, sse_service, view_service},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/view",
    tag = "view",
    responses((status = 200, description = "Screen to render", body = ViewResponse))
)]
/// Return the screen this device should render.
pub async fn current_view(State(state): State<SharedState>) -> Json<ViewResponse> {
    Json(view_service::current_view(&state).await)
}

#[utoipa::path(
    get,
    path = "/sse/view",
    tag = "view",
    responses((status = 200, description = "View, lobby, network and system events", content_type = "text/event-stream", body = String))
)]
/// Stream view changes, roster updates and connectivity events.
pub async fn view_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe_view(&state);
    info!("New view SSE connection");
    sse_events::broadcast_view(&state).await;
    sse_events::broadcast_lobby(&state).await;
    sse_service::to_sse_stream(receiver)
}

/// Configure the view endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/view", get(current_view))
        .route("/sse/view", get(view_stream))
}
