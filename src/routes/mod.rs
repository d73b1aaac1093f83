use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

pub mod game;
pub mod health;
pub mod host;
pub mod join;
pub mod lobby;
pub mod tutorial;
pub mod view;

/// Compose the device API and mount Swagger UI at `/docs`.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(view::router())
        .merge(host::router(state.clone()))
        .merge(join::router())
        .merge(lobby::router())
        .merge(tutorial::router())
        .merge(game::router());

    let docs: Router<SharedState> = SwaggerUi::new("/docs")
        .url("/api-doc/openapi.json", ApiDoc::openapi())
        .into();

    api_router.merge(docs).with_state(state)
}
