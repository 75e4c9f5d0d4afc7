use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

pub mod control;
pub mod health;
pub mod hub;
pub mod node;

/// Compose all route trees, wiring in shared state and the Swagger UI for
/// the control and provisioning API.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(control::router())
        .merge(node::router())
        .merge(hub::router());

    let docs_router: Router<SharedState> = SwaggerUi::new("/docs")
        .url("/api-doc/openapi.json", ApiDoc::openapi())
        .into();

    api_router.merge(docs_router).with_state(state)
}
