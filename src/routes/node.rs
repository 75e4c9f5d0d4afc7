use axum::{Json, Router, extract::State, http::HeaderMap, routing::get};
use tracing::debug;

use crate::{
    dto::node::GatewayAssignment,
    error::{AppError, ServiceError},
    geo::country::Alpha2CountryCode,
    services::provisioner::LcgNodeProvisioner,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/gateway/assign",
    tag = "gateway",
    responses(
        (status = 200, description = "Gateway selected for the caller", body = GatewayAssignment),
        (status = 503, description = "No gateway registered for this environment"),
    )
)]
/// Pick the closest least-loaded gateway for the calling hub.
///
/// The caller's country comes from the edge-provided header named in the
/// configuration; a missing or unparseable value falls back to pure
/// least-load selection.
pub async fn assign_gateway(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<GatewayAssignment>, AppError> {
    let registry = state.require_node_registry().await?;
    let provisioner = LcgNodeProvisioner::new(registry);

    let country = client_country(&state, &headers);
    debug!(%country, "assigning gateway");

    let environment = &state.config().environment;
    let node = provisioner
        .optimal_node_for(country, environment)
        .await?
        .ok_or(ServiceError::NoGatewayAvailable {
            environment: environment.clone(),
        })?;

    Ok(Json(node.into()))
}

/// Country code the edge resolved for this request, or the unknown sentinel.
fn client_country(state: &SharedState, headers: &HeaderMap) -> Alpha2CountryCode {
    headers
        .get(&state.config().country_header)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(Alpha2CountryCode::UNKNOWN)
}

/// Configure the gateway assignment routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/gateway/assign", get(assign_gateway))
}
