use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for ShockHub Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::control::send_control,
        crate::routes::node::assign_gateway,
        crate::routes::hub::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::control::ControlRequest,
            crate::dto::control::ControlCommandInput,
            crate::dto::control::ControlOutcome,
            crate::dto::control::DispatchedCommand,
            crate::dto::control::DeniedCommand,
            crate::dto::control::DenialReason,
            crate::dto::node::GatewayAssignment,
            crate::dto::ws::HubInboundMessage,
            crate::dto::ws::HubOutboundMessage,
            crate::dao::models::ControlType,
            crate::dao::models::ShockerModel,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "control", description = "Shocker control dispatch"),
        (name = "gateway", description = "Gateway node assignment"),
        (name = "hubs", description = "WebSocket operations for hub devices"),
    )
)]
pub struct ApiDoc;
