use serde::Serialize;
use utoipa::ToSchema;

use crate::dao::models::LcgNode;

/// Gateway node handed back to a hub asking where to connect.
#[derive(Debug, Serialize, ToSchema)]
pub struct GatewayAssignment {
    /// Fully qualified domain name of the assigned gateway.
    pub fqdn: String,
    /// ISO 3166-1 alpha-2 country the gateway reports itself in.
    #[schema(value_type = String)]
    pub country: crate::geo::country::Alpha2CountryCode,
}

impl From<LcgNode> for GatewayAssignment {
    fn from(node: LcgNode) -> Self {
        Self {
            fqdn: node.fqdn,
            country: node.country,
        }
    }
}
