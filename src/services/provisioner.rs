//! Selection of the best live gateway node for a new hub or live-control
//! session.
//!
//! Locality strictly dominates load: among all nodes registered for the
//! environment, only the closest-region set is considered, then the least
//! loaded nodes within it, with ties broken uniformly at random so several
//! equally good nodes share new sessions instead of hot-spotting one.

use std::sync::Arc;

use rand::seq::IndexedRandom;
use tracing::warn;

use crate::{
    dao::{models::LcgNode, node_registry::NodeRegistry},
    error::ServiceError,
    geo::{Alpha2CountryCode, DistanceLookup},
};

/// Nodes within this distance of the minimum count as the same region.
/// Nodes in the same country have identical table distances, so the epsilon
/// only needs to absorb float noise.
const REGION_EPSILON_KM: f64 = 1.0;

/// Picks gateway nodes from the shared registry.
pub struct LcgNodeProvisioner {
    registry: Arc<dyn NodeRegistry>,
    distance: DistanceLookup,
}

impl LcgNodeProvisioner {
    /// Build a provisioner over the given registry.
    pub fn new(registry: Arc<dyn NodeRegistry>) -> Self {
        Self {
            registry,
            distance: DistanceLookup::new(),
        }
    }

    /// Least loaded node registered for `environment`, ignoring locality.
    ///
    /// `None` means no gateway is currently registered; callers treat that as
    /// a degraded-service condition, not an error.
    pub async fn optimal_node(&self, environment: &str) -> Result<Option<LcgNode>, ServiceError> {
        let nodes = self.registry.nodes_in_environment(environment).await?;
        if nodes.is_empty() {
            warn!(environment, "no gateway nodes registered");
            return Ok(None);
        }

        Ok(nodes.into_iter().min_by_key(|node| node.load))
    }

    /// Best node for a client in `country`: closest region first, then least
    /// load, then uniform random among ties.
    ///
    /// Falls back to load-only selection when the country is the unknown
    /// sentinel.
    pub async fn optimal_node_for(
        &self,
        country: Alpha2CountryCode,
        environment: &str,
    ) -> Result<Option<LcgNode>, ServiceError> {
        if country.is_unknown() {
            return self.optimal_node(environment).await;
        }

        let nodes = self.registry.nodes_in_environment(environment).await?;
        if nodes.is_empty() {
            warn!(environment, %country, "no gateway nodes registered");
            return Ok(None);
        }

        let scored: Vec<(f64, LcgNode)> = nodes
            .into_iter()
            .map(|node| {
                (
                    self.distance.distance_between_or_max(country, node.country),
                    node,
                )
            })
            .collect();

        let min_distance = scored
            .iter()
            .map(|(distance, _)| *distance)
            .fold(f64::INFINITY, f64::min);

        // All nodes indistinguishable from the closest one; multiple nodes in
        // the same country share an exact table distance.
        let closest: Vec<&LcgNode> = scored
            .iter()
            .filter(|(distance, _)| distance - min_distance < REGION_EPSILON_KM)
            .map(|(_, node)| node)
            .collect();

        let min_load = closest
            .iter()
            .map(|node| node.load)
            .min()
            .unwrap_or_default();
        let tied: Vec<&&LcgNode> = closest
            .iter()
            .filter(|node| node.load == min_load)
            .collect();

        Ok(tied.choose(&mut rand::rng()).map(|node| (**node).clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::node_registry::MemoryNodeRegistry;
    use std::collections::HashMap;

    fn node(fqdn: &str, country: &str, load: u8, environment: &str) -> LcgNode {
        LcgNode {
            fqdn: fqdn.into(),
            country: country.parse().unwrap(),
            load,
            environment: environment.into(),
        }
    }

    fn provisioner_with(nodes: Vec<LcgNode>) -> LcgNodeProvisioner {
        let registry = MemoryNodeRegistry::new();
        for entry in nodes {
            registry.register(entry);
        }
        LcgNodeProvisioner::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn picks_least_loaded_node_without_country() {
        let provisioner = provisioner_with(vec![
            node("a.gateway.test", "US", 5, "production"),
            node("b.gateway.test", "DE", 2, "production"),
            node("c.gateway.test", "JP", 9, "production"),
        ]);

        let picked = provisioner.optimal_node("production").await.unwrap().unwrap();
        assert_eq!(picked.fqdn, "b.gateway.test");
    }

    #[tokio::test]
    async fn empty_registry_yields_none() {
        let provisioner = provisioner_with(vec![]);

        assert!(provisioner.optimal_node("production").await.unwrap().is_none());
        assert!(
            provisioner
                .optimal_node_for("DE".parse().unwrap(), "production")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn nodes_from_other_environments_are_invisible() {
        let provisioner = provisioner_with(vec![node("a.gateway.test", "US", 1, "staging")]);

        assert!(provisioner.optimal_node("production").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn locality_beats_load() {
        // The heavily loaded German node still wins for a French client
        // because locality is ranked before load.
        let provisioner = provisioner_with(vec![
            node("de.gateway.test", "DE", 200, "production"),
            node("us.gateway.test", "US", 1, "production"),
        ]);

        let picked = provisioner
            .optimal_node_for("FR".parse().unwrap(), "production")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.fqdn, "de.gateway.test");
    }

    #[tokio::test]
    async fn load_breaks_ties_inside_the_closest_region() {
        let provisioner = provisioner_with(vec![
            node("de1.gateway.test", "DE", 5, "production"),
            node("de2.gateway.test", "DE", 2, "production"),
        ]);

        let picked = provisioner
            .optimal_node_for("DE".parse().unwrap(), "production")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.fqdn, "de2.gateway.test");
    }

    #[tokio::test]
    async fn equal_candidates_are_chosen_randomly() {
        let provisioner = provisioner_with(vec![
            node("de1.gateway.test", "DE", 3, "production"),
            node("de2.gateway.test", "DE", 3, "production"),
        ]);

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..200 {
            let picked = provisioner
                .optimal_node_for("DE".parse().unwrap(), "production")
                .await
                .unwrap()
                .unwrap();
            *counts.entry(picked.fqdn).or_default() += 1;
        }

        // Uniform draws over two candidates: each lands near 100 of 200.
        // The 60..=140 band keeps the false-failure odds negligible while
        // still catching a deterministic or heavily skewed pick.
        assert_eq!(counts.len(), 2);
        for (fqdn, count) in counts {
            assert!(
                (60..=140).contains(&count),
                "non-uniform selection: {fqdn} picked {count} of 200"
            );
        }
    }

    #[tokio::test]
    async fn unknown_country_falls_back_to_load_only() {
        let provisioner = provisioner_with(vec![
            node("far.gateway.test", "NZ", 1, "production"),
            node("near.gateway.test", "DE", 9, "production"),
        ]);

        let picked = provisioner
            .optimal_node_for(Alpha2CountryCode::UNKNOWN, "production")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.fqdn, "far.gateway.test");
    }
}
