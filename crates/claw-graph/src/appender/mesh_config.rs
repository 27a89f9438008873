//! `istio`: flag virtual services and circuit breakers.

use tracing::debug;

use super::AppenderContext;
use crate::error::Result;
use crate::inventory::{InventorySource, MeshConfig, host_matches_service};
use crate::telemetry::TelemetrySource;
use crate::traffic::{Node, TrafficMap};
use crate::types::NodeKind;

/// Flags nodes routed by a virtual service or protected by a
/// circuit-breaking destination rule declared in the namespace.
///
/// A service node is checked by its own name. Any node is also checked by
/// the declared destination services recorded on it, so a workload node
/// reached through `reviews` picks up the `reviews` routing config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshConfigAppender;

impl MeshConfigAppender {
    /// Runs the appender.
    pub async fn append_graph<T, I>(
        &self,
        map: &mut TrafficMap,
        ctx: &mut AppenderContext<'_, T, I>,
    ) -> Result<()>
    where
        T: TelemetrySource,
        I: InventorySource,
    {
        if map.is_empty() {
            return Ok(());
        }
        let namespace = ctx.namespace.name().to_string();
        let config = ctx.namespace.mesh_config(ctx.inventory, ctx.query).await?;
        let flagged = self.apply(map, &namespace, config);
        debug!(namespace = %namespace, flagged, "Applied mesh config badges");
        Ok(())
    }

    /// Flags nodes of `namespace`. Returns the number of nodes flagged.
    pub fn apply(&self, map: &mut TrafficMap, namespace: &str, config: &MeshConfig) -> usize {
        let mut flagged = 0;
        for node in map.nodes_mut() {
            let services = services_of(node, namespace);
            if services.is_empty() {
                continue;
            }

            let routed = config.virtual_services.iter().any(|vs| {
                vs.hosts.iter().any(|host| {
                    services
                        .iter()
                        .any(|svc| host_matches_service(host, svc, namespace))
                })
            });
            let breaker = config.destination_rules.iter().any(|dr| {
                dr.has_circuit_breaker
                    && services.iter().any(|svc| host_matches_service(&dr.host, svc, namespace))
            });

            if routed {
                node.metadata.has_virtual_service = true;
            }
            if breaker {
                node.metadata.has_circuit_breaker = true;
            }
            if routed || breaker {
                flagged += 1;
            }
        }
        flagged
    }
}

fn services_of(node: &Node, namespace: &str) -> Vec<String> {
    let mut services = Vec::new();
    if node.kind == NodeKind::Service
        && node.namespace == namespace
        && !node.metadata.is_egress_cluster
    {
        services.push(node.service_name().to_string());
    }
    for declared in node.metadata.dest_services.values() {
        if declared.namespace == namespace && !services.contains(&declared.name) {
            services.push(declared.name.clone());
        }
    }
    services
}
