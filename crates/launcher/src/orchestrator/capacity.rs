//! Free GPU units per node.

use std::collections::HashMap;

use error_stack::Report;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tracing::debug;

use crate::k8s::Cluster;
use crate::k8s::KubernetesError;
use crate::orchestrator::types::NodeCapacity;

/// Node conditions that make a node unfit for new workloads when `True`.
const PRESSURE_CONDITIONS: [&str; 3] = ["DiskPressure", "MemoryPressure", "PIDPressure"];

/// Snapshot free GPU units across the cluster, in the order the API lists nodes.
///
/// # Errors
///
/// Any failure to list nodes or pods is returned as is; the caller treats it
/// as the cluster being unavailable.
#[tracing::instrument(skip(cluster))]
pub async fn inspect(
    cluster: &dyn Cluster,
    gpu_resource: &str,
) -> Result<Vec<NodeCapacity>, Report<KubernetesError>> {
    let nodes = cluster.list_nodes().await?;
    let pods = cluster.list_pods().await?;
    let capacity = free_capacity(&nodes, &pods, gpu_resource);
    debug!(?capacity, "Inspected GPU capacity");
    Ok(capacity)
}

/// Allocatable GPUs of every healthy GPU node minus what bound pods request.
pub fn free_capacity(nodes: &[Node], pods: &[Pod], gpu_resource: &str) -> Vec<NodeCapacity> {
    let committed = committed_gpus(pods, gpu_resource);

    nodes
        .iter()
        .filter(|node| !under_pressure(node))
        .filter_map(|node| {
            let name = node.metadata.name.clone()?;
            let allocatable = node
                .status
                .as_ref()?
                .allocatable
                .as_ref()?
                .get(gpu_resource)
                .and_then(gpu_units)?;
            Some(NodeCapacity {
                committed: committed.get(&name).copied().unwrap_or(0),
                name,
                allocatable,
            })
        })
        .collect()
}

/// GPU units requested per node by pods that are bound and not terminated.
fn committed_gpus(pods: &[Pod], gpu_resource: &str) -> HashMap<String, u32> {
    let mut committed = HashMap::new();

    for pod in pods {
        let terminated = matches!(
            pod.status.as_ref().and_then(|s| s.phase.as_deref()),
            Some("Succeeded" | "Failed")
        );
        let Some(spec) = pod.spec.as_ref().filter(|_| !terminated) else {
            continue;
        };
        let Some(node_name) = spec.node_name.as_ref() else {
            continue;
        };

        let requested: u32 = spec
            .containers
            .iter()
            .filter_map(|c| c.resources.as_ref())
            .filter_map(|r| {
                // Extended resources default their request to the limit.
                r.requests
                    .as_ref()
                    .and_then(|q| q.get(gpu_resource))
                    .or_else(|| r.limits.as_ref().and_then(|q| q.get(gpu_resource)))
            })
            .filter_map(gpu_units)
            .sum();

        if requested > 0 {
            *committed.entry(node_name.clone()).or_insert(0) += requested;
        }
    }

    committed
}

fn under_pressure(node: &Node) -> bool {
    let cordoned = node
        .spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false);

    let pressured = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions.iter().any(|c| {
                PRESSURE_CONDITIONS.contains(&c.type_.as_str()) && c.status == "True"
            })
        });

    cordoned || pressured
}

/// GPUs are whole units; anything else is ignored.
fn gpu_units(quantity: &Quantity) -> Option<u32> {
    quantity.0.trim().parse().ok()
}
