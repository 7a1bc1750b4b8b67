//! NodePort exposure of a running workload.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::core::v1::ServicePort;
use k8s_openapi::api::core::v1::ServiceSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::info;

use crate::k8s::Cluster;
use crate::orchestrator::types::ExposedEndpoint;
use crate::orchestrator::types::LaunchFailure;
use crate::orchestrator::workload::MANAGED_BY;
use crate::orchestrator::workload::MANAGED_BY_LABEL;

/// Label linking a workload to its service selector.
pub const WORKLOAD_LABEL: &str = "notebook-launcher/workload";

pub fn service_name(workload: &str) -> String {
    format!("{workload}-svc")
}

/// NodePort service selecting `workload` by [`WORKLOAD_LABEL`].
///
/// No node port is requested; the platform allocates one.
pub fn build_service(workload: &str, port: u16) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(service_name(workload)),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_string(),
                MANAGED_BY.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("NodePort".to_string()),
            selector: Some(BTreeMap::from([(
                WORKLOAD_LABEL.to_string(),
                workload.to_string(),
            )])),
            ports: Some(vec![ServicePort {
                name: Some("notebook".to_string()),
                protocol: Some("TCP".to_string()),
                port: i32::from(port),
                target_port: Some(IntOrString::Int(i32::from(port))),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

/// Label the workload and publish it through a NodePort service.
///
/// A failure leaves the workload running but unreachable.
///
/// # Errors
///
/// - [`LaunchFailure::ExposeFailed`] if labelling or service creation is
///   rejected, or the created service carries no node port
#[tracing::instrument(skip(cluster))]
pub async fn expose(
    cluster: &dyn Cluster,
    workload: &str,
    port: u16,
) -> Result<ExposedEndpoint, LaunchFailure> {
    cluster
        .label_pod(workload, WORKLOAD_LABEL, workload)
        .await
        .map_err(|e| LaunchFailure::ExposeFailed(format!("{e}")))?;

    let created = cluster
        .create_service(&build_service(workload, port))
        .await
        .map_err(|e| LaunchFailure::ExposeFailed(format!("{e}")))?;

    let node_port = created
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .and_then(|ports| ports.first())
        .and_then(|p| p.node_port)
        .ok_or_else(|| LaunchFailure::ExposeFailed("no node port was assigned".to_string()))?;
    let node_port = u16::try_from(node_port)
        .map_err(|_| LaunchFailure::ExposeFailed(format!("invalid node port {node_port}")))?;

    let endpoint = ExposedEndpoint {
        service_name: created
            .metadata
            .name
            .unwrap_or_else(|| service_name(workload)),
        workload: workload.to_string(),
        internal_port: port,
        node_port,
    };
    info!(service = %endpoint.service_name, node_port, "Exposed notebook");
    Ok(endpoint)
}
