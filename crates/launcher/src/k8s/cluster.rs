use async_trait::async_trait;
use error_stack::Report;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::Service;

use crate::k8s::types::KubernetesError;

pub type ClusterResult<T> = Result<T, Report<KubernetesError>>;

/// Operations the launch orchestrator needs from the platform.
///
/// Pod and service operations are scoped to the namespace the implementation
/// was built for; node and pod listings cover the whole cluster.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// List every node in the cluster.
    async fn list_nodes(&self) -> ClusterResult<Vec<Node>>;

    /// List pods in all namespaces that have not terminated.
    async fn list_pods(&self) -> ClusterResult<Vec<Pod>>;

    /// Submit a pod and return the object the API server stored.
    async fn create_pod(&self, pod: &Pod) -> ClusterResult<Pod>;

    /// Fetch the current state of a pod.
    async fn get_pod(&self, name: &str) -> ClusterResult<Pod>;

    /// Add or overwrite a single label on a pod.
    async fn label_pod(&self, name: &str, key: &str, value: &str) -> ClusterResult<()>;

    /// Create a service and return the object the API server stored,
    /// including any platform-assigned ports.
    async fn create_service(&self, service: &Service) -> ClusterResult<Service>;

    /// Run a command in the pod's first container and return its output.
    async fn exec(&self, pod_name: &str, command: &[String]) -> ClusterResult<String>;
}
