use std::path::PathBuf;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::Service;
use kube::api::AttachParams;
use kube::api::ListParams;
use kube::api::Patch;
use kube::api::PatchParams;
use kube::api::PostParams;
use kube::Api;
use kube::Client;
use serde_json::json;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tracing::debug;
use tracing::warn;

use crate::k8s::cluster::Cluster;
use crate::k8s::cluster::ClusterResult;
use crate::k8s::kube_client;
use crate::k8s::types::KubernetesError;

/// Field selector excluding pods whose containers have all exited.
const NON_TERMINATED_PODS: &str = "status.phase!=Succeeded,status.phase!=Failed";

/// [`Cluster`] backed by the Kubernetes API server.
pub struct KubeCluster {
    client: Client,
    namespace: String,
}

impl KubeCluster {
    /// Connect to the API server; workloads are created in `namespace`.
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::ConnectionFailed`] if unable to build a client
    pub async fn connect(
        kubeconfig: Option<PathBuf>,
        namespace: String,
    ) -> ClusterResult<Self> {
        let client = kube_client::init_kube_client(kubeconfig).await?;
        Ok(Self::new(client, namespace))
    }

    pub fn new(client: Client, namespace: String) -> Self {
        Self { client, namespace }
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn services(&self) -> Api<Service> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn list_nodes(&self) -> ClusterResult<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = api
            .list(&ListParams::default())
            .await
            .change_context(KubernetesError::RequestFailed {
                message: "Failed to list nodes".to_string(),
            })?;
        Ok(nodes.items)
    }

    async fn list_pods(&self) -> ClusterResult<Vec<Pod>> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let pods = api
            .list(&ListParams::default().fields(NON_TERMINATED_PODS))
            .await
            .change_context(KubernetesError::RequestFailed {
                message: "Failed to list pods".to_string(),
            })?;
        Ok(pods.items)
    }

    async fn create_pod(&self, pod: &Pod) -> ClusterResult<Pod> {
        self.pods()
            .create(&PostParams::default(), pod)
            .await
            .change_context(KubernetesError::RequestFailed {
                message: format!(
                    "Failed to create pod {}",
                    pod.metadata.name.as_deref().unwrap_or("<unnamed>")
                ),
            })
    }

    async fn get_pod(&self, name: &str) -> ClusterResult<Pod> {
        match self.pods().get(name).await {
            Ok(pod) => Ok(pod),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                Err(Report::new(KubernetesError::PodNotFound {
                    pod_name: name.to_string(),
                    namespace: self.namespace.clone(),
                }))
            }
            Err(e) => Err(Report::new(e).change_context(KubernetesError::RequestFailed {
                message: format!("Failed to get pod {name}"),
            })),
        }
    }

    async fn label_pod(&self, name: &str, key: &str, value: &str) -> ClusterResult<()> {
        let patch = json!({ "metadata": { "labels": { key: value } } });
        self.pods()
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .change_context(KubernetesError::RequestFailed {
                message: format!("Failed to label pod {name}"),
            })?;
        Ok(())
    }

    async fn create_service(&self, service: &Service) -> ClusterResult<Service> {
        self.services()
            .create(&PostParams::default(), service)
            .await
            .change_context(KubernetesError::RequestFailed {
                message: format!(
                    "Failed to create service {}",
                    service.metadata.name.as_deref().unwrap_or("<unnamed>")
                ),
            })
    }

    async fn exec(&self, pod_name: &str, command: &[String]) -> ClusterResult<String> {
        let params = AttachParams::default().stdout(true).stderr(true);
        let mut attached = self
            .pods()
            .exec(pod_name, command.to_vec(), &params)
            .await
            .change_context(KubernetesError::ExecFailed {
                pod_name: pod_name.to_string(),
                message: format!("Failed to start {command:?}"),
            })?;

        let stdout = attached.stdout();
        let stderr = attached.stderr();
        let (stdout, stderr) = tokio::join!(read_all(stdout), read_all(stderr));

        attached
            .join()
            .await
            .change_context(KubernetesError::ExecFailed {
                pod_name: pod_name.to_string(),
                message: "Exec session did not shut down cleanly".to_string(),
            })?;

        debug!(pod_name, stdout_len = stdout.len(), stderr_len = stderr.len(), "Exec finished");

        // Notebook servers print their listing on either stream depending on version.
        Ok(format!("{stdout}\n{stderr}"))
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut output = String::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_string(&mut output).await {
            warn!("Failed to read exec output: {e}");
        }
    }
    output
}
