//! Single entry point sequencing one launch attempt.

use std::sync::Arc;

use api_types::MappingEntry;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::k8s::Cluster;
use crate::orchestrator::capacity;
use crate::orchestrator::credential;
use crate::orchestrator::exposer;
use crate::orchestrator::mapping::MappingStore;
use crate::orchestrator::selector::select_node;
use crate::orchestrator::selector::NodeChoice;
use crate::orchestrator::types::AccessCredential;
use crate::orchestrator::types::LaunchFailure;
use crate::orchestrator::types::LaunchOutcome;
use crate::orchestrator::types::LaunchSettings;
use crate::orchestrator::types::PendingWorkload;
use crate::orchestrator::types::Placement;
use crate::orchestrator::workload;
use crate::orchestrator::workload::WorkloadLauncher;

/// What a launch attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    /// Name of the created pod, if one was created
    pub workload: Option<String>,
    /// Proxy URL including the credential, once known
    pub url: Option<String>,
    pub outcome: LaunchOutcome,
    /// Set when the credential poll timed out, for a later resume
    pub pending: Option<PendingWorkload>,
}

impl LaunchReport {
    fn without_workload(outcome: LaunchOutcome) -> Self {
        Self {
            workload: None,
            url: None,
            outcome,
            pending: None,
        }
    }

    fn failed(workload: &str, failure: LaunchFailure) -> Self {
        Self {
            workload: Some(workload.to_string()),
            url: None,
            outcome: LaunchOutcome::Failed(failure),
            pending: None,
        }
    }
}

/// Runs capacity inspection, placement, launch, exposure, credential
/// discovery and mapping in strict sequence; the first failing stage ends
/// the attempt.
pub struct LaunchCoordinator {
    cluster: Arc<dyn Cluster>,
    mappings: MappingStore,
    settings: LaunchSettings,
}

impl LaunchCoordinator {
    pub fn new(cluster: Arc<dyn Cluster>, mappings: MappingStore, settings: LaunchSettings) -> Self {
        Self {
            cluster,
            mappings,
            settings,
        }
    }

    pub fn mappings(&self) -> &MappingStore {
        &self.mappings
    }

    /// Launch one notebook workload.
    ///
    /// Never returns an error: every stage result is folded into
    /// [`LaunchReport::outcome`]. Nothing created here is ever deleted.
    #[tracing::instrument(skip(self))]
    pub async fn launch(&self) -> LaunchReport {
        let cluster = self.cluster.as_ref();

        let capacity = match capacity::inspect(cluster, &self.settings.gpu_resource).await {
            Ok(capacity) => capacity,
            Err(e) => {
                error!("Failed to inspect cluster capacity: {e:?}");
                return LaunchReport::without_workload(LaunchOutcome::Failed(
                    LaunchFailure::ClusterUnavailable(format!("{e}")),
                ));
            }
        };

        let target = match select_node(&capacity) {
            NodeChoice::Node(target) => target,
            NodeChoice::NoCapacity => {
                info!("No node has a free GPU");
                return LaunchReport::without_workload(LaunchOutcome::NoCapacity);
            }
        };
        info!(node = %target.name, free = target.free(), "Selected node");

        let node = match self.settings.placement {
            Placement::Selected => Some(target.name.as_str()),
            Placement::Scheduler => None,
        };

        let name = workload::workload_name();
        let running = match WorkloadLauncher::new(cluster, &self.settings)
            .launch(&name, node)
            .await
        {
            Ok(running) => running,
            Err(failure) => return LaunchReport::failed(&name, failure),
        };

        let Some(host_address) = self
            .settings
            .public_host
            .clone()
            .or(running.host_ip)
            .or(running.node_name)
        else {
            return LaunchReport::failed(
                &name,
                LaunchFailure::ExposeFailed("no host address is known for the pod".to_string()),
            );
        };

        let endpoint = match exposer::expose(cluster, &name, self.settings.notebook_port).await {
            Ok(endpoint) => endpoint,
            Err(failure) => {
                warn!(workload = %name, "Workload is running but unreachable: {failure}");
                return LaunchReport::failed(&name, failure);
            }
        };

        self.resume(PendingWorkload {
            endpoint,
            host_address,
        })
        .await
    }

    /// Discover the credential of a running, exposed workload and record its
    /// mapping. Used both as the tail of [`Self::launch`] and to retry a
    /// launch that ended in [`LaunchOutcome::CredentialTimeout`].
    #[tracing::instrument(skip(self, pending), fields(workload = %pending.endpoint.workload))]
    pub async fn resume(&self, pending: PendingWorkload) -> LaunchReport {
        let name = pending.endpoint.workload.clone();

        let Some(credential) = credential::poll_credential(
            self.cluster.as_ref(),
            &name,
            &self.settings.listing_command,
            self.settings.poll,
        )
        .await
        else {
            return LaunchReport {
                workload: Some(name),
                url: None,
                outcome: LaunchOutcome::CredentialTimeout,
                pending: Some(pending),
            };
        };

        let entry = MappingEntry {
            external_port: pending.endpoint.node_port,
            credential: credential.as_str().to_string(),
            host_address: pending.host_address,
        };
        // The notebook is usable even when the proxy cannot route to it yet.
        if let Err(e) = self.mappings.upsert(&name, entry).await {
            error!("Failed to record pod mapping: {e:?}");
        }

        let url = self.access_url(&name, &credential);
        info!(%url, "Notebook is ready");
        LaunchReport {
            workload: Some(name),
            url: Some(url),
            outcome: LaunchOutcome::Ready,
            pending: None,
        }
    }

    /// Proxy URL of a workload: `{base}/{prefix}/{workload}/?token={credential}`.
    pub fn access_url(&self, workload: &str, credential: &AccessCredential) -> String {
        let base = self.settings.proxy_base_url.trim_end_matches('/');
        let prefix = self.settings.routing_prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{base}/{workload}/?token={}", credential.as_str())
        } else {
            format!("{base}/{prefix}/{workload}/?token={}", credential.as_str())
        }
    }
}
