//! Notebook pod construction and readiness.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Capabilities;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::ContainerPort;
use k8s_openapi::api::core::v1::EmptyDirVolumeSource;
use k8s_openapi::api::core::v1::HostPathVolumeSource;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::api::core::v1::SeccompProfile;
use k8s_openapi::api::core::v1::SecurityContext;
use k8s_openapi::api::core::v1::Volume;
use k8s_openapi::api::core::v1::VolumeMount;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::k8s::Cluster;
use crate::orchestrator::poll::poll_until;
use crate::orchestrator::poll::PollResult;
use crate::orchestrator::poll::Step;
use crate::orchestrator::types::LaunchFailure;
use crate::orchestrator::types::LaunchSettings;
use crate::orchestrator::types::RunningWorkload;
use crate::orchestrator::types::WorkloadPhase;

/// Label set on every object the launcher creates.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "notebook-launcher";

const CONTAINER_NAME: &str = "notebook";
const ARTIFACTS_VOLUME: &str = "model-artifacts";
const SHM_VOLUME: &str = "dshm";

/// Fresh pod name; the random suffix keeps concurrent launches apart.
pub fn workload_name() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("jupyter-{}", &suffix[..8])
}

/// Shell command that installs and starts the notebook server.
pub fn startup_command(port: u16) -> String {
    format!(
        "pip install jupyter && \
         jupyter lab --ip=0.0.0.0 --port={port} --allow-root --no-browser \
         --NotebookApp.allow_origin='https://colab.research.google.com'"
    )
}

/// Pod for one notebook session holding exactly one GPU.
pub fn build_pod(name: &str, node: Option<&str>, settings: &LaunchSettings) -> Pod {
    let gpu = BTreeMap::from([(settings.gpu_resource.clone(), Quantity("1".to_string()))]);

    let mut volumes = vec![Volume {
        name: ARTIFACTS_VOLUME.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: settings.artifacts_host_path.clone(),
            type_: Some("DirectoryOrCreate".to_string()),
        }),
        ..Default::default()
    }];
    let mut volume_mounts = vec![VolumeMount {
        name: ARTIFACTS_VOLUME.to_string(),
        mount_path: settings.artifacts_mount_path.clone(),
        ..Default::default()
    }];

    if let Some(shm_size) = &settings.shm_size {
        volumes.push(Volume {
            name: SHM_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource {
                medium: Some("Memory".to_string()),
                size_limit: Some(Quantity(shm_size.clone())),
            }),
            ..Default::default()
        });
        volume_mounts.push(VolumeMount {
            name: SHM_VOLUME.to_string(),
            mount_path: "/dev/shm".to_string(),
            ..Default::default()
        });
    }

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(settings.image.clone()),
        command: Some(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            startup_command(settings.notebook_port),
        ]),
        ports: Some(vec![ContainerPort {
            container_port: i32::from(settings.notebook_port),
            name: Some("notebook".to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        resources: Some(ResourceRequirements {
            limits: Some(gpu.clone()),
            requests: Some(gpu),
            ..Default::default()
        }),
        // GPU runtimes and debuggers need ptrace outside the default seccomp profile.
        security_context: Some(SecurityContext {
            capabilities: Some(Capabilities {
                add: Some(vec!["SYS_PTRACE".to_string()]),
                drop: None,
            }),
            seccomp_profile: Some(SeccompProfile {
                type_: "Unconfined".to_string(),
                localhost_profile: None,
            }),
            ..Default::default()
        }),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    };

    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(settings.namespace.clone()),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_string(),
                MANAGED_BY.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: node.map(str::to_string),
            containers: vec![container],
            volumes: Some(volumes),
            restart_policy: Some("Never".to_string()),
            ..Default::default()
        }),
        status: None,
    }
}

/// Submits a notebook pod and waits for it to run.
pub struct WorkloadLauncher<'a> {
    cluster: &'a dyn Cluster,
    settings: &'a LaunchSettings,
}

impl<'a> WorkloadLauncher<'a> {
    pub fn new(cluster: &'a dyn Cluster, settings: &'a LaunchSettings) -> Self {
        Self { cluster, settings }
    }

    /// Create pod `name`, bound to `node` when given, and poll until it runs.
    ///
    /// The pod is submitted exactly once and never deleted, whatever the result.
    ///
    /// # Errors
    ///
    /// - [`LaunchFailure::LaunchFailed`] if the pod is rejected or fails
    /// - [`LaunchFailure::LaunchTimeout`] if it is still pending at the deadline
    #[tracing::instrument(skip(self))]
    pub async fn launch(
        &self,
        name: &str,
        node: Option<&str>,
    ) -> Result<RunningWorkload, LaunchFailure> {
        let pod = build_pod(name, node, self.settings);
        self.cluster
            .create_pod(&pod)
            .await
            .map_err(|e| LaunchFailure::LaunchFailed(format!("{e}")))?;
        info!("Submitted notebook pod");

        let cluster = self.cluster;
        let result = poll_until(self.settings.poll, |attempt| async move {
            let pod = match cluster.get_pod(name).await {
                Ok(pod) => pod,
                Err(e) => {
                    warn!(attempt, "Failed to read pod phase: {e:?}");
                    return Step::Pending;
                }
            };
            match WorkloadPhase::of(&pod) {
                WorkloadPhase::Running => Step::Done(pod),
                WorkloadPhase::Failed { reason } => Step::Abort(reason),
                WorkloadPhase::Pending => Step::Pending,
            }
        })
        .await;

        match result {
            PollResult::Done(pod) => {
                let workload = RunningWorkload {
                    name: name.to_string(),
                    node_name: pod.spec.and_then(|s| s.node_name),
                    host_ip: pod.status.and_then(|s| s.host_ip),
                };
                info!(node = ?workload.node_name, "Notebook pod is running");
                Ok(workload)
            }
            PollResult::Aborted(reason) => {
                warn!(%reason, "Notebook pod failed");
                Err(LaunchFailure::LaunchFailed(reason))
            }
            PollResult::TimedOut { attempts } => {
                warn!(attempts, "Notebook pod did not start in time");
                Err(LaunchFailure::LaunchTimeout)
            }
        }
    }
}
