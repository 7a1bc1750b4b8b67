use std::fmt;

use clap::ValueEnum;
use derive_more::Display;
use k8s_openapi::api::core::v1::Pod;

use crate::orchestrator::poll::PollPolicy;

/// GPU budget of one schedulable node at the instant it was inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCapacity {
    pub name: String,
    /// GPU units the node advertises as allocatable
    pub allocatable: u32,
    /// GPU units requested by pods already bound to the node
    pub committed: u32,
}

impl NodeCapacity {
    /// Units still free; zero when the node is fully or over committed.
    pub const fn free(&self) -> u32 {
        self.allocatable.saturating_sub(self.committed)
    }
}

/// Where a new workload is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Placement {
    /// Bind the pod to the node picked by the selector
    #[default]
    Selected,
    /// Only gate on capacity and let the cluster scheduler place the pod
    Scheduler,
}

/// Lifecycle phase of a launched pod as seen by the launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadPhase {
    Pending,
    Running,
    Failed { reason: String },
}

impl WorkloadPhase {
    /// Classify a pod by its reported phase.
    ///
    /// A pod that ran to completion counts as failed: the notebook server
    /// is expected to run until removed.
    pub fn of(pod: &Pod) -> Self {
        let status = pod.status.as_ref();
        match status.and_then(|s| s.phase.as_deref()) {
            Some("Running") => Self::Running,
            Some(phase @ ("Failed" | "Succeeded")) => Self::Failed {
                reason: status
                    .and_then(|s| s.reason.clone().or_else(|| s.message.clone()))
                    .unwrap_or_else(|| phase.to_string()),
            },
            _ => Self::Pending,
        }
    }
}

/// A pod that reached the running phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningWorkload {
    pub name: String,
    pub node_name: Option<String>,
    pub host_ip: Option<String>,
}

/// The externally reachable service created for a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedEndpoint {
    pub service_name: String,
    pub workload: String,
    pub internal_port: u16,
    /// Port assigned by the platform when the service was created
    pub node_port: u16,
}

/// Workload that is running and exposed but has no discovered credential yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWorkload {
    pub endpoint: ExposedEndpoint,
    pub host_address: String,
}

/// Access token of a notebook server.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessCredential(String);

impl AccessCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens stay out of logs.
impl fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessCredential(***)")
    }
}

/// Why a launch attempt ended without a usable workload.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum LaunchFailure {
    #[display("cluster unavailable: {_0}")]
    ClusterUnavailable(String),
    #[display("workload failed: {_0}")]
    LaunchFailed(String),
    #[display("workload did not start before the deadline")]
    LaunchTimeout,
    #[display("workload could not be exposed: {_0}")]
    ExposeFailed(String),
}

/// Result category of a launch, as translated by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// Workload is serving and its URL is known
    Ready,
    /// No node has a free GPU right now
    NoCapacity,
    /// Workload is up and exposed but its credential has not shown up yet
    CredentialTimeout,
    Failed(LaunchFailure),
}

/// Settings for launching notebook workloads.
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub namespace: String,
    /// Extended resource name the nodes advertise for GPUs
    pub gpu_resource: String,
    pub image: String,
    pub notebook_port: u16,
    pub artifacts_host_path: String,
    pub artifacts_mount_path: String,
    /// Size of the memory-backed `/dev/shm`; `None` keeps the runtime default
    pub shm_size: Option<String>,
    pub placement: Placement,
    /// Fixed address the node ports are reachable on; defaults to the node's host IP
    pub public_host: Option<String>,
    pub proxy_base_url: String,
    pub routing_prefix: String,
    pub listing_command: Vec<String>,
    pub poll: PollPolicy,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            gpu_resource: "amd.com/gpu".to_string(),
            image: "rocm/vllm-dev:20250112".to_string(),
            notebook_port: 8888,
            artifacts_host_path: "/mnt/models".to_string(),
            artifacts_mount_path: "/workspace/models".to_string(),
            shm_size: Some("32Gi".to_string()),
            placement: Placement::Selected,
            public_host: None,
            proxy_base_url: "http://localhost:8000".to_string(),
            routing_prefix: "jupyter".to_string(),
            listing_command: ["jupyter", "notebook", "list"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            poll: PollPolicy::default(),
        }
    }
}
