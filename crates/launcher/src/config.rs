use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use utils::version;

use crate::orchestrator::poll::PollPolicy;
use crate::orchestrator::poll::MAX_POLL_DURATION;
use crate::orchestrator::LaunchSettings;
use crate::orchestrator::Placement;

const MAX_POLL_SECS: u64 = MAX_POLL_DURATION.as_secs();

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the launch API
    Serve(ServeArgs),
    /// Launch a single notebook and print its URL
    Launch(LaunchArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(
        long,
        env = "LAUNCHER_LISTEN_ADDR",
        default_value = "0.0.0.0:5000",
        help = "HTTP API server listen address"
    )]
    pub listen_addr: String,

    #[command(flatten)]
    pub orchestrator: OrchestratorArgs,
}

#[derive(Args)]
pub struct LaunchArgs {
    #[arg(
        long,
        help = "Requester the launch is logged for; runs outside the server's one-launch-per-requester guard, so every run creates a new workload"
    )]
    pub requester: String,

    #[command(flatten)]
    pub orchestrator: OrchestratorArgs,
}

#[derive(Args, Debug, Clone)]
pub struct OrchestratorArgs {
    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        env = "LAUNCHER_NAMESPACE",
        default_value = "default",
        help = "Namespace notebook pods and services are created in"
    )]
    pub namespace: String,

    #[arg(
        long,
        env = "LAUNCHER_GPU_RESOURCE",
        default_value = "amd.com/gpu",
        help = "Extended resource name nodes advertise GPUs under"
    )]
    pub gpu_resource: String,

    #[arg(
        long,
        env = "LAUNCHER_IMAGE",
        default_value = "rocm/vllm-dev:20250112",
        help = "Container image for notebook workloads"
    )]
    pub image: String,

    #[arg(long, env = "LAUNCHER_NOTEBOOK_PORT", default_value_t = 8888)]
    pub notebook_port: u16,

    #[arg(
        long,
        env = "LAUNCHER_ARTIFACTS_HOST_PATH",
        default_value = "/mnt/models",
        value_hint = clap::ValueHint::DirPath,
        help = "Host directory with shared model artifacts"
    )]
    pub artifacts_host_path: String,

    #[arg(
        long,
        env = "LAUNCHER_ARTIFACTS_MOUNT_PATH",
        default_value = "/workspace/models",
        help = "Where the artifacts directory is mounted inside the notebook"
    )]
    pub artifacts_mount_path: String,

    #[arg(
        long,
        env = "LAUNCHER_SHM_SIZE",
        default_value = "32Gi",
        help = "Size of /dev/shm for notebook pods, empty to keep the runtime default"
    )]
    pub shm_size: String,

    #[arg(long, env = "LAUNCHER_PLACEMENT", value_enum, default_value_t = Placement::Selected)]
    pub placement: Placement,

    #[arg(
        long,
        env = "LAUNCHER_PUBLIC_HOST",
        help = "Address node ports are reachable on (defaults to each node's host IP)"
    )]
    pub public_host: Option<String>,

    #[arg(
        long,
        env = "LAUNCHER_PROXY_BASE_URL",
        default_value = "http://localhost:8000",
        help = "Base URL of the reverse proxy fronting notebooks"
    )]
    pub proxy_base_url: String,

    #[arg(long, env = "LAUNCHER_ROUTING_PREFIX", default_value = "jupyter")]
    pub routing_prefix: String,

    #[arg(
        long,
        env = "LAUNCHER_MAPPING_FILE",
        default_value = "/tmp/jupyter_pod_mappings.json",
        value_hint = clap::ValueHint::FilePath,
        help = "JSON document the reverse proxy reads workload routes from"
    )]
    pub mapping_file: PathBuf,

    #[arg(
        long,
        env = "LAUNCHER_POLL_INTERVAL_SECS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..=MAX_POLL_SECS)
    )]
    pub poll_interval_secs: u64,

    #[arg(
        long,
        env = "LAUNCHER_POLL_TIMEOUT_SECS",
        default_value_t = 120,
        value_parser = clap::value_parser!(u64).range(1..=MAX_POLL_SECS)
    )]
    pub poll_timeout_secs: u64,

    #[arg(
        long,
        env = "LAUNCHER_LISTING_COMMAND",
        default_value = "jupyter notebook list",
        help = "Command run inside the notebook container to list running servers"
    )]
    pub listing_command: String,
}

impl OrchestratorArgs {
    pub fn launch_settings(&self) -> LaunchSettings {
        let shm_size = Some(self.shm_size.trim())
            .filter(|size| !size.is_empty())
            .map(str::to_string);

        LaunchSettings {
            namespace: self.namespace.clone(),
            gpu_resource: self.gpu_resource.clone(),
            image: self.image.clone(),
            notebook_port: self.notebook_port,
            artifacts_host_path: self.artifacts_host_path.clone(),
            artifacts_mount_path: self.artifacts_mount_path.clone(),
            shm_size,
            placement: self.placement,
            public_host: self.public_host.clone(),
            proxy_base_url: self.proxy_base_url.clone(),
            routing_prefix: self.routing_prefix.clone(),
            listing_command: self
                .listing_command
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            poll: PollPolicy {
                interval: Duration::from_secs(self.poll_interval_secs),
                timeout: Duration::from_secs(self.poll_timeout_secs),
            },
        }
    }
}
