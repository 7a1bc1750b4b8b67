//! Kubernetes integration module.
//!
//! This module provides the cluster seam the launch orchestrator runs on and
//! its Kubernetes implementation.
//!
//! The main components are:
//! - [`Cluster`]: The operations the orchestrator needs from a cluster
//! - [`KubeCluster`]: [`Cluster`] backed by the Kubernetes API server
//! - [`KubernetesError`]: Errors raised by cluster operations

pub mod cluster;
#[cfg(test)]
pub(crate) mod fake;
pub mod kube_client;
pub mod kube_cluster;
pub mod types;

pub use cluster::Cluster;
pub use cluster::ClusterResult;
pub use kube_cluster::KubeCluster;
pub use types::KubernetesError;
