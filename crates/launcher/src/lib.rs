//! Launches GPU-backed Jupyter notebook workloads on a Kubernetes cluster.

pub mod api;
pub mod app;
pub mod config;
pub mod k8s;
pub mod orchestrator;
pub mod session;
