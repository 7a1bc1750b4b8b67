use thiserror::Error;

/// Errors that can occur during Kubernetes operations.
#[derive(Debug, Error)]
pub enum KubernetesError {
    #[error("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[error("Kubernetes API request failed: {message}")]
    RequestFailed { message: String },
    #[error("Pod not found: {pod_name} in namespace {namespace}")]
    PodNotFound { pod_name: String, namespace: String },
    #[error("Failed to execute command in pod {pod_name}: {message}")]
    ExecFailed { pod_name: String, message: String },
}
