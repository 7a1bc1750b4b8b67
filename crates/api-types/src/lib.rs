//! Shared API type definitions
//!
//! This crate contains the wire types shared between the notebook launcher's
//! HTTP shell, its callers, and the reverse proxy that reads the pod mapping
//! document.

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Routing entry for one launched notebook pod.
///
/// The reverse proxy resolves `/{prefix}/{pod}/...` to
/// `host_address:external_port` and appends the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Node port assigned by the cluster to the pod's service
    #[serde(rename = "port")]
    pub external_port: u16,
    /// Notebook access token
    #[serde(rename = "token")]
    pub credential: String,
    /// Address on which the node port is reachable
    #[serde(rename = "host")]
    pub host_address: String,
}

/// Mapping document persisted for the reverse proxy, keyed by pod name.
pub type MappingDocument = BTreeMap<String, MappingEntry>;

/// Body of a launch request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaunchRequest {
    /// Identity of the requester, one notebook per requester
    #[serde(alias = "email")]
    pub requester: Option<String>,
}

/// Response to a launch request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,
}

impl LaunchResponse {
    /// Response for a requester whose notebook is already reachable
    pub fn ready(url: String) -> Self {
        Self {
            url: Some(url),
            message: None,
            requester: None,
            pod_name: None,
        }
    }

    /// Response for a requester whose notebook is still being prepared
    pub fn launching(requester: String, pod_name: Option<String>) -> Self {
        Self {
            url: None,
            message: Some("Pod is launching, please wait...".to_string()),
            requester: Some(requester),
            pod_name,
        }
    }
}

/// Coarse session state reported to polling clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Launching,
    Ready,
    NoGpu,
    Failed,
    Unknown,
}

/// Response for a status poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub url: Option<String>,
    pub pod_name: Option<String>,
    pub status: SessionStatus,
}

impl StatusResponse {
    /// Response for a requester with no session
    pub fn unknown() -> Self {
        Self {
            url: None,
            pod_name: None,
            status: SessionStatus::Unknown,
        }
    }
}

/// Response carrying the current mapping document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingsResponse {
    pub mappings: MappingDocument,
}

/// One successful launch, recorded for operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchLogEntry {
    pub requester: String,
    pub pod_name: String,
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn mapping_entry_uses_proxy_field_names() {
        let entry = MappingEntry {
            external_port: 31500,
            credential: "abc123".to_string(),
            host_address: "10.0.0.7".to_string(),
        };

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"port": 31500, "token": "abc123", "host": "10.0.0.7"})
        );
    }

    #[test]
    fn launch_request_accepts_legacy_email_field() {
        let request: LaunchRequest = serde_json::from_str(r#"{"email": "a@b.c"}"#).unwrap();
        assert_eq!(request.requester.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn launching_response_omits_url() {
        let response = LaunchResponse::launching("a@b.c".to_string(), None);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "message": "Pod is launching, please wait...",
                "requester": "a@b.c"
            })
        );
    }

    #[test]
    fn session_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::NoGpu).unwrap(),
            "\"no_gpu\""
        );
    }

    #[test]
    fn unknown_status_has_no_url_or_pod() {
        assert_eq!(
            serde_json::to_value(StatusResponse::unknown()).unwrap(),
            serde_json::json!({"url": null, "pod_name": null, "status": "unknown"})
        );
    }
}
