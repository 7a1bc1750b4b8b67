use std::sync::Arc;

use error_stack::Report;
use poem::get;
use poem::listener::TcpListener;
use poem::middleware::Tracing;
use poem::post;
use poem::Endpoint;
use poem::EndpointExt;
use poem::Route;
use poem::Server;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use super::errors::ApiError;
use super::handlers::get_url;
use super::handlers::launch;
use super::handlers::launches;
use super::handlers::pod_mappings;
use crate::orchestrator::LaunchCoordinator;
use crate::session::SessionStore;

/// All API routes with their shared state attached.
pub fn routes(coordinator: Arc<LaunchCoordinator>, sessions: Arc<SessionStore>) -> impl Endpoint {
    Route::new()
        .at("/launch", post(launch))
        .at("/get_url", get(get_url))
        .at("/pod_mappings", get(pod_mappings))
        .at("/launches", get(launches))
        .data(coordinator)
        .data(sessions)
        .with(Tracing)
}

/// HTTP API server for launching notebooks and reporting their URLs
pub struct ApiServer {
    coordinator: Arc<LaunchCoordinator>,
    sessions: Arc<SessionStore>,
    listen_addr: String,
}

impl ApiServer {
    pub fn new(
        coordinator: Arc<LaunchCoordinator>,
        sessions: Arc<SessionStore>,
        listen_addr: String,
    ) -> Self {
        Self {
            coordinator,
            sessions,
            listen_addr,
        }
    }

    /// Start the API server
    ///
    /// # Errors
    ///
    /// - [`ApiError::ServerError`] if the server fails to start or bind to the address
    pub async fn run(self, cancellation_token: CancellationToken) -> Result<(), Report<ApiError>> {
        info!("Starting HTTP API server on {}", self.listen_addr);

        let app = routes(self.coordinator, self.sessions);
        let listener = TcpListener::bind(&self.listen_addr);
        let server = Server::new(listener);

        tokio::select! {
            result = server.run(app) => {
                match result {
                    Ok(()) => {
                        info!("API server stopped normally");
                        Ok(())
                    }
                    Err(e) => {
                        error!("API server failed: {e}");
                        Err(Report::new(ApiError::ServerError {
                            message: format!("Server failed: {e}"),
                        }))
                    }
                }
            }
            _ = cancellation_token.cancelled() => {
                info!("API server shutdown requested");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use api_types::LaunchLogEntry;
    use api_types::LaunchResponse;
    use api_types::MappingsResponse;
    use api_types::SessionStatus;
    use api_types::StatusResponse;
    use poem::endpoint::BoxEndpoint;
    use poem::http::StatusCode;
    use poem::test::TestClient;
    use serde_json::json;
    use similar_asserts::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::k8s::fake::gpu_node;
    use crate::k8s::fake::gpu_pod;
    use crate::k8s::fake::FakeCluster;
    use crate::orchestrator::LaunchSettings;
    use crate::orchestrator::MappingStore;

    const LISTING: &str = "http://0.0.0.0:8888/?token=abc123 :: /\n";

    struct Harness {
        cluster: Arc<FakeCluster>,
        client: TestClient<BoxEndpoint<'static>>,
        _dir: TempDir,
    }

    fn harness(cluster: FakeCluster) -> Harness {
        let dir = TempDir::new().unwrap();
        let cluster = Arc::new(cluster);
        let coordinator = Arc::new(LaunchCoordinator::new(
            cluster.clone(),
            MappingStore::new(dir.path().join("mappings.json")),
            LaunchSettings::default(),
        ));
        let app = routes(coordinator, Arc::new(SessionStore::new())).map_to_response();
        Harness {
            cluster,
            client: TestClient::new(app.boxed()),
            _dir: dir,
        }
    }

    impl Harness {
        async fn status(&self, requester: &str) -> StatusResponse {
            let resp = self
                .client
                .get("/get_url")
                .query("requester", &requester)
                .send()
                .await;
            resp.assert_status_is_ok();
            resp.0.into_body().into_json().await.unwrap()
        }

        /// Poll `/get_url` until the session leaves `launching`.
        async fn settled_status(&self, requester: &str) -> StatusResponse {
            loop {
                let status = self.status(requester).await;
                if status.status != SessionStatus::Launching {
                    return status;
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn launch_reports_url_once_ready() {
        let h = harness(FakeCluster::new(vec![gpu_node("a", 1)]).with_listings(vec![LISTING]));

        let resp = h
            .client
            .post("/launch")
            .body_json(&json!({"requester": "alice@example.com"}))
            .send()
            .await;
        resp.assert_status_is_ok();
        let body: LaunchResponse = resp.0.into_body().into_json().await.unwrap();
        assert_eq!(
            body,
            LaunchResponse::launching("alice@example.com".to_string(), None)
        );

        let status = h.settled_status("alice@example.com").await;
        assert_eq!(status.status, SessionStatus::Ready);
        let pod_name = status.pod_name.unwrap();
        assert_eq!(
            status.url.as_deref(),
            Some(format!("http://localhost:8000/jupyter/{pod_name}/?token=abc123").as_str())
        );

        // A ready session answers with its URL and creates nothing new.
        let resp = h
            .client
            .post("/launch")
            .body_json(&json!({"email": "alice@example.com"}))
            .send()
            .await;
        let body: LaunchResponse = resp.0.into_body().into_json().await.unwrap();
        assert_eq!(body, LaunchResponse::ready(status.url.unwrap()));
        assert_eq!(h.cluster.created_pod_count(), 1);

        let resp = h.client.get("/pod_mappings").send().await;
        resp.assert_status_is_ok();
        let body: MappingsResponse = resp.0.into_body().into_json().await.unwrap();
        assert_eq!(body.mappings[&pod_name].external_port, 31500);
        assert_eq!(body.mappings[&pod_name].credential, "abc123");

        let resp = h.client.get("/launches").send().await;
        let log: Vec<LaunchLogEntry> = resp.0.into_body().into_json().await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].requester, "alice@example.com");
        assert_eq!(log[0].pod_name, pod_name);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_launch_while_in_flight_creates_one_pod() {
        let h = harness(FakeCluster::new(vec![gpu_node("a", 2)]).with_listings(vec![LISTING]));

        for _ in 0..3 {
            h.client
                .post("/launch")
                .body_json(&json!({"requester": "alice"}))
                .send()
                .await
                .assert_status_is_ok();
        }

        assert_eq!(h.settled_status("alice").await.status, SessionStatus::Ready);
        assert_eq!(h.cluster.created_pod_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn full_cluster_reports_no_gpu() {
        let h = harness(
            FakeCluster::new(vec![gpu_node("a", 1)])
                .with_existing_pods(vec![gpu_pod("busy", "a", 1, "Running")]),
        );

        h.client
            .post("/launch")
            .body_json(&json!({"requester": "bob"}))
            .send()
            .await
            .assert_status_is_ok();

        let status = h.settled_status("bob").await;
        assert_eq!(
            status,
            StatusResponse {
                url: None,
                pod_name: None,
                status: SessionStatus::NoGpu,
            }
        );
        assert_eq!(h.cluster.created_pod_count(), 0);
    }

    #[tokio::test]
    async fn missing_requester_is_rejected() {
        let h = harness(FakeCluster::new(Vec::new()));

        h.client
            .post("/launch")
            .body_json(&json!({}))
            .send()
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        h.client
            .post("/launch")
            .body_json(&json!({"requester": "  "}))
            .send()
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        h.client
            .get("/get_url")
            .send()
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_requester_and_empty_mappings() {
        let h = harness(FakeCluster::new(Vec::new()));

        assert_eq!(h.status("nobody").await.status, SessionStatus::Unknown);

        let resp = h.client.get("/pod_mappings").send().await;
        resp.assert_status_is_ok();
        resp.assert_json(json!({"mappings": {}})).await;
    }

    #[tokio::test(start_paused = true)]
    async fn get_url_resumes_credential_discovery() {
        // Token only appears after the first 120s poll window has expired.
        let mut listings = vec!["starting"; 25];
        listings.push(LISTING);
        let h = harness(FakeCluster::new(vec![gpu_node("a", 1)]).with_listings(listings));

        h.client
            .post("/launch")
            .body_json(&json!({"requester": "carol"}))
            .send()
            .await
            .assert_status_is_ok();

        let status = h.settled_status("carol").await;
        assert_eq!(status.status, SessionStatus::Ready);
        assert!(status.url.unwrap().ends_with("?token=abc123"));
        assert_eq!(h.cluster.created_pod_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn two_missed_credential_windows_still_yield_one_pod() {
        // The launch window and the first resume window both miss the token.
        let mut listings = vec!["starting"; 50];
        listings.push(LISTING);
        let h = harness(FakeCluster::new(vec![gpu_node("a", 1)]).with_listings(listings));

        h.client
            .post("/launch")
            .body_json(&json!({"requester": "dave"}))
            .send()
            .await
            .assert_status_is_ok();

        let status = h.settled_status("dave").await;
        assert_eq!(status.status, SessionStatus::Ready);
        assert!(status.url.unwrap().ends_with("?token=abc123"));
        assert_eq!(h.cluster.created_pod_count(), 1);
        assert_eq!(h.cluster.created_services.lock().unwrap().len(), 1);
        assert_eq!(*h.cluster.exec_calls.lock().unwrap(), 51);
    }

    #[tokio::test]
    async fn api_server_stops_on_cancellation() {
        let dir = TempDir::new().unwrap();
        let coordinator = Arc::new(LaunchCoordinator::new(
            Arc::new(FakeCluster::new(Vec::new())),
            MappingStore::new(dir.path().join("mappings.json")),
            LaunchSettings::default(),
        ));
        let server = ApiServer::new(
            coordinator,
            Arc::new(SessionStore::new()),
            "127.0.0.1:0".to_string(),
        );
        let token = CancellationToken::new();
        token.cancel();

        assert!(server.run(token).await.is_ok());
    }
}
