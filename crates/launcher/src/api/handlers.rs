use std::future::Future;
use std::sync::Arc;

use api_types::LaunchLogEntry;
use api_types::LaunchRequest;
use api_types::LaunchResponse;
use api_types::MappingsResponse;
use api_types::SessionStatus;
use api_types::StatusResponse;
use poem::handler;
use poem::web::Data;
use poem::web::Json;
use poem::web::Query;
use serde::Deserialize;
use tracing::error;
use tracing::info;

use super::errors::ApiError;
use crate::orchestrator::LaunchCoordinator;
use crate::orchestrator::LaunchFailure;
use crate::orchestrator::LaunchOutcome;
use crate::orchestrator::LaunchReport;
use crate::session::Begin;
use crate::session::SessionStore;

/// Query parameters identifying a requester
#[derive(Debug, Deserialize)]
pub struct RequesterQuery {
    #[serde(alias = "email")]
    pub requester: Option<String>,
}

fn required_requester(value: Option<&str>) -> Result<String, ApiError> {
    value
        .map(str::trim)
        .filter(|requester| !requester.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::MissingRequester)
}

/// Run a launch or resume in the background and record its report.
///
/// A task that panics is recorded as a failed launch so the requester is not
/// left launching forever.
pub(crate) fn spawn_tracked<F>(sessions: Arc<SessionStore>, requester: String, task: F)
where
    F: Future<Output = LaunchReport> + Send + 'static,
{
    tokio::spawn(async move {
        let report = match tokio::spawn(task).await {
            Ok(report) => report,
            Err(e) => {
                error!(requester = %requester, "Launch task failed: {e}");
                LaunchReport {
                    workload: None,
                    url: None,
                    outcome: LaunchOutcome::Failed(LaunchFailure::LaunchFailed(format!(
                        "launch task failed: {e}"
                    ))),
                    pending: None,
                }
            }
        };
        info!(requester = %requester, outcome = ?report.outcome, "Launch task finished");
        sessions.finish(&requester, &report).await;
    });
}

/// Start (or join) the launch for a requester
#[handler]
pub async fn launch(
    Json(request): Json<LaunchRequest>,
    coordinator: Data<&Arc<LaunchCoordinator>>,
    sessions: Data<&Arc<SessionStore>>,
) -> poem::Result<Json<LaunchResponse>> {
    let requester = required_requester(request.requester.as_deref())?;

    match sessions.begin(&requester).await {
        Begin::Existing(view) => match (view.status, view.url) {
            (SessionStatus::Ready, Some(url)) => Ok(Json(LaunchResponse::ready(url))),
            _ => Ok(Json(LaunchResponse::launching(requester, view.workload))),
        },
        Begin::Started => {
            let coordinator = Arc::clone(*coordinator);
            spawn_tracked(
                Arc::clone(*sessions),
                requester.clone(),
                async move { coordinator.launch().await },
            );
            Ok(Json(LaunchResponse::launching(requester, None)))
        }
    }
}

/// Report a requester's session; restarts credential discovery for a
/// session whose previous poll timed out
#[handler]
pub async fn get_url(
    Query(query): Query<RequesterQuery>,
    coordinator: Data<&Arc<LaunchCoordinator>>,
    sessions: Data<&Arc<SessionStore>>,
) -> poem::Result<Json<StatusResponse>> {
    let requester = required_requester(query.requester.as_deref())?;

    if let Some(pending) = sessions.claim_resume(&requester).await {
        let coordinator = Arc::clone(*coordinator);
        spawn_tracked(
            Arc::clone(*sessions),
            requester.clone(),
            async move { coordinator.resume(pending).await },
        );
    }

    let status = sessions
        .status(&requester)
        .await
        .map_or_else(StatusResponse::unknown, StatusResponse::from);
    Ok(Json(status))
}

/// The mapping document the reverse proxy reads
#[handler]
pub async fn pod_mappings(
    coordinator: Data<&Arc<LaunchCoordinator>>,
) -> poem::Result<Json<MappingsResponse>> {
    let mappings = coordinator.mappings().load().await.map_err(|e| {
        error!("Failed to load pod mappings: {e:?}");
        ApiError::MappingUnavailable {
            message: e.to_string(),
        }
    })?;
    Ok(Json(MappingsResponse { mappings }))
}

/// Successful launches, oldest first
#[handler]
pub async fn launches(sessions: Data<&Arc<SessionStore>>) -> Json<Vec<LaunchLogEntry>> {
    Json(sessions.launches().await)
}
