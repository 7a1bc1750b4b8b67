//! Per-requester session records.
//!
//! Each requester maps to its own record, so at most one launch is in flight
//! per requester and one requester's result never overwrites another's.

use std::collections::HashMap;

use api_types::LaunchLogEntry;
use api_types::SessionStatus;
use api_types::StatusResponse;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;
use tracing::warn;

use crate::orchestrator::LaunchOutcome;
use crate::orchestrator::LaunchReport;
use crate::orchestrator::PendingWorkload;

#[derive(Debug, Clone)]
enum SessionState {
    Launching,
    /// Workload is up; its credential was not found within the last poll
    AwaitingCredential(PendingWorkload),
    /// A credential poll for [`SessionState::AwaitingCredential`] is running
    Resuming,
    Ready(String),
    NoGpu,
    Failed(String),
}

impl SessionState {
    /// Whether a new launch may replace this state.
    const fn is_retryable(&self) -> bool {
        matches!(self, Self::NoGpu | Self::Failed(_))
    }
}

#[derive(Debug, Clone)]
struct SessionRecord {
    state: SessionState,
    workload: Option<String>,
}

/// Snapshot of one requester's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub workload: Option<String>,
    pub url: Option<String>,
    pub status: SessionStatus,
    pub detail: Option<String>,
}

impl From<&SessionRecord> for SessionView {
    fn from(record: &SessionRecord) -> Self {
        let (status, url, detail) = match &record.state {
            SessionState::Launching
            | SessionState::AwaitingCredential(_)
            | SessionState::Resuming => (SessionStatus::Launching, None, None),
            SessionState::Ready(url) => (SessionStatus::Ready, Some(url.clone()), None),
            SessionState::NoGpu => (SessionStatus::NoGpu, None, None),
            SessionState::Failed(reason) => (SessionStatus::Failed, None, Some(reason.clone())),
        };
        Self {
            workload: record.workload.clone(),
            url,
            status,
            detail,
        }
    }
}

impl From<SessionView> for StatusResponse {
    fn from(view: SessionView) -> Self {
        Self {
            url: view.url,
            pod_name: view.workload,
            status: view.status,
        }
    }
}

/// Result of trying to start a launch for a requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Begin {
    /// The caller owns the new launch and must report it through
    /// [`SessionStore::finish`]
    Started,
    /// A launch is in flight or done; nothing new may be started
    Existing(SessionView),
}

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    launches: RwLock<Vec<LaunchLogEntry>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim the right to launch for `requester`.
    pub async fn begin(&self, requester: &str) -> Begin {
        let mut sessions = self.sessions.write().await;

        if let Some(record) = sessions.get(requester) {
            if !record.state.is_retryable() {
                return Begin::Existing(SessionView::from(record));
            }
        }

        sessions.insert(
            requester.to_string(),
            SessionRecord {
                state: SessionState::Launching,
                workload: None,
            },
        );
        info!(requester, "Starting launch");
        Begin::Started
    }

    /// Record the result of a launch or resume started for `requester`.
    pub async fn finish(&self, requester: &str, report: &LaunchReport) {
        let state = match (&report.outcome, &report.url, &report.pending) {
            (LaunchOutcome::Ready, Some(url), _) => SessionState::Ready(url.clone()),
            (LaunchOutcome::CredentialTimeout, _, Some(pending)) => {
                SessionState::AwaitingCredential(pending.clone())
            }
            (LaunchOutcome::NoCapacity, _, _) => SessionState::NoGpu,
            (LaunchOutcome::Failed(failure), _, _) => SessionState::Failed(failure.to_string()),
            (outcome, _, _) => {
                warn!(requester, ?outcome, "Incomplete launch report");
                SessionState::Failed(format!("{outcome:?}"))
            }
        };

        if let (SessionState::Ready(_), Some(workload)) = (&state, &report.workload) {
            self.launches.write().await.push(LaunchLogEntry {
                requester: requester.to_string(),
                pod_name: workload.clone(),
                started_at: Utc::now(),
            });
        }

        let mut sessions = self.sessions.write().await;
        let record = sessions
            .entry(requester.to_string())
            .or_insert_with(|| SessionRecord {
                state: SessionState::Launching,
                workload: None,
            });
        record.state = state;
        if report.workload.is_some() {
            record.workload = report.workload.clone();
        }
    }

    /// Take over a session waiting for its credential so exactly one caller
    /// polls for it again.
    pub async fn claim_resume(&self, requester: &str) -> Option<PendingWorkload> {
        let mut sessions = self.sessions.write().await;
        let record = sessions.get_mut(requester)?;
        let SessionState::AwaitingCredential(pending) = &record.state else {
            return None;
        };
        let pending = pending.clone();
        record.state = SessionState::Resuming;
        Some(pending)
    }

    /// Current view of `requester`'s session, if any.
    pub async fn status(&self, requester: &str) -> Option<SessionView> {
        self.sessions
            .read()
            .await
            .get(requester)
            .map(SessionView::from)
    }

    /// Successful launches, oldest first.
    pub async fn launches(&self) -> Vec<LaunchLogEntry> {
        self.launches.read().await.clone()
    }
}
