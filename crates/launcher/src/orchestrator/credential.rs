//! Notebook token discovery.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::k8s::Cluster;
use crate::orchestrator::poll::poll_until;
use crate::orchestrator::poll::PollPolicy;
use crate::orchestrator::poll::PollResult;
use crate::orchestrator::poll::Step;
use crate::orchestrator::types::AccessCredential;

static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]token=([^\s&]+)").expect("token pattern is valid"));

/// Token of the first server URL in a notebook listing.
///
/// Only URL-shaped lines are considered, so a token echoed in a log line
/// without a scheme is ignored.
pub fn extract_token(listing: &str) -> Option<AccessCredential> {
    listing
        .lines()
        .filter(|line| line.contains("://"))
        .find_map(|line| TOKEN_PATTERN.captures(line))
        .and_then(|captures| captures.get(1))
        .map(|token| AccessCredential::new(token.as_str()))
}

/// Run `listing_command` in `workload` until a token shows up.
///
/// Returns `None` when the deadline passes first; the workload is left as is.
#[tracing::instrument(skip(cluster, listing_command, policy))]
pub async fn poll_credential(
    cluster: &dyn Cluster,
    workload: &str,
    listing_command: &[String],
    policy: PollPolicy,
) -> Option<AccessCredential> {
    let result: PollResult<AccessCredential, ()> = poll_until(policy, |attempt| async move {
        match cluster.exec(workload, listing_command).await {
            Ok(listing) => match extract_token(&listing) {
                Some(credential) => Step::Done(credential),
                None => {
                    debug!(attempt, "Notebook server not listed yet");
                    Step::Pending
                }
            },
            Err(e) => {
                warn!(attempt, "Failed to list notebook servers: {e:?}");
                Step::Pending
            }
        }
    })
    .await;

    match result {
        PollResult::Done(credential) => {
            info!("Discovered notebook credential");
            Some(credential)
        }
        PollResult::TimedOut { attempts } => {
            warn!(attempts, "Notebook credential not found before the deadline");
            None
        }
        PollResult::Aborted(()) => None,
    }
}
