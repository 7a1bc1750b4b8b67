//! Bounded fixed-interval polling.
//!
//! A poll is a small state machine: the check runs immediately and then once
//! per interval until it reports a terminal step or the next check would
//! start after the deadline. There are no retries beyond that single budget.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout_at;
use tokio::time::Instant;

/// Interval and deadline of a bounded poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(120),
        }
    }
}

/// What a single attempt observed.
#[derive(Debug)]
pub enum Step<T, E> {
    Done(T),
    Pending,
    Abort(E),
}

/// Terminal state of a poll.
#[derive(Debug, PartialEq, Eq)]
pub enum PollResult<T, E> {
    Done(T),
    Aborted(E),
    TimedOut { attempts: u32 },
}

/// Upper bound for any poll interval or timeout.
pub const MAX_POLL_DURATION: Duration = Duration::from_secs(86_400);

/// Run `check` under `policy`. Each call receives the 1-based attempt number.
///
/// An attempt still running at the deadline is dropped and the poll times out.
pub async fn poll_until<T, E, F, Fut>(policy: PollPolicy, mut check: F) -> PollResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Step<T, E>>,
{
    let interval = policy.interval.min(MAX_POLL_DURATION);
    let deadline = Instant::now() + policy.timeout.min(MAX_POLL_DURATION);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match timeout_at(deadline, check(attempt)).await {
            Ok(Step::Done(value)) => return PollResult::Done(value),
            Ok(Step::Abort(error)) => return PollResult::Aborted(error),
            Ok(Step::Pending) => {}
            Err(_) => return PollResult::TimedOut { attempts: attempt },
        }

        let next = Instant::now() + interval;
        if next > deadline {
            return PollResult::TimedOut { attempts: attempt };
        }
        tokio::time::sleep_until(next).await;
    }
}
