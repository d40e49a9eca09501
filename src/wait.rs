//! Fixed-interval bounded polling

use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Result of a bounded poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The condition held on poll number `polls`
    Observed { polls: u32 },
    /// The condition never held within the budget
    Exhausted { polls: u32 },
}

impl PollOutcome {
    pub fn observed(self) -> bool {
        matches!(self, PollOutcome::Observed { .. })
    }

    pub fn polls(self) -> u32 {
        match self {
            PollOutcome::Observed { polls } | PollOutcome::Exhausted { polls } => polls,
        }
    }
}

/// Sleep `interval`, then check; repeat up to `max_polls` times.
///
/// An error from `check` stops polling and is returned as is.
pub async fn poll_until<F, Fut, E>(
    interval: Duration,
    max_polls: u32,
    mut check: F,
) -> Result<PollOutcome, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    for poll in 1..=max_polls {
        tokio::time::sleep(interval).await;
        if check(poll).await? {
            debug!("Condition observed on poll {}/{}", poll, max_polls);
            return Ok(PollOutcome::Observed { polls: poll });
        }
        debug!("Condition not yet observed (poll {}/{})", poll, max_polls);
    }
    Ok(PollOutcome::Exhausted { polls: max_polls })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_observed_on_third_poll() {
        let calls = AtomicU32::new(0);
        let outcome = poll_until(Duration::from_millis(1), 10, |poll| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, String>(poll == 3) }
        })
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Observed { polls: 3 });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_after_max_polls() {
        let calls = AtomicU32::new(0);
        let outcome = poll_until(Duration::from_millis(1), 5, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, String>(false) }
        })
        .await
        .unwrap();

        assert!(!outcome.observed());
        assert_eq!(outcome.polls(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_check_error_stops_polling() {
        let result = poll_until(Duration::from_millis(1), 5, |poll| async move {
            if poll == 2 {
                Err("probe crashed")
            } else {
                Ok(false)
            }
        })
        .await;
        assert_eq!(result, Err("probe crashed"));
    }

    #[tokio::test]
    async fn test_zero_budget_never_checks() {
        let calls = AtomicU32::new(0);
        let outcome = poll_until(Duration::from_millis(1), 0, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, String>(true) }
        })
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::Exhausted { polls: 0 });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
