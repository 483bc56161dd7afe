//! Run independent executors concurrently

use crate::error::Error;
use crate::executor::{Executor, Outcome};
use futures::future::join_all;
use tracing::{error, info};

/// An executor that failed, with its error
pub struct Failure {
    /// The executor that failed
    pub executor: Box<dyn Executor>,
    /// Why it failed
    pub error: Error,
}

impl std::fmt::Debug for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Failure")
            .field("executor", &self.executor.name())
            .field("error", &self.error)
            .finish()
    }
}

/// Result of a parallel run
#[derive(Debug, Default)]
pub struct Report {
    /// Outcomes of the executors that succeeded, by executor name
    pub outcomes: Vec<(String, Outcome)>,
    /// Every executor that failed
    pub failures: Vec<Failure>,
}

impl Report {
    /// True when no executor failed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Append another run's results
    pub fn merge(&mut self, other: Report) {
        self.outcomes.extend(other.outcomes);
        self.failures.extend(other.failures);
    }
}

/// Run every executor to completion and collect all failures
///
/// One failure never cancels the others. The executors must be independent
/// of each other since no ordering is guaranteed.
pub async fn run_parallel(executors: Vec<Box<dyn Executor>>) -> Report {
    info!("Running {} executors in parallel", executors.len());
    let results = join_all(executors.iter().map(|e| e.execute())).await;

    let mut report = Report::default();
    for (executor, result) in executors.into_iter().zip(results) {
        match result {
            Ok(outcome) => report.outcomes.push((executor.name().to_string(), outcome)),
            Err(error) => {
                error!("{} failed: {}", executor.name(), error);
                report.failures.push(Failure { executor, error });
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Job {
        name: String,
        fail: bool,
        delay: Duration,
        finished: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Executor for Job {
        async fn execute(&self) -> Result<Outcome> {
            async_io::Timer::after(self.delay).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::Internal(format!("{} broke", self.name)))
            } else {
                Ok(Outcome::Nothing)
            }
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    #[smol_potat::test]
    async fn test_failures_do_not_stop_others() {
        let finished = Arc::new(AtomicUsize::new(0));
        let executors: Vec<Box<dyn Executor>> = (0..5)
            .map(|i| {
                Box::new(Job {
                    name: format!("job-{i}"),
                    fail: i == 1 || i == 3,
                    // Failing jobs finish first
                    delay: Duration::from_millis(if i % 2 == 1 { 1 } else { 20 }),
                    finished: finished.clone(),
                }) as Box<dyn Executor>
            })
            .collect();

        let report = run_parallel(executors).await;

        assert_eq!(finished.load(Ordering::SeqCst), 5);
        assert_eq!(report.outcomes.len(), 3);
        let mut failed: Vec<_> = report
            .failures
            .iter()
            .map(|f| f.executor.name().to_string())
            .collect();
        failed.sort();
        assert_eq!(failed, vec!["job-1", "job-3"]);
        assert!(report
            .failures
            .iter()
            .all(|f| f.error.to_string().ends_with("broke")));
        assert!(!report.is_success());
    }

    #[smol_potat::test]
    async fn test_empty_run_succeeds() {
        let report = run_parallel(Vec::new()).await;
        assert!(report.is_success());
        assert!(report.outcomes.is_empty());
    }
}
