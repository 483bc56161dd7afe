//! Bounded polling with an optional overall deadline

use crate::error::{Error, Result};
use crate::settings::Settings;
use async_io::Timer;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

/// A bounded polling loop
///
/// Runs a check up to `attempts` times with `interval` between tries. Stops
/// early with a timeout error once `deadline` has passed.
#[derive(Debug, Clone, Copy)]
pub struct Poll {
    /// Maximum number of checks
    pub attempts: u32,
    /// Pause between checks
    pub interval: Duration,
    /// Wall-clock bound across all checks
    pub deadline: Option<Instant>,
}

impl Poll {
    /// A loop of `attempts` checks, `interval` apart
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts,
            interval,
            deadline: None,
        }
    }

    /// Stop at `deadline` even if attempts remain
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Image-appearance loop from `settings`
    pub fn image(settings: &Settings) -> Self {
        Self::new(settings.image_wait_attempts, settings.image_wait_interval)
            .with_deadline(settings.deadline)
    }

    /// Container readiness loop from `settings`
    pub fn container(settings: &Settings) -> Self {
        Self::new(settings.container_ready_attempts, settings.container_ready_interval)
            .with_deadline(settings.deadline)
    }

    /// Remote readiness loop from `settings`
    pub fn remote(settings: &Settings) -> Self {
        Self::new(settings.remote_poll_attempts, settings.remote_poll_interval)
            .with_deadline(settings.deadline)
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Run `check` until it yields a value
    ///
    /// `Ok(None)` means not yet; an error ends the loop immediately.
    pub async fn until<T, F, Fut>(&self, what: &str, mut check: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        for attempt in 1..=self.attempts {
            if self.expired() {
                return Err(Error::internal(format!(
                    "deadline passed while waiting for {what}"
                )));
            }
            if let Some(value) = check(attempt).await? {
                return Ok(value);
            }
            debug!("Waiting for {} ({}/{})", what, attempt, self.attempts);
            if attempt < self.attempts {
                Timer::after(self.interval).await;
            }
        }
        Err(Error::internal(format!(
            "timed out waiting for {what} after {} attempts",
            self.attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[smol_potat::test]
    async fn test_returns_first_value() {
        let calls = Cell::new(0);
        let value = Poll::new(5, Duration::from_millis(1))
            .until("value", |attempt| {
                calls.set(calls.get() + 1);
                async move { Ok((attempt == 3).then_some(attempt)) }
            })
            .await
            .unwrap();
        assert_eq!(value, 3);
        assert_eq!(calls.get(), 3);
    }

    #[smol_potat::test]
    async fn test_exhausts_attempts() {
        let calls = Cell::new(0);
        let err = Poll::new(4, Duration::from_millis(1))
            .until("nothing", |_| {
                calls.set(calls.get() + 1);
                async { Ok::<Option<()>, Error>(None) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.get(), 4);
        assert!(err.to_string().contains("timed out waiting for nothing"));
    }

    #[smol_potat::test]
    async fn test_error_stops_loop() {
        let err = Poll::new(10, Duration::from_millis(1))
            .until("failure", |_| async {
                Err::<Option<()>, _>(Error::Input("bad".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Input(_)));
    }

    #[smol_potat::test]
    async fn test_past_deadline_fails_fast() {
        let err = Poll::new(10, Duration::from_secs(60))
            .with_deadline(Some(Instant::now()))
            .until("anything", |_| async { Ok::<Option<()>, Error>(None) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("deadline"));
    }
}
