//! Engine tunables

use std::time::{Duration, Instant};

/// Bounds for the polling loops the backends run
#[derive(Debug, Clone)]
pub struct Settings {
    /// Checks of the local image list after a pull
    pub image_wait_attempts: u32,
    /// Pause between image list checks
    pub image_wait_interval: Duration,
    /// Checks of a container's readiness command
    pub container_ready_attempts: u32,
    /// Pause between readiness checks
    pub container_ready_interval: Duration,
    /// Iterations of a remote `run_until`
    pub remote_poll_attempts: u32,
    /// Pause between remote polls
    pub remote_poll_interval: Duration,
    /// Overall bound on Kubernetes control plane readiness
    pub kube_ready_timeout: Duration,
    /// Pause between Kubernetes status polls
    pub kube_poll_interval: Duration,
    /// Wall-clock deadline for the whole command, if any
    pub deadline: Option<Instant>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            image_wait_attempts: 18,
            image_wait_interval: Duration::from_secs(10),
            container_ready_attempts: 60,
            container_ready_interval: Duration::from_secs(2),
            remote_poll_attempts: 60,
            remote_poll_interval: Duration::from_secs(5),
            kube_ready_timeout: Duration::from_secs(240),
            kube_poll_interval: Duration::from_secs(2),
            deadline: None,
        }
    }
}

impl Settings {
    /// Impose an overall deadline `timeout` from now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Kubernetes readiness bound, clipped to the overall deadline
    pub fn kube_timeout(&self) -> Duration {
        match self.deadline {
            Some(deadline) => self
                .kube_ready_timeout
                .min(deadline.saturating_duration_since(Instant::now())),
            None => self.kube_ready_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_clips_kube_timeout() {
        let settings = Settings::default();
        assert_eq!(settings.kube_timeout(), Duration::from_secs(240));

        let settings = Settings::default().with_timeout(Duration::from_secs(30));
        assert!(settings.kube_timeout() <= Duration::from_secs(30));
    }
}
