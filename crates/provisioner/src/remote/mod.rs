//! Remote backend: install and manage components over SSH

pub mod scripts;

use crate::error::{Error, Result};
use crate::settings::Settings;
use crate::wait::Poll;
use command_executor::{
    Command, FailureKind, Launcher, LocalLauncher, Output, SshConfig, SshLauncher, SshSession,
};
use regex::Regex;
use resource_store::Ssh;
use scripts::InstallPlan;
use tracing::{debug, info, warn};

pub use scripts::{Component, ScriptFile};

/// Failures `run_until` retries while a service comes up
pub const TRANSIENT: &[FailureKind] = &[
    FailureKind::ConnectionRefused,
    FailureKind::Timeout,
    FailureKind::HostUnreachable,
];

/// Failures a readiness check retries while a freshly installed daemon starts
pub const STARTING: &[FailureKind] = &[
    FailureKind::ConnectionRefused,
    FailureKind::Timeout,
    FailureKind::HostUnreachable,
    FailureKind::NotRunning,
];

/// A host reachable over SSH
#[derive(Debug, Clone)]
pub struct RemoteHost<L = LocalLauncher> {
    launcher: SshLauncher<L>,
    settings: Settings,
}

impl RemoteHost<LocalLauncher> {
    /// Host at `host` using the stored SSH details
    pub fn new(host: &str, ssh: &Ssh, settings: Settings) -> Self {
        Self::with_launcher(LocalLauncher, ssh_config(host, ssh), settings)
    }
}

/// SSH connection config for a stored host
pub fn ssh_config(host: &str, ssh: &Ssh) -> SshConfig {
    SshConfig::new(host)
        .with_user(&ssh.user)
        .with_port(ssh.port)
        .with_identity_file(&ssh.key_file)
}

impl<L: Launcher + Clone> RemoteHost<L> {
    /// Host driven through a custom launcher
    pub fn with_launcher(inner: L, config: SshConfig, settings: Settings) -> Self {
        Self {
            launcher: SshLauncher::new(inner, config),
            settings,
        }
    }

    /// Host address
    pub fn host(&self) -> &str {
        self.launcher.config().host()
    }

    /// Open a session; close it with [`RemoteSession::disconnect`]
    pub async fn connect(&self) -> Result<RemoteSession<L>> {
        let session = self.launcher.connect().await?;
        Ok(RemoteSession {
            session,
            host: self.host().to_string(),
            poll: Poll::remote(&self.settings),
        })
    }
}

/// An open SSH session to one host
pub struct RemoteSession<L = LocalLauncher> {
    session: SshSession<L>,
    host: String,
    poll: Poll,
}

impl<L: Launcher> RemoteSession<L> {
    /// Host address
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Launcher multiplexed over this session
    pub fn launcher(&self) -> &SshLauncher<L> {
        self.session.launcher()
    }

    /// Readiness loop bounds for this host
    pub fn poll(&self) -> Poll {
        self.poll
    }

    /// Run a shell line, failing on a non-zero exit
    pub async fn run(&self, line: &str) -> Result<Output> {
        Ok(self.session.run(Command::shell(line)).await?)
    }

    /// Run a shell line, tolerating failures of the given kinds
    pub async fn run_tolerating(&self, line: &str, tolerated: &[FailureKind]) -> Result<()> {
        match self.session.run(Command::shell(line)).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_any_of(tolerated) => {
                debug!("Ignoring on {}: {}", self.host, e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Copy a file onto the host
    pub async fn copy_to(&self, file: &ScriptFile, dest_dir: &str, mode: u32) -> Result<()> {
        self.session
            .copy_to(
                &file.body[..],
                dest_dir,
                &file.name,
                mode,
                file.body.len() as u64,
            )
            .await?;
        Ok(())
    }

    /// Stage a plan's scripts into its component directory
    pub async fn stage(&self, plan: &InstallPlan) -> Result<()> {
        let dir = plan.component.remote_dir();
        info!("Staging {} scripts on {}", plan.files.len(), self.host);
        for file in &plan.files {
            self.copy_to(file, &dir, 0o755).await?;
        }
        Ok(())
    }

    /// Stage a plan and run its install steps in order, stopping at the first failure
    pub async fn install(&self, plan: &InstallPlan) -> Result<()> {
        self.stage(plan).await?;
        for (description, line) in &plan.steps {
            info!("{}: {}", self.host, description);
            self.session
                .run(Command::shell(line))
                .await
                .map_err(|e| step_failed(&self.host, description, e))?;
        }
        Ok(())
    }

    /// Run a plan's uninstall line
    pub async fn uninstall(&self, plan: &InstallPlan) -> Result<()> {
        self.stage(plan).await?;
        info!("{}: uninstall {}", self.host, plan.component.as_str());
        self.session
            .run(Command::shell(&plan.uninstall))
            .await
            .map_err(|e| step_failed(&self.host, "uninstall", e))?;
        Ok(())
    }

    /// Repeat `line` until its stdout matches `pattern`
    pub async fn run_until(
        &self,
        pattern: &Regex,
        line: &str,
        retryable: &[FailureKind],
    ) -> Result<Output> {
        run_until(self.session.launcher(), self.poll, pattern, line, retryable).await
    }

    /// Close the session
    pub async fn disconnect(self) -> Result<()> {
        Ok(self.session.disconnect().await?)
    }

    /// Close the session and hand back `result` unchanged
    ///
    /// A failure to close is logged, never reported in place of `result`.
    pub async fn close_with<T>(self, result: Result<T>) -> Result<T> {
        let host = self.host.clone();
        if let Err(e) = self.disconnect().await {
            warn!("Closing the session to {} failed: {}", host, e);
        }
        result
    }
}

/// Repeat `line` through `launcher` until its stdout matches `pattern`
///
/// Failures of a kind listed in `retryable` count as "not yet"; any other
/// failure ends the wait.
pub async fn run_until<L: Launcher + ?Sized>(
    launcher: &L,
    poll: Poll,
    pattern: &Regex,
    line: &str,
    retryable: &[FailureKind],
) -> Result<Output> {
    poll.until(&format!("`{line}` to match {pattern}"), |attempt| async move {
        match launcher.run(Command::shell(line)).await {
            Ok(out) if pattern.is_match(&out.stdout) => Ok(Some(out)),
            Ok(out) => {
                debug!("Attempt {}: no match in {:?}", attempt, out.stdout.trim());
                Ok(None)
            }
            Err(e) if e.is_any_of(retryable) => {
                debug!("Attempt {}: retrying after {}", attempt, e);
                Ok(None)
            }
            Err(e) => Err(Error::from(e)),
        }
    })
    .await
}

fn step_failed(host: &str, step: &str, err: command_executor::Error) -> Error {
    match err {
        command_executor::Error::Failed { stderr, code, .. } => {
            warn!("{} failed on {} with exit code {:?}", step, host, code);
            Error::internal(format!("{step} failed on {host}: {}", stderr.trim()))
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Replays canned outputs, repeating the last one forever
    #[derive(Clone)]
    struct Scripted {
        replies: Arc<Mutex<VecDeque<Output>>>,
        calls: Arc<Mutex<u32>>,
    }

    impl Scripted {
        fn new(replies: Vec<Output>) -> Self {
            Self {
                replies: Arc::new(Mutex::new(replies.into())),
                calls: Arc::new(Mutex::new(0)),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Launcher for Scripted {
        async fn output(&self, _command: Command) -> command_executor::Result<Output> {
            *self.calls.lock().unwrap() += 1;
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                Ok(replies.pop_front().unwrap())
            } else {
                Ok(replies.front().cloned().unwrap())
            }
        }
    }

    fn status(word: &str) -> Output {
        Output::new(0, format!("{{\"status\":\"{word}\"}}"), "")
    }

    fn online() -> Regex {
        Regex::new(r#""status"\s*:\s*"online""#).unwrap()
    }

    fn fast_poll(attempts: u32) -> Poll {
        Poll::new(attempts, Duration::from_millis(1))
    }

    #[smol_potat::test]
    async fn test_run_until_succeeds_once_status_flips() {
        let launcher = Scripted::new(vec![
            status("starting"),
            status("starting"),
            status("online"),
        ]);
        let out = run_until(&launcher, fast_poll(60), &online(), "curl status", TRANSIENT)
            .await
            .unwrap();
        assert!(out.stdout.contains("online"));
        assert_eq!(launcher.calls(), 3);
    }

    #[smol_potat::test]
    async fn test_run_until_gives_up_after_bound() {
        let launcher = Scripted::new(vec![status("starting")]);
        let err = run_until(&launcher, fast_poll(60), &online(), "curl status", TRANSIENT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(launcher.calls(), 60);
    }

    #[smol_potat::test]
    async fn test_run_until_retries_transient_failures() {
        let launcher = Scripted::new(vec![
            Output::new(7, "", "curl: (7) Failed to connect to localhost port 51121: Connection refused"),
            status("online"),
        ]);
        run_until(&launcher, fast_poll(5), &online(), "curl status", TRANSIENT)
            .await
            .unwrap();
        assert_eq!(launcher.calls(), 2);
    }

    #[smol_potat::test]
    async fn test_run_until_stops_on_other_failures() {
        let launcher = Scripted::new(vec![
            Output::new(1, "", "sudo: a password is required"),
            status("online"),
        ]);
        let err = run_until(&launcher, fast_poll(5), &online(), "curl status", TRANSIENT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Command(_)));
        assert_eq!(launcher.calls(), 1);
    }

    #[smol_potat::test]
    async fn test_run_until_waits_for_a_starting_daemon() {
        let launcher = Scripted::new(vec![
            Output::new(1, "", "iofog-agent is not running."),
            status("online"),
        ]);
        run_until(&launcher, fast_poll(5), &online(), "iofog-agent status", STARTING)
            .await
            .unwrap();
        assert_eq!(launcher.calls(), 2);

        let launcher = Scripted::new(vec![
            Output::new(1, "", "iofog-agent is not running."),
            status("online"),
        ]);
        let err = run_until(&launcher, fast_poll(5), &online(), "iofog-agent status", TRANSIENT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Command(_)));
    }

    /// Fails every install line, and cannot even spawn the control-master exit
    #[derive(Clone)]
    struct BrokenHost;

    #[async_trait]
    impl Launcher for BrokenHost {
        async fn output(&self, command: Command) -> command_executor::Result<Output> {
            let line = command.to_shell_string();
            if line.contains("-O exit") {
                Err(command_executor::Error::spawn_failed("ssh vanished"))
            } else if line.contains("install.sh") {
                Ok(Output::new(1, "", "unsupported distribution"))
            } else {
                Ok(Output::new(0, "", ""))
            }
        }
    }

    #[smol_potat::test]
    async fn test_close_keeps_the_primary_error() {
        let host = RemoteHost::with_launcher(
            BrokenHost,
            SshConfig::new("10.0.0.9"),
            Settings::default(),
        );
        let session = host.connect().await.unwrap();
        let installed = session.run("sh install.sh").await.map(|_| ());
        let err = session.close_with(installed).await.unwrap_err();
        assert!(err.to_string().contains("unsupported distribution"), "{err}");

        let session = host.connect().await.unwrap();
        session.close_with(Ok(())).await.unwrap();
    }

    #[test]
    fn test_step_failure_surfaces_stderr() {
        let err = step_failed(
            "10.0.0.7",
            "install dependencies",
            command_executor::Error::Failed {
                command: "install_deps.sh".to_string(),
                code: Some(1),
                kind: FailureKind::Remote,
                stderr: "unsupported distribution\n".to_string(),
            },
        );
        assert_eq!(
            err.to_string(),
            "install dependencies failed on 10.0.0.7: unsupported distribution"
        );
    }
}
