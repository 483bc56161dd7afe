//! SSH remote execution backend using CLI
//!
//! Commands are wrapped into an invocation of the system `ssh` client and
//! handed to an inner launcher. A [`SshSession`] keeps one authenticated
//! control-master connection open so a sequence of commands and file copies
//! reuses it instead of re-authenticating each time.

use async_trait::async_trait;
use futures_lite::io::{AsyncRead, AsyncReadExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::backends::local::LocalLauncher;
use crate::command::{Command, shell_escape};
use crate::error::{Error, Result};
use crate::launcher::Launcher;
use crate::process::Output;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// SSH connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    host: String,
    user: Option<String>,
    port: u16,
    identity_file: Option<PathBuf>,
    control_path: Option<PathBuf>,
    extra_args: Vec<String>,
}

impl SshConfig {
    /// Create a new SSH configuration for the given host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: DEFAULT_SSH_PORT,
            identity_file: None,
            control_path: None,
            extra_args: Vec::new(),
        }
    }

    /// Set the SSH user
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the SSH port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the identity file (private key)
    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// Add an extra SSH argument
    pub fn with_extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    fn with_control_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.control_path = Some(path.into());
        self
    }

    /// The target host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The SSH port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The identity file, if any
    pub fn identity_file(&self) -> Option<&Path> {
        self.identity_file.as_deref()
    }

    /// `user@host` if a user is set, else the host
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    /// Common `ssh` options, without the destination
    fn base_command(&self) -> Command {
        let mut ssh = Command::new("ssh");
        ssh.args(["-o", "BatchMode=yes"])
            .args(["-o", "StrictHostKeyChecking=no"])
            .args(["-o", "UserKnownHostsFile=/dev/null"])
            .args(["-o", "LogLevel=ERROR"])
            .args(["-o", "ConnectTimeout=15"])
            .arg("-p")
            .arg(self.port.to_string());
        if let Some(identity) = &self.identity_file {
            ssh.arg("-i").arg(identity);
        }
        if let Some(control) = &self.control_path {
            ssh.arg("-o").arg(format!("ControlPath={}", control.display()));
        }
        for arg in &self.extra_args {
            ssh.arg(arg);
        }
        ssh
    }
}

/// SSH launcher that wraps another launcher for remote execution
#[derive(Debug, Clone)]
pub struct SshLauncher<L = LocalLauncher> {
    inner: L,
    config: SshConfig,
}

impl<L> SshLauncher<L> {
    /// Create a new SSH launcher wrapping the given inner launcher
    pub fn new(inner: L, config: SshConfig) -> Self {
        Self { inner, config }
    }

    /// The connection configuration
    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Wrap `command` into the `ssh` invocation that runs it remotely
    pub fn wrap(&self, mut command: Command) -> Command {
        let mut ssh = self.config.base_command();
        ssh.arg(self.config.destination());
        ssh.arg(command.to_shell_string());
        if let Some(stdin) = command.take_stdin() {
            ssh.stdin_bytes(stdin);
        }
        ssh
    }
}

impl SshLauncher<LocalLauncher> {
    /// Convenience constructor for SSH wrapping LocalLauncher
    pub fn to_host(config: SshConfig) -> Self {
        Self::new(LocalLauncher, config)
    }
}

impl<L: Launcher + Clone> SshLauncher<L> {
    /// Open a control-master connection and return a session multiplexing over it.
    ///
    /// The key file is checked up front so a typo surfaces as
    /// [`Error::SshKeyNotFound`] rather than an opaque authentication failure.
    pub async fn connect(&self) -> Result<SshSession<L>> {
        if let Some(key) = &self.config.identity_file {
            if !key.exists() {
                return Err(Error::SshKeyNotFound {
                    path: key.display().to_string(),
                });
            }
        }

        let id = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
        let control_path =
            std::env::temp_dir().join(format!("edgectl-ssh-{}-{}", std::process::id(), id));

        let config = self.config.clone().with_control_path(&control_path);
        let mut master = config.base_command();
        master
            .args(["-o", "ControlMaster=yes"])
            .args(["-o", "ControlPersist=yes"])
            .arg("-f")
            .arg("-N")
            .arg(config.destination());

        info!("Connecting to {} over SSH", config.destination());
        let line = master.to_shell_string();
        self.inner.output(master).await?.check(&line)?;

        Ok(SshSession {
            launcher: SshLauncher::new(self.inner.clone(), config),
            control_path,
            open: true,
        })
    }
}

#[async_trait]
impl<L: Launcher> Launcher for SshLauncher<L> {
    async fn output(&self, command: Command) -> Result<Output> {
        debug!("Running on {}: {}", self.config.destination(), command);
        self.inner.output(self.wrap(command)).await
    }
}

/// An open SSH connection shared by the commands run through it.
///
/// Call [`SshSession::disconnect`] when done. If the session is dropped
/// without that, the control master is told to exit from `Drop`.
pub struct SshSession<L = LocalLauncher> {
    launcher: SshLauncher<L>,
    control_path: PathBuf,
    open: bool,
}

impl<L: Launcher> SshSession<L> {
    /// The launcher that multiplexes over this session
    pub fn launcher(&self) -> &SshLauncher<L> {
        &self.launcher
    }

    /// Run a command, capturing output whatever the exit code
    pub async fn output(&self, command: Command) -> Result<Output> {
        self.launcher.output(command).await
    }

    /// Run a command, failing on a non-zero exit
    pub async fn run(&self, command: Command) -> Result<Output> {
        self.launcher.run(command).await
    }

    /// Stream `reader` into `<dest_dir>/<filename>` on the remote host with `mode`.
    ///
    /// `size` is the number of bytes the caller expects the reader to yield;
    /// a mismatch fails before anything is written remotely.
    pub async fn copy_to<R>(
        &self,
        mut reader: R,
        dest_dir: &str,
        filename: &str,
        mode: u32,
        size: u64,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut content = Vec::with_capacity(size as usize);
        reader.read_to_end(&mut content).await?;
        if content.len() as u64 != size {
            return Err(Error::TransferSize {
                file: filename.to_string(),
                expected: size,
                actual: content.len() as u64,
            });
        }

        let dest = format!("{}/{}", dest_dir.trim_end_matches('/'), filename);
        let script = format!(
            "mkdir -p {dir} && cat > {dest} && chmod {mode:o} {dest}",
            dir = shell_escape(dest_dir),
            dest = shell_escape(&dest),
            mode = mode,
        );
        debug!("Copying {} bytes to {}", size, dest);

        let mut cmd = Command::shell(script);
        cmd.stdin_bytes(content);
        self.run(cmd).await?;
        Ok(())
    }

    /// Close the control-master connection
    pub async fn disconnect(mut self) -> Result<()> {
        self.open = false;
        let mut exit = self.launcher.config.base_command();
        exit.args(["-O", "exit"]).arg(self.launcher.config.destination());
        let output = self.launcher.inner.output(exit).await?;
        if !output.success() {
            debug!(
                "Control master for {} already gone: {}",
                self.launcher.config.destination(),
                output.stderr.trim()
            );
        }
        Ok(())
    }
}

impl<L> Drop for SshSession<L> {
    fn drop(&mut self) {
        if !self.open || !self.control_path.exists() {
            return;
        }
        let destination = self.launcher.config.destination();
        let result = std::process::Command::new("ssh")
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .args(["-O", "exit"])
            .arg(&destination)
            .output();
        if let Err(e) = result {
            warn!("Failed to close SSH session to {}: {}", destination, e);
        }
    }
}
