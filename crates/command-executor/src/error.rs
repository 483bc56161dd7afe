//! Error types for command execution

use thiserror::Error;

/// Why a command failed, as far as the caller needs to know.
///
/// Classification happens once, here, from the exit code and stderr of the
/// failed process. Callers match on the kind instead of on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The remote end refused the connection (service still coming up)
    ConnectionRefused,
    /// A connection or operation timed out
    Timeout,
    /// No route to the host, or the name did not resolve
    HostUnreachable,
    /// SSH rejected the credentials
    AuthenticationFailed,
    /// The agent on the host is not provisioned with a Controller
    NotProvisioned,
    /// The service is installed but not running yet
    NotRunning,
    /// The object being created already exists
    AlreadyExists,
    /// The object or command being addressed does not exist
    NotFound,
    /// Any other non-zero exit
    Remote,
}

impl FailureKind {
    /// Classify a failure from the exit code and the captured output.
    ///
    /// `ssh` reserves exit code 255 for its own failures, which narrows the
    /// connection-level kinds to that code.
    pub fn classify(code: Option<i32>, output: &str) -> Self {
        let text = output.to_ascii_lowercase();
        let ssh_level = code == Some(255);

        if text.contains("connection refused") || text.contains("failed to connect") {
            return FailureKind::ConnectionRefused;
        }
        if text.contains("timed out") || text.contains("timeout") {
            return FailureKind::Timeout;
        }
        if ssh_level
            && (text.contains("no route to host")
                || text.contains("could not resolve hostname")
                || text.contains("network is unreachable"))
        {
            return FailureKind::HostUnreachable;
        }
        if ssh_level && text.contains("permission denied") {
            return FailureKind::AuthenticationFailed;
        }
        if text.contains("not provisioned") {
            return FailureKind::NotProvisioned;
        }
        if text.contains("already exists") {
            return FailureKind::AlreadyExists;
        }
        if text.contains("not running")
            || text.contains("activating")
            || text.contains("inactive")
            || text.contains("is stopped")
        {
            return FailureKind::NotRunning;
        }
        if text.contains("not found") || text.contains("no such file") {
            return FailureKind::NotFound;
        }
        FailureKind::Remote
    }

    /// Whether this kind is a connection-level condition worth retrying
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            FailureKind::ConnectionRefused | FailureKind::Timeout | FailureKind::HostUnreachable
        )
    }
}

/// Unified error type for command execution
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to spawn a process
    #[error("failed to spawn process: {reason}")]
    SpawnFailed {
        /// The reason for the spawn failure
        reason: String,
    },

    /// The command ran and exited non-zero
    #[error("command `{command}` failed with exit code {code:?}: {stderr}")]
    Failed {
        /// The command line, for context
        command: String,
        /// Exit code if the process exited normally
        code: Option<i32>,
        /// Classified failure
        kind: FailureKind,
        /// Captured stderr (or stdout when stderr was empty)
        stderr: String,
    },

    /// SSH key not found
    #[error("SSH key not found: {path}")]
    SshKeyNotFound {
        /// The path where the SSH key was expected to be found
        path: String,
    },

    /// A file transfer did not move the expected number of bytes
    #[error("transfer of {file} failed: expected {expected} bytes, read {actual}")]
    TransferSize {
        /// Destination file name
        file: String,
        /// Declared size
        expected: u64,
        /// Bytes actually read from the source
        actual: u64,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    /// The classified failure kind, if the command ran and failed
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Error::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether the error is of one of the given kinds
    pub fn is_any_of(&self, kinds: &[FailureKind]) -> bool {
        self.kind().is_some_and(|k| kinds.contains(&k))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
