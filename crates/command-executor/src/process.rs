//! Process exit status and captured output

use crate::error::{Error, FailureKind, Result};

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
}

impl ExitStatus {
    /// Returns true if the process exited successfully (code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Output captured from a completed command
#[derive(Debug, Clone)]
pub struct Output {
    /// How the process exited
    pub status: ExitStatus,
    /// Captured stdout, lossily decoded
    pub stdout: String,
    /// Captured stderr, lossily decoded
    pub stderr: String,
}

impl Output {
    /// Build an output from raw parts
    pub fn new(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status: ExitStatus { code: Some(code) },
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the process exited successfully
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Turn a non-zero exit into [`Error::Failed`], classifying the failure
    pub fn check(self, command: &str) -> Result<Output> {
        if self.success() {
            return Ok(self);
        }
        let message = if self.stderr.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            self.stderr.trim().to_string()
        };
        Err(Error::Failed {
            command: command.to_string(),
            code: self.status.code,
            kind: FailureKind::classify(self.status.code, &message),
            stderr: message,
        })
    }
}
