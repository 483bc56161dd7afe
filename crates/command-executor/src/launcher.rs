//! Launcher trait for executing commands in different contexts

use crate::command::Command;
use crate::error::Result;
use crate::process::Output;
use async_trait::async_trait;

/// A launcher that can execute commands in a specific context
#[async_trait]
pub trait Launcher: Send + Sync + 'static {
    /// Run a command to completion and capture its output, whatever the exit code
    async fn output(&self, command: Command) -> Result<Output>;

    /// Run a command to completion, failing on a non-zero exit
    async fn run(&self, command: Command) -> Result<Output> {
        let line = command.to_shell_string();
        self.output(command).await?.check(&line)
    }
}

#[async_trait]
impl<L: Launcher + ?Sized> Launcher for std::sync::Arc<L> {
    async fn output(&self, command: Command) -> Result<Output> {
        (**self).output(command).await
    }
}
