//! Local process execution backend

use async_process::Stdio;
use async_trait::async_trait;
use futures_lite::io::AsyncWriteExt;
use tracing::debug;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::launcher::Launcher;
use crate::process::Output;

/// Launcher for executing processes locally
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalLauncher;

#[async_trait]
impl Launcher for LocalLauncher {
    async fn output(&self, mut command: Command) -> Result<Output> {
        debug!("Running locally: {}", command);

        let stdin_bytes = command.take_stdin();
        let mut async_cmd = command.prepare();
        async_cmd.stdout(Stdio::piped());
        async_cmd.stderr(Stdio::piped());
        async_cmd.stdin(if stdin_bytes.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = async_cmd.spawn().map_err(|e| {
            Error::spawn_failed(format!(
                "Failed to spawn {}: {}",
                command.get_program().to_string_lossy(),
                e
            ))
        })?;

        // Feed stdin while the child drains its pipes so neither side blocks
        let stdin = child.stdin.take();
        let feed = async move {
            if let (Some(mut pipe), Some(bytes)) = (stdin, stdin_bytes) {
                pipe.write_all(&bytes).await?;
                pipe.close().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, output) = futures::join!(feed, child.output());
        let output = output?;
        fed?;

        Ok(Output {
            status: output.status.into(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[smol_potat::test]
    async fn test_captures_stdout_and_exit_code() {
        let out = LocalLauncher
            .output(Command::shell("echo hello; echo oops >&2; exit 3"))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.status.code, Some(3));
    }

    #[smol_potat::test]
    async fn test_stdin_is_fed() {
        let mut cmd = Command::new("cat");
        cmd.stdin_bytes("piped through");
        let out = LocalLauncher.run(cmd).await.unwrap();
        assert_eq!(out.stdout, "piped through");
    }

    #[smol_potat::test]
    async fn test_run_classifies_failure() {
        let err = LocalLauncher
            .run(Command::shell("echo 'Agent is not provisioned' >&2; exit 1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(FailureKind::NotProvisioned));
    }

    #[smol_potat::test]
    async fn test_missing_program_is_spawn_failure() {
        let err = LocalLauncher
            .output(Command::new("definitely-not-a-real-binary-xyz"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SpawnFailed { .. }));
    }
}
