//! Runtime-agnostic command execution library
//!
//! This crate runs commands either on the local machine or on a remote host
//! through the system `ssh` client. Both contexts sit behind the [`Launcher`]
//! trait so callers can swap one for the other, or for a scripted fake in tests.
//!
//! Failed commands are reported as [`Error::Failed`] carrying a typed
//! [`FailureKind`], so callers decide what is retryable without inspecting
//! error text themselves.

#![warn(missing_docs)]

pub mod backends;
pub mod command;
pub mod error;
pub mod launcher;
pub mod process;

pub use backends::local::LocalLauncher;
pub use backends::ssh::{SshConfig, SshLauncher, SshSession};
pub use command::{shell_escape, Command};
pub use error::{Error, FailureKind, Result};
pub use launcher::Launcher;
pub use process::{ExitStatus, Output};
