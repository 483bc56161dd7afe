//! Backend implementations for different execution contexts
//!
//! [`local::LocalLauncher`] spawns processes on this machine;
//! [`ssh::SshLauncher`] wraps any launcher so its commands run on a remote host.

pub mod local;
pub mod ssh;
