pub mod attach;
pub mod configure;
pub mod create;
pub mod delete;
pub mod deploy;
pub mod get;
pub mod relocate;
pub mod rename;
pub mod upgrade;

use anyhow::{bail, Result};
use clap::Args;
use comfy_table::{Cell, Color, Table};
use provisioner::{BackendFactory, ConnectionOptions, Lifecycle, Report, Settings};
use resource_store::{Package, Store};
use std::path::PathBuf;

/// What every command handler works with
pub struct Session<'a> {
    pub store: &'a Store,
    pub settings: Settings,
    pub namespace: String,
    factory: BackendFactory,
}

impl<'a> Session<'a> {
    pub fn new(store: &'a Store, settings: Settings, namespace: String) -> Self {
        let factory = BackendFactory::new(settings.clone());
        Self {
            store,
            settings,
            namespace,
            factory,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle<'_> {
        Lifecycle::new(self.store, &self.factory)
    }
}

/// How to reach the hosts a command deploys to
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// SSH login user
    #[arg(long)]
    pub ssh_user: Option<String>,

    /// SSH private key file
    #[arg(long)]
    pub ssh_key: Option<PathBuf>,

    /// SSH port
    #[arg(long)]
    pub ssh_port: Option<u16>,

    /// Kubeconfig of the target cluster
    #[arg(long)]
    pub kube_config: Option<PathBuf>,
}

impl ConnectionArgs {
    pub fn options_for(&self, host: Option<String>) -> ConnectionOptions {
        ConnectionOptions {
            host,
            ssh_user: self.ssh_user.clone(),
            ssh_key: self.ssh_key.clone(),
            ssh_port: self.ssh_port,
            kube_config: self.kube_config.clone(),
        }
    }
}

/// Package to install on remote hosts
#[derive(Args, Debug, Clone, Default)]
pub struct PackageArgs {
    /// Package version; latest when unset
    #[arg(long = "package-version")]
    pub version: Option<String>,

    /// Package repository
    #[arg(long = "package-repo")]
    pub repo: Option<String>,

    /// Token for a private repository
    #[arg(long = "package-token")]
    pub token: Option<String>,
}

impl PackageArgs {
    pub fn package(&self) -> Package {
        Package {
            version: self.version.clone().unwrap_or_default(),
            repo: self.repo.clone().unwrap_or_default(),
            token: self.token.clone().unwrap_or_default(),
        }
    }
}

/// Print what a parallel run did; fail if anything failed
pub fn summarize(report: &Report, action: &str) -> Result<()> {
    for (name, _) in &report.outcomes {
        println!("✓ {} {}", action, name);
    }
    if report.is_success() {
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["RESOURCE", "ERROR"]);
    for failure in &report.failures {
        table.add_row(vec![
            Cell::new(failure.executor.name()).fg(Color::Red),
            Cell::new(failure.error.to_string()),
        ]);
    }
    eprintln!("{}", table);

    let total = report.outcomes.len() + report.failures.len();
    bail!("{} of {} resources failed", report.failures.len(), total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_fine() {
        assert!(summarize(&Report::default(), "Deployed").is_ok());
    }

    #[test]
    fn test_package_defaults_to_empty() {
        let package = PackageArgs::default().package();
        assert_eq!(package, Package::default());

        let package = PackageArgs {
            version: Some("3.0.1".to_string()),
            ..Default::default()
        }
        .package();
        assert_eq!(package.version, "3.0.1");
    }
}
