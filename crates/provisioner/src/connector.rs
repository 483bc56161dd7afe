//! Connector executors

use crate::controlplane::ControllerAccess;
use crate::error::{Error, Result};
use crate::executor::{Executor, Outcome, ResourceKind};
use crate::local::{layout, LocalContainers};
use crate::remote::scripts::connector_plan;
use crate::remote::{run_until, RemoteHost, STARTING};
use crate::settings::Settings;
use crate::wait::Poll;
use async_trait::async_trait;
use command_executor::Launcher;
use controller_client::ConnectorRequest;
use regex::Regex;
use resource_store::{Connector, Ssh};
use tracing::{debug, info};

/// Service manager output once the connector runs
pub const CONNECTOR_RUNNING: &str = r"Active:\s*active \(running\)|\bis running\b";

/// Line asking the service manager about the connector
const CONNECTOR_STATUS: &str = "sudo service iofog-connector status";

/// Poll the service manager until the connector daemon runs
///
/// `service status` exits 3 while the unit is activating or inactive; those
/// exits count as "not yet".
async fn wait_running<L: Launcher + ?Sized>(launcher: &L, poll: Poll) -> Result<()> {
    let running = Regex::new(CONNECTOR_RUNNING)
        .map_err(|e| Error::internal(format!("bad readiness pattern: {e}")))?;
    run_until(launcher, poll, &running, CONNECTOR_STATUS, STARTING).await?;
    Ok(())
}

fn remote_ssh(connector: &Connector) -> Result<&Ssh> {
    connector.ssh.as_ref().ok_or_else(|| {
        Error::input(format!("connector {} needs SSH details", connector.name))
    })
}

fn reject_kubernetes(connector: &Connector) -> Result<()> {
    if connector.kube_config.is_some() {
        return Err(Error::input(format!(
            "connector {}: connectors in a cluster are managed by the control plane",
            connector.name
        )));
    }
    Ok(())
}

/// Deploys a connector and registers it with the Controller
pub struct DeployConnectorExecutor {
    connector: Connector,
    access: ControllerAccess,
    local: bool,
    settings: Settings,
}

impl DeployConnectorExecutor {
    /// Executor deploying `connector` into a container when `local`, else over SSH
    pub fn new(connector: Connector, access: ControllerAccess, local: bool, settings: Settings) -> Self {
        Self {
            connector,
            access,
            local,
            settings,
        }
    }

    async fn deploy_local(&self) -> Result<String> {
        let containers = LocalContainers::connect(self.settings.clone())?;
        let image = self
            .connector
            .container
            .as_ref()
            .map(|c| c.image.as_str())
            .unwrap_or_default();
        containers.deploy_container(&layout::connector(image)).await?;
        containers.get_container_ip(layout::CONNECTOR_CONTAINER).await
    }

    async fn deploy_remote(&self) -> Result<String> {
        let ssh = remote_ssh(&self.connector)?;
        let plan = connector_plan(&self.connector.package.clone().unwrap_or_default());

        let session = RemoteHost::new(&self.connector.host, ssh, self.settings.clone())
            .connect()
            .await?;
        let installed = async {
            session.install(&plan).await?;
            wait_running(session.launcher(), session.poll()).await
        }
        .await;
        session.close_with(installed).await?;
        Ok(self.connector.host.clone())
    }
}

#[async_trait]
impl Executor for DeployConnectorExecutor {
    async fn execute(&self) -> Result<Outcome> {
        reject_kubernetes(&self.connector)?;
        let address = if self.local {
            self.deploy_local().await?
        } else {
            self.deploy_remote().await?
        };

        let request = ConnectorRequest {
            name: self.connector.name.clone(),
            public_ip: address.clone(),
            domain: address,
            dev_mode: true,
        };
        match self.access.client().await?.register_connector(&request).await {
            Ok(()) => info!("Registered connector {}", self.connector.name),
            Err(e) if e.is_conflict() => {
                debug!("Connector {} already registered", self.connector.name)
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Outcome::Connector(self.connector.clone()))
    }

    fn name(&self) -> &str {
        &self.connector.name
    }
}

/// Unregisters a connector and removes it from its host
pub struct DeleteConnectorExecutor {
    connector: Connector,
    access: Option<ControllerAccess>,
    local: bool,
    settings: Settings,
}

impl DeleteConnectorExecutor {
    /// Executor deleting `connector`
    pub fn new(
        connector: Connector,
        access: Option<ControllerAccess>,
        local: bool,
        settings: Settings,
    ) -> Self {
        Self {
            connector,
            access,
            local,
            settings,
        }
    }
}

#[async_trait]
impl Executor for DeleteConnectorExecutor {
    async fn execute(&self) -> Result<Outcome> {
        let name = &self.connector.name;
        let public_ip = if self.local {
            let containers = LocalContainers::connect(self.settings.clone())?;
            let ip = match containers.get_container_ip(layout::CONNECTOR_CONTAINER).await {
                Ok(ip) => Some(ip),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            };
            containers.clean_container(layout::CONNECTOR_CONTAINER).await?;
            ip
        } else {
            reject_kubernetes(&self.connector)?;
            let ssh = remote_ssh(&self.connector)?;
            let plan = connector_plan(&self.connector.package.clone().unwrap_or_default());
            let session = RemoteHost::new(&self.connector.host, ssh, self.settings.clone())
                .connect()
                .await?;
            let removed = session.uninstall(&plan).await;
            session.close_with(removed).await?;
            Some(self.connector.host.clone())
        };

        if let (Some(access), Some(ip)) = (&self.access, public_ip) {
            match access.client().await?.delete_connector(&ip).await {
                Ok(()) => info!("Unregistered connector {}", name),
                Err(e) if e.is_not_found() => debug!("Connector {} was not registered", name),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Outcome::Removed {
            kind: ResourceKind::Connector,
            name: name.clone(),
        })
    }

    fn name(&self) -> &str {
        &self.connector.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use command_executor::{Command, Output};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers `service status` from a queue, repeating the last reply
    struct ServiceStatus {
        replies: Mutex<VecDeque<Output>>,
        calls: Mutex<u32>,
    }

    impl ServiceStatus {
        fn new(replies: Vec<Output>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl Launcher for ServiceStatus {
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

    fn connector() -> Connector {
        Connector {
            name: "c1".to_string(),
            host: "10.0.0.5".to_string(),
            ssh: None,
            kube_config: None,
            container: None,
            package: None,
            created: Utc::now(),
        }
    }

    #[test]
    fn test_cluster_connectors_are_rejected() {
        let mut c = connector();
        assert!(reject_kubernetes(&c).is_ok());
        c.kube_config = Some("/home/me/.kube/config".into());
        assert!(matches!(reject_kubernetes(&c), Err(Error::Input(_))));
    }

    #[test]
    fn test_remote_needs_ssh() {
        assert!(matches!(remote_ssh(&connector()), Err(Error::Input(_))));
    }

    #[test]
    fn test_running_pattern() {
        let running = Regex::new(CONNECTOR_RUNNING).unwrap();
        assert!(running.is_match("   Active: active (running) since Tue 2026-10-13"));
        assert!(running.is_match("iofog-connector is running"));
        assert!(!running.is_match("   Active: inactive (dead)"));
        assert!(!running.is_match("   Active: activating (start) since Tue"));
        assert!(!running.is_match("iofog-connector is not running"));
        assert!(!running.is_match("iofog-connector is stopped"));
    }

    #[smol_potat::test]
    async fn test_waits_through_activating() {
        let launcher = ServiceStatus::new(vec![
            Output::new(3, "   Active: activating (start) since Tue", ""),
            Output::new(3, "   Active: inactive (dead)", ""),
            Output::new(0, "   Active: active (running) since Tue", ""),
        ]);
        wait_running(&launcher, Poll::new(10, Duration::from_millis(1)))
            .await
            .unwrap();
        assert_eq!(*launcher.calls.lock().unwrap(), 3);
    }

    #[smol_potat::test]
    async fn test_dead_connector_times_out() {
        let launcher = ServiceStatus::new(vec![Output::new(3, "   Active: inactive (dead)", "")]);
        let err = wait_running(&launcher, Poll::new(4, Duration::from_millis(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(*launcher.calls.lock().unwrap(), 4);
    }
}
