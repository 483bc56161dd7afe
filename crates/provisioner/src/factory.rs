//! Backend selection and executor construction

use crate::agent::{AttachAgentExecutor, DeleteAgentExecutor, DeployAgentExecutor, DetachAgentExecutor};
use crate::connector::{DeleteConnectorExecutor, DeployConnectorExecutor};
use crate::controlplane::{
    ControllerAccess, DeleteControlPlaneExecutor, KubernetesControlPlaneExecutor,
    LocalControlPlaneExecutor, RemoteControlPlaneExecutor,
};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::settings::Settings;
use regex::Regex;
use resource_store::{Agent, ControlPlane, Connector, Ssh};
use std::path::PathBuf;
use tracing::debug;

/// Hosts that mean "this machine"
pub const LOOPBACK_PATTERN: &str = r"^(https?://)?(localhost|127\.0\.0\.1|0\.0\.0\.0)(:[0-9]+)?/?$";

/// Connection attributes of one resource, as the user gave them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Host name or address
    pub host: Option<String>,
    /// SSH login user
    pub ssh_user: Option<String>,
    /// SSH private key
    pub ssh_key: Option<PathBuf>,
    /// SSH port, 22 when unset
    pub ssh_port: Option<u16>,
    /// Kubeconfig of the target cluster
    pub kube_config: Option<PathBuf>,
}

/// Where a resource gets deployed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The local container engine
    Local,
    /// A cluster reached through this kubeconfig
    Kubernetes {
        /// Kubeconfig path
        kube_config: PathBuf,
    },
    /// A host reached over SSH
    Remote {
        /// Host name or address
        host: String,
        /// Login details
        ssh: Ssh,
    },
}

/// Whether `host` names this machine
pub fn is_loopback(host: &str) -> bool {
    Regex::new(LOOPBACK_PATTERN).is_ok_and(|re| re.is_match(host.trim()))
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Pick the backend for a resource
///
/// A loopback host wins, then a kubeconfig, then a complete set of SSH
/// details. Anything else is an input error naming what is missing.
pub fn select_target(options: &ConnectionOptions) -> Result<Target> {
    let host = present(&options.host);
    if host.is_some_and(is_loopback) {
        return Ok(Target::Local);
    }

    if let Some(kube_config) = options
        .kube_config
        .as_ref()
        .filter(|p| !p.as_os_str().is_empty())
    {
        return Ok(Target::Kubernetes {
            kube_config: kube_config.clone(),
        });
    }

    let user = present(&options.ssh_user);
    let key = options
        .ssh_key
        .as_ref()
        .filter(|p| !p.as_os_str().is_empty());
    match (host, user, key) {
        (Some(host), Some(user), Some(key)) => Ok(Target::Remote {
            host: host.to_string(),
            ssh: Ssh {
                user: user.to_string(),
                key_file: key.clone(),
                port: options.ssh_port.unwrap_or(22),
            },
        }),
        (host, user, key) => {
            let mut missing = Vec::new();
            if host.is_none() {
                missing.push("host");
            }
            if user.is_none() {
                missing.push("SSH user");
            }
            if key.is_none() {
                missing.push("SSH key");
            }
            Err(Error::input(format!(
                "missing {}; give a loopback host, a kubeconfig, or a host with SSH user and key",
                missing.join(", ")
            )))
        }
    }
}

impl ConnectionOptions {
    /// Options describing a stored agent
    pub fn from_agent(agent: &Agent) -> Self {
        match agent {
            Agent::Local(local) => Self {
                host: Some(local.host.clone()),
                ..Default::default()
            },
            Agent::Remote(remote) => Self {
                host: Some(remote.host.clone()),
                ssh_user: Some(remote.ssh.user.clone()),
                ssh_key: Some(remote.ssh.key_file.clone()),
                ssh_port: Some(remote.ssh.port),
                kube_config: None,
            },
        }
    }

    /// Options describing a stored connector
    pub fn from_connector(connector: &Connector) -> Self {
        Self {
            host: Some(connector.host.clone()),
            ssh_user: connector.ssh.as_ref().map(|s| s.user.clone()),
            ssh_key: connector.ssh.as_ref().map(|s| s.key_file.clone()),
            ssh_port: connector.ssh.as_ref().map(|s| s.port),
            kube_config: connector.kube_config.clone(),
        }
    }
}

fn check_agent(agent: &Agent) -> Result<()> {
    let target = select_target(&ConnectionOptions::from_agent(agent))?;
    match (agent, target) {
        (Agent::Local(_), Target::Local) | (Agent::Remote(_), Target::Remote { .. }) => Ok(()),
        (Agent::Remote(remote), Target::Local) => Err(Error::input(format!(
            "agent {} is remote but its host {} is this machine",
            remote.name, remote.host
        ))),
        (agent, _) => Err(Error::input(format!(
            "agent {} needs a loopback host",
            agent.name()
        ))),
    }
}

fn check_control_plane(control_plane: &ControlPlane) -> Result<()> {
    match control_plane {
        ControlPlane::Local(_) => Ok(()),
        ControlPlane::Remote(remote) => {
            for controller in &remote.controllers {
                let options = ConnectionOptions {
                    host: Some(controller.host.clone()),
                    ssh_user: controller.ssh.as_ref().map(|s| s.user.clone()),
                    ssh_key: controller.ssh.as_ref().map(|s| s.key_file.clone()),
                    ssh_port: controller.ssh.as_ref().map(|s| s.port),
                    kube_config: None,
                };
                if !matches!(select_target(&options)?, Target::Remote { .. }) {
                    return Err(Error::input(format!(
                        "controller {} of a remote control plane needs a remote host",
                        controller.name
                    )));
                }
            }
            Ok(())
        }
        ControlPlane::Kubernetes(kube) if kube.kube_config.as_os_str().is_empty() => {
            Err(Error::input("a kubernetes control plane needs a kubeconfig"))
        }
        ControlPlane::Kubernetes(_) => Ok(()),
    }
}

fn connector_is_local(connector: &Connector) -> Result<bool> {
    match select_target(&ConnectionOptions::from_connector(connector))? {
        Target::Local => Ok(true),
        Target::Remote { .. } => Ok(false),
        Target::Kubernetes { .. } => Err(Error::input(format!(
            "connector {}: connectors in a cluster are managed by the control plane",
            connector.name
        ))),
    }
}

/// Builds the executor for each resource and operation
///
/// Every method validates the resource for its backend first and fails with
/// an input error before anything runs.
pub trait Factory: Send + Sync {
    /// Deploy a control plane
    fn control_plane_executor(&self, namespace: &str, control_plane: ControlPlane) -> Result<Box<dyn Executor>>;

    /// Remove a control plane
    fn delete_control_plane_executor(&self, namespace: &str, control_plane: ControlPlane) -> Result<Box<dyn Executor>>;

    /// Deploy and provision an agent
    fn agent_executor(&self, agent: Agent, access: ControllerAccess) -> Result<Box<dyn Executor>>;

    /// Provision an installed agent
    fn attach_agent_executor(&self, agent: Agent, access: ControllerAccess) -> Result<Box<dyn Executor>>;

    /// Deprovision an agent, leaving it installed
    fn detach_agent_executor(&self, agent: Agent, access: Option<ControllerAccess>) -> Result<Box<dyn Executor>>;

    /// Remove an agent
    fn delete_agent_executor(&self, agent: Agent, access: Option<ControllerAccess>) -> Result<Box<dyn Executor>>;

    /// Deploy a connector
    fn connector_executor(&self, connector: Connector, access: ControllerAccess) -> Result<Box<dyn Executor>>;

    /// Remove a connector
    fn delete_connector_executor(&self, connector: Connector, access: Option<ControllerAccess>) -> Result<Box<dyn Executor>>;
}

/// The factory backed by the real Docker, SSH and Kubernetes backends
#[derive(Debug, Clone, Default)]
pub struct BackendFactory {
    settings: Settings,
}

impl BackendFactory {
    /// Factory whose executors poll with `settings`
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

impl Factory for BackendFactory {
    fn control_plane_executor(&self, namespace: &str, control_plane: ControlPlane) -> Result<Box<dyn Executor>> {
        check_control_plane(&control_plane)?;
        debug!("Building {} control plane executor for {}", control_plane.kind(), namespace);
        let settings = self.settings.clone();
        Ok(match control_plane {
            ControlPlane::Local(cp) => Box::new(LocalControlPlaneExecutor::new(namespace, cp, settings)),
            ControlPlane::Remote(cp) => Box::new(RemoteControlPlaneExecutor::new(namespace, cp, settings)),
            ControlPlane::Kubernetes(cp) => {
                Box::new(KubernetesControlPlaneExecutor::new(namespace, cp, settings))
            }
        })
    }

    fn delete_control_plane_executor(&self, namespace: &str, control_plane: ControlPlane) -> Result<Box<dyn Executor>> {
        check_control_plane(&control_plane)?;
        Ok(Box::new(DeleteControlPlaneExecutor::new(
            namespace,
            control_plane,
            self.settings.clone(),
        )))
    }

    fn agent_executor(&self, agent: Agent, access: ControllerAccess) -> Result<Box<dyn Executor>> {
        check_agent(&agent)?;
        Ok(Box::new(DeployAgentExecutor::new(agent, access, self.settings.clone())))
    }

    fn attach_agent_executor(&self, agent: Agent, access: ControllerAccess) -> Result<Box<dyn Executor>> {
        check_agent(&agent)?;
        Ok(Box::new(AttachAgentExecutor::new(agent, access, self.settings.clone())))
    }

    fn detach_agent_executor(&self, agent: Agent, access: Option<ControllerAccess>) -> Result<Box<dyn Executor>> {
        check_agent(&agent)?;
        Ok(Box::new(DetachAgentExecutor::new(agent, access, self.settings.clone())))
    }

    fn delete_agent_executor(&self, agent: Agent, access: Option<ControllerAccess>) -> Result<Box<dyn Executor>> {
        check_agent(&agent)?;
        Ok(Box::new(DeleteAgentExecutor::new(agent, access, self.settings.clone())))
    }

    fn connector_executor(&self, connector: Connector, access: ControllerAccess) -> Result<Box<dyn Executor>> {
        let local = connector_is_local(&connector)?;
        Ok(Box::new(DeployConnectorExecutor::new(
            connector,
            access,
            local,
            self.settings.clone(),
        )))
    }

    fn delete_connector_executor(&self, connector: Connector, access: Option<ControllerAccess>) -> Result<Box<dyn Executor>> {
        let local = connector_is_local(&connector)?;
        Ok(Box::new(DeleteConnectorExecutor::new(
            connector,
            access,
            local,
            self.settings.clone(),
        )))
    }
}
