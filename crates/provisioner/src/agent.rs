//! Agent executors
//!
//! Local and remote agents share one provisioning protocol. It runs through
//! a [`Launcher`], which is either the engine's exec API for a container or
//! an SSH session for a host.

use crate::controlplane::ControllerAccess;
use crate::error::{Error, Result};
use crate::executor::{Executor, Outcome, ResourceKind};
use crate::local::{layout, LocalContainers};
use crate::remote::scripts::agent_plan;
use crate::remote::{run_until, RemoteHost, STARTING};
use crate::settings::Settings;
use crate::wait::Poll;
use async_trait::async_trait;
use command_executor::{shell_escape, Command, FailureKind, Launcher};
use controller_client::{api_base, fog_type_code, ControllerClient, CreateAgentRequest};
use regex::Regex;
use resource_store::{Agent, AgentConfig, LocalAgent, RemoteAgent};
use tracing::{debug, info, warn};

/// `iofog-agent status` output once the daemon is up
pub const AGENT_RUNNING: &str = r"ioFog daemon\s*:\s*RUNNING";

/// Runs the agent CLI through a launcher, with `sudo` on hosts
struct AgentCli<'a, L: ?Sized> {
    launcher: &'a L,
    sudo: bool,
}

impl<L: Launcher + ?Sized> AgentCli<'_, L> {
    fn line(&self, args: &str) -> String {
        if self.sudo {
            format!("sudo iofog-agent {args}")
        } else {
            format!("iofog-agent {args}")
        }
    }

    async fn wait_running(&self, poll: Poll) -> Result<()> {
        let running = Regex::new(AGENT_RUNNING)
            .map_err(|e| Error::internal(format!("bad readiness pattern: {e}")))?;
        run_until(self.launcher, poll, &running, &self.line("status"), STARTING).await?;
        Ok(())
    }

    async fn run(&self, args: &str) -> Result<()> {
        self.launcher.run(Command::shell(self.line(args))).await?;
        Ok(())
    }

    async fn deprovision(&self) -> Result<()> {
        match self.launcher.run(Command::shell(self.line("deprovision"))).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_any_of(&[FailureKind::NotProvisioned]) => {
                debug!("Agent was not provisioned: {}", e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// The agent's UUID on the Controller, registering it first if needed
async fn register(client: &ControllerClient, name: &str, config: Option<&AgentConfig>) -> Result<String> {
    match client.get_agent_by_name(name).await {
        Ok(existing) => {
            debug!("Agent {} already registered as {}", name, existing.uuid);
            return Ok(existing.uuid);
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e.into()),
    }

    let request = CreateAgentRequest {
        name: name.to_string(),
        fog_type: fog_type_code(config.and_then(|c| c.fog_type.as_deref())),
        latitude: config.and_then(|c| c.latitude),
        longitude: config.and_then(|c| c.longitude),
        description: config.and_then(|c| c.description.clone()),
    };
    let uuid = client.create_agent(&request).await?;
    info!("Registered agent {} as {}", name, uuid);
    Ok(uuid)
}

/// Point a running agent daemon at the Controller and provision it
async fn provision<L: Launcher + ?Sized>(
    cli: &AgentCli<'_, L>,
    poll: Poll,
    name: &str,
    config: Option<&AgentConfig>,
    access: &ControllerAccess,
    controller_url: &str,
) -> Result<String> {
    cli.wait_running(poll).await?;

    let client = access.client().await?;
    let uuid = register(&client, name, config).await?;
    let key = client.get_provisioning_key(&uuid).await?;

    cli.run(&format!("config -a {}", shell_escape(controller_url)))
        .await?;
    cli.run(&format!("provision {}", shell_escape(&key.key)))
        .await
        .map_err(|e| Error::internal(format!("provisioning agent {name} failed: {e}")))?;
    info!("Provisioned agent {} against {}", name, controller_url);
    Ok(uuid)
}

/// Remove the agent from the Controller; already gone is fine
async fn unregister(access: &ControllerAccess, name: &str, uuid: &str) -> Result<()> {
    if uuid.is_empty() {
        return Ok(());
    }
    match access.client().await?.delete_agent(uuid).await {
        Ok(()) => {
            info!("Removed agent {} from the controller", name);
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// URL the local agent container uses to reach the Controller
async fn local_controller_url(containers: &LocalContainers, access: &ControllerAccess) -> Result<String> {
    if access.local {
        let ip = containers.get_container_ip(layout::CONTROLLER_CONTAINER).await?;
        Ok(api_base(&format!("{ip}:{}", layout::CONTROLLER_PORT)))
    } else {
        Ok(api_base(&access.endpoint))
    }
}

async fn provision_local(
    agent: &LocalAgent,
    access: &ControllerAccess,
    settings: &Settings,
    containers: &LocalContainers,
) -> Result<String> {
    let launcher = containers.launcher(layout::AGENT_CONTAINER);
    let cli = AgentCli { launcher: &launcher, sudo: false };
    let url = local_controller_url(containers, access).await?;
    provision(
        &cli,
        Poll::container(settings),
        &agent.name,
        agent.config.as_ref(),
        access,
        &url,
    )
    .await
}

async fn provision_remote(
    agent: &RemoteAgent,
    access: &ControllerAccess,
    settings: &Settings,
    install: bool,
) -> Result<String> {
    let session = RemoteHost::new(&agent.host, &agent.ssh, settings.clone())
        .connect()
        .await?;
    let provisioned = async {
        if install {
            let plan = agent_plan(&agent.package, agent.scripts.as_ref())?;
            session.install(&plan).await?;
        }
        let cli = AgentCli { launcher: session.launcher(), sudo: true };
        provision(
            &cli,
            session.poll(),
            &agent.name,
            agent.config.as_ref(),
            access,
            &api_base(&access.endpoint),
        )
        .await
    }
    .await;
    session.close_with(provisioned).await
}

/// Deploys an agent and provisions it against the namespace's Controller
pub struct DeployAgentExecutor {
    agent: Agent,
    access: ControllerAccess,
    settings: Settings,
}

impl DeployAgentExecutor {
    /// Executor deploying `agent`
    pub fn new(agent: Agent, access: ControllerAccess, settings: Settings) -> Self {
        Self { agent, access, settings }
    }
}

#[async_trait]
impl Executor for DeployAgentExecutor {
    async fn execute(&self) -> Result<Outcome> {
        let uuid = match &self.agent {
            Agent::Local(local) => {
                let containers = LocalContainers::connect(self.settings.clone())?;
                containers
                    .deploy_container(&layout::agent(&local.container.image))
                    .await?;
                provision_local(local, &self.access, &self.settings, &containers).await?
            }
            Agent::Remote(remote) => {
                provision_remote(remote, &self.access, &self.settings, true).await?
            }
        };
        let mut agent = self.agent.clone();
        agent.set_uuid(uuid);
        Ok(Outcome::Agent(agent))
    }

    fn name(&self) -> &str {
        self.agent.name()
    }
}

/// Provisions an already installed agent against a Controller
pub struct AttachAgentExecutor {
    agent: Agent,
    access: ControllerAccess,
    settings: Settings,
}

impl AttachAgentExecutor {
    /// Executor attaching `agent`
    pub fn new(agent: Agent, access: ControllerAccess, settings: Settings) -> Self {
        Self { agent, access, settings }
    }
}

#[async_trait]
impl Executor for AttachAgentExecutor {
    async fn execute(&self) -> Result<Outcome> {
        let uuid = match &self.agent {
            Agent::Local(local) => {
                let containers = LocalContainers::connect(self.settings.clone())?;
                provision_local(local, &self.access, &self.settings, &containers).await?
            }
            Agent::Remote(remote) => {
                provision_remote(remote, &self.access, &self.settings, false).await?
            }
        };
        let mut agent = self.agent.clone();
        agent.set_uuid(uuid);
        Ok(Outcome::Agent(agent))
    }

    fn name(&self) -> &str {
        self.agent.name()
    }
}

async fn deprovision_on_host(agent: &Agent, settings: &Settings) -> Result<()> {
    match agent {
        Agent::Local(_) => {
            let containers = LocalContainers::connect(settings.clone())?;
            let launcher = containers.launcher(layout::AGENT_CONTAINER);
            AgentCli { launcher: &launcher, sudo: false }.deprovision().await
        }
        Agent::Remote(remote) => {
            let session = RemoteHost::new(&remote.host, &remote.ssh, settings.clone())
                .connect()
                .await?;
            let done = AgentCli { launcher: session.launcher(), sudo: true }
                .deprovision()
                .await;
            session.close_with(done).await
        }
    }
}

/// Unbinds an agent from its Controller, leaving it installed
pub struct DetachAgentExecutor {
    agent: Agent,
    access: Option<ControllerAccess>,
    settings: Settings,
}

impl DetachAgentExecutor {
    /// Executor detaching `agent`; `access` is `None` without a control plane
    pub fn new(agent: Agent, access: Option<ControllerAccess>, settings: Settings) -> Self {
        Self { agent, access, settings }
    }
}

#[async_trait]
impl Executor for DetachAgentExecutor {
    async fn execute(&self) -> Result<Outcome> {
        deprovision_on_host(&self.agent, &self.settings).await?;
        if let Some(access) = &self.access {
            unregister(access, self.agent.name(), self.agent.uuid()).await?;
        }
        info!("Detached agent {}", self.agent.name());
        Ok(Outcome::Nothing)
    }

    fn name(&self) -> &str {
        self.agent.name()
    }
}

/// Deprovisions an agent and removes it from its host
pub struct DeleteAgentExecutor {
    agent: Agent,
    access: Option<ControllerAccess>,
    settings: Settings,
}

impl DeleteAgentExecutor {
    /// Executor deleting `agent`; `access` is `None` for detached agents
    pub fn new(agent: Agent, access: Option<ControllerAccess>, settings: Settings) -> Self {
        Self { agent, access, settings }
    }
}

#[async_trait]
impl Executor for DeleteAgentExecutor {
    async fn execute(&self) -> Result<Outcome> {
        let name = self.agent.name();
        match &self.agent {
            Agent::Local(_) => {
                // The container goes away regardless
                if let Err(e) = deprovision_on_host(&self.agent, &self.settings).await {
                    warn!("Could not deprovision agent {}: {}", name, e);
                }
                LocalContainers::connect(self.settings.clone())?
                    .clean_container(layout::AGENT_CONTAINER)
                    .await?;
            }
            Agent::Remote(remote) => {
                let plan = agent_plan(&remote.package, remote.scripts.as_ref())?;
                let session = RemoteHost::new(&remote.host, &remote.ssh, self.settings.clone())
                    .connect()
                    .await?;
                let removed = async {
                    AgentCli { launcher: session.launcher(), sudo: true }
                        .deprovision()
                        .await?;
                    session.uninstall(&plan).await
                }
                .await;
                session.close_with(removed).await?;
            }
        }

        if let Some(access) = &self.access {
            unregister(access, name, self.agent.uuid()).await?;
        }
        info!("Deleted agent {}", name);
        Ok(Outcome::Removed {
            kind: ResourceKind::Agent,
            name: name.to_string(),
        })
    }

    fn name(&self) -> &str {
        self.agent.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command_executor::Output;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records every line and answers from a fixed table
    #[derive(Clone, Default)]
    struct FakeAgent {
        lines: Arc<Mutex<Vec<String>>>,
        deprovision_stderr: Option<&'static str>,
        /// Status calls answered "not running" before the daemon is up
        stopped_for: Arc<Mutex<u32>>,
    }

    #[async_trait]
    impl Launcher for FakeAgent {
        async fn output(&self, command: Command) -> command_executor::Result<Output> {
            let line = command
                .get_args()
                .last()
                .map(|a| a.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.lines.lock().unwrap().push(line.clone());
            if line.ends_with("status") {
                let mut stopped = self.stopped_for.lock().unwrap();
                if *stopped > 0 {
                    *stopped -= 1;
                    return Ok(Output::new(1, "", "iofog-agent is not running."));
                }
                return Ok(Output::new(0, "ioFog daemon : RUNNING\n", ""));
            }
            match (line.ends_with("deprovision"), self.deprovision_stderr) {
                (true, Some(stderr)) => Ok(Output::new(1, "", stderr)),
                _ => Ok(Output::new(0, "", "")),
            }
        }
    }

    #[test]
    fn test_cli_lines() {
        let fake = FakeAgent::default();
        let host = AgentCli { launcher: &fake, sudo: true };
        assert_eq!(host.line("status"), "sudo iofog-agent status");
        let container = AgentCli { launcher: &fake, sudo: false };
        assert_eq!(container.line("provision k"), "iofog-agent provision k");
    }

    #[smol_potat::test]
    async fn test_wait_running_matches_status() {
        let fake = FakeAgent::default();
        let cli = AgentCli { launcher: &fake, sudo: false };
        cli.wait_running(Poll::new(3, Duration::from_millis(1)))
            .await
            .unwrap();
        assert_eq!(fake.lines.lock().unwrap().as_slice(), ["iofog-agent status"]);
    }

    #[smol_potat::test]
    async fn test_wait_running_outlasts_a_starting_daemon() {
        let fake = FakeAgent {
            stopped_for: Arc::new(Mutex::new(2)),
            ..Default::default()
        };
        let cli = AgentCli { launcher: &fake, sudo: true };
        cli.wait_running(Poll::new(5, Duration::from_millis(1)))
            .await
            .unwrap();
        assert_eq!(fake.lines.lock().unwrap().len(), 3);
    }

    #[smol_potat::test]
    async fn test_deprovision_tolerates_not_provisioned() {
        let fake = FakeAgent {
            deprovision_stderr: Some("Agent is not provisioned"),
            ..Default::default()
        };
        AgentCli { launcher: &fake, sudo: true }
            .deprovision()
            .await
            .unwrap();
    }

    #[smol_potat::test]
    async fn test_deprovision_reports_other_failures() {
        let fake = FakeAgent {
            deprovision_stderr: Some("iofog-agent: daemon crashed"),
            ..Default::default()
        };
        let err = AgentCli { launcher: &fake, sudo: true }
            .deprovision()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Command(_)));
    }
}
