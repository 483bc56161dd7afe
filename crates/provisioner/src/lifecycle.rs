//! Lifecycle operations over the store and the backends
//!
//! Each operation reads what it needs from the [`Store`], builds executors
//! through a [`Factory`], runs them and folds the outcomes back in. Flushing
//! is left to the caller so that partial progress is written exactly once.

use crate::controlplane::ControllerAccess;
use crate::error::{Error, Result};
use crate::executor::{Executor, Outcome};
use crate::factory::Factory;
use crate::microservice::{self, MicroserviceSpec};
use crate::runner::{run_parallel, Report};
use controller_client::ControllerClient;
use resource_store::{validate_name, Agent, ControlPlane, Connector, Microservice, Store};
use tracing::{debug, info, warn};

/// Runs lifecycle operations against one store
pub struct Lifecycle<'a> {
    store: &'a Store,
    factory: &'a dyn Factory,
}

impl<'a> Lifecycle<'a> {
    /// Operations on `store` with executors from `factory`
    pub fn new(store: &'a Store, factory: &'a dyn Factory) -> Self {
        Self { store, factory }
    }

    fn access(&self, namespace: &str) -> Result<ControllerAccess> {
        let control_plane = self.store.get_control_plane(namespace).map_err(|e| {
            if e.is_not_found() {
                Error::NotFound(format!("control plane of namespace {namespace}"))
            } else {
                e.into()
            }
        })?;
        ControllerAccess::of(&control_plane)
    }

    fn optional_access(&self, namespace: &str) -> Result<Option<ControllerAccess>> {
        match self.store.get_control_plane(namespace) {
            Ok(cp) if !cp.endpoint().is_empty() => Ok(Some(ControllerAccess::of(&cp)?)),
            Ok(_) => Ok(None),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// `namespace/name` of the local agent other than `except`, live or detached
    ///
    /// The local agent container and its host ports are fixed, so a machine
    /// holds at most one.
    fn local_agent_besides(&self, except: (&str, &str)) -> Option<String> {
        self.store.list_namespaces().into_iter().find_map(|ns| {
            ns.agents
                .iter()
                .chain(&ns.detached.agents)
                .filter(|agent| matches!(agent, Agent::Local(_)))
                .find(|agent| (ns.name.as_str(), agent.name()) != except)
                .map(|agent| format!("local agent {}/{}", ns.name, agent.name()))
        })
    }

    /// Run one executor and record its outcome
    async fn run_one(&self, namespace: &str, executor: Box<dyn Executor>) -> Result<Outcome> {
        let outcome = executor.execute().await?;
        outcome.clone().apply(self.store, namespace)?;
        Ok(outcome)
    }

    /// Run executors in parallel and record every success
    ///
    /// Failures are reported, not returned; the successes are in the store
    /// either way.
    pub async fn run(&self, namespace: &str, executors: Vec<Box<dyn Executor>>) -> Result<Report> {
        let report = run_parallel(executors).await;
        for (name, outcome) in &report.outcomes {
            info!("Recording {} in {}", name, namespace);
            outcome.clone().apply(self.store, namespace)?;
        }
        Ok(report)
    }

    // Namespaces

    /// Create an empty namespace
    pub fn create_namespace(&self, name: &str) -> Result<()> {
        self.store.add_namespace(name)?;
        info!("Created namespace {}", name);
        Ok(())
    }

    /// Delete a namespace; `force` tears down its resources first
    pub async fn delete_namespace(&self, name: &str, force: bool) -> Result<Report> {
        let namespace = self.store.get_namespace(name)?;
        let report = if force && !namespace.is_empty() {
            self.delete_all(name).await?
        } else {
            Report::default()
        };
        if report.is_success() {
            self.store.delete_namespace(name, force)?;
            info!("Deleted namespace {}", name);
        }
        Ok(report)
    }

    /// Rename a namespace in the store
    pub fn rename_namespace(&self, name: &str, new_name: &str) -> Result<()> {
        let namespace = self.store.get_namespace(name)?;
        if let Some(ControlPlane::Kubernetes(_)) = namespace.control_plane {
            warn!(
                "Namespace {} keeps its cluster namespace; only the local record is renamed",
                name
            );
        }
        self.store.rename_namespace(name, new_name)?;
        Ok(())
    }

    // Control plane

    /// Deploy the namespace's control plane
    ///
    /// An existing control plane can be redeployed, but not turned into
    /// another kind.
    pub async fn deploy_control_plane(&self, namespace: &str, control_plane: ControlPlane) -> Result<()> {
        self.store.get_namespace(namespace)?;
        match self.store.get_control_plane(namespace) {
            Ok(existing) if !existing.same_kind(&control_plane) => {
                return Err(Error::input(format!(
                    "namespace {namespace} already has a {} control plane",
                    existing.kind()
                )));
            }
            Ok(_) => info!("Redeploying control plane of {}", namespace),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let executor = self.factory.control_plane_executor(namespace, control_plane)?;
        self.run_one(namespace, executor).await?;
        Ok(())
    }

    /// Tear down the namespace's control plane
    pub async fn delete_control_plane(&self, namespace: &str) -> Result<()> {
        let control_plane = self.store.get_control_plane(namespace)?;
        let executor = self
            .factory
            .delete_control_plane_executor(namespace, control_plane)?;
        self.run_one(namespace, executor).await?;
        Ok(())
    }

    // Agents

    /// Deploy agents in parallel against the namespace's Controller
    ///
    /// At most one local agent may exist across all namespaces; redeploying
    /// that same agent is allowed.
    pub async fn deploy_agents(&self, namespace: &str, agents: Vec<Agent>) -> Result<Report> {
        let access = self.access(namespace)?;
        let locals: Vec<&str> = agents
            .iter()
            .filter(|agent| matches!(agent, Agent::Local(_)))
            .map(|agent| agent.name())
            .collect();
        if locals.len() > 1 {
            return Err(Error::input(format!(
                "only one local agent can run on this machine, got {}",
                locals.join(", ")
            )));
        }
        if let Some(name) = locals.first() {
            if let Some(existing) = self.local_agent_besides((namespace, *name)) {
                return Err(Error::Conflict(existing));
            }
        }

        let mut executors = Vec::with_capacity(agents.len());
        for agent in agents {
            validate_name("agent", agent.name())?;
            executors.push(self.factory.agent_executor(agent, access.clone())?);
        }
        self.run(namespace, executors).await
    }

    /// Delete a live or detached agent
    pub async fn delete_agent(&self, namespace: &str, name: &str) -> Result<()> {
        match self.store.get_agent(namespace, name) {
            Ok(agent) => {
                let access = self.optional_access(namespace)?;
                let executor = self.factory.delete_agent_executor(agent, access)?;
                self.run_one(namespace, executor).await?;
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                let agent = self.store.get_detached_agent(namespace, name)?;
                let executor = self.factory.delete_agent_executor(agent, None)?;
                executor.execute().await?;
                self.store.delete_detached_agent(namespace, name)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Unbind an agent from its Controller and park it in the detached pool
    pub async fn detach_agent(&self, namespace: &str, name: &str) -> Result<()> {
        let agent = self.store.get_agent(namespace, name)?;
        let access = self.optional_access(namespace)?;
        let executor = self.factory.detach_agent_executor(agent, access)?;
        executor.execute().await?;
        self.store.detach_agent(namespace, name)?;
        info!("Detached agent {} from {}", name, namespace);
        Ok(())
    }

    /// Provision a detached agent of `from` against the Controller of `namespace`
    pub async fn attach_agent(&self, from: &str, name: &str, namespace: &str) -> Result<()> {
        let agent = self.store.get_detached_agent(from, name)?;
        if self.store.get_agent(namespace, name).is_ok() {
            return Err(Error::Conflict(format!("agent {name} in namespace {namespace}")));
        }
        if matches!(agent, Agent::Local(_)) {
            if let Some(existing) = self.local_agent_besides((from, name)) {
                return Err(Error::Conflict(existing));
            }
        }
        let access = self.access(namespace)?;
        let executor = self.factory.attach_agent_executor(agent, access)?;
        match executor.execute().await? {
            Outcome::Agent(attached) => self.store.attach_agent(from, namespace, attached)?,
            other => {
                return Err(Error::internal(format!(
                    "attaching agent {name} produced {other:?}"
                )));
            }
        }
        info!("Attached agent {} to {}", name, namespace);
        Ok(())
    }

    /// Move an agent to another namespace's Controller
    pub async fn move_agent(&self, from: &str, name: &str, to: &str) -> Result<()> {
        if from == to {
            return Ok(());
        }
        self.store.get_namespace(to)?;
        self.access(to)?;
        self.detach_agent(from, name).await?;
        self.attach_agent(from, name, to).await
    }

    /// Rename an agent on the Controller and in the store
    pub async fn rename_agent(&self, namespace: &str, name: &str, new_name: &str) -> Result<()> {
        validate_name("agent", new_name)?;
        let agent = self.store.get_agent(namespace, name)?;
        if self.store.get_agent(namespace, new_name).is_ok() {
            return Err(Error::Conflict(format!("agent {new_name}")));
        }
        if !agent.uuid().is_empty() {
            let client = self.access(namespace)?.client().await?;
            client.update_agent_name(agent.uuid(), new_name).await?;
        }
        self.store.rename_agent(namespace, name, new_name)?;
        info!("Renamed agent {} to {}", name, new_name);
        Ok(())
    }

    /// Ask the Controller to upgrade an agent
    pub async fn upgrade_agent(&self, namespace: &str, name: &str) -> Result<()> {
        let agent = self.store.get_agent(namespace, name)?;
        if agent.uuid().is_empty() {
            return Err(Error::input(format!("agent {name} is not provisioned")));
        }
        let client = self.access(namespace)?.client().await?;
        client.upgrade_agent(agent.uuid()).await?;
        info!("Requested upgrade of agent {}", name);
        Ok(())
    }

    // Connectors

    /// Deploy connectors in parallel
    pub async fn deploy_connectors(&self, namespace: &str, connectors: Vec<Connector>) -> Result<Report> {
        let access = self.access(namespace)?;
        let mut executors = Vec::with_capacity(connectors.len());
        for connector in connectors {
            validate_name("connector", &connector.name)?;
            executors.push(self.factory.connector_executor(connector, access.clone())?);
        }
        self.run(namespace, executors).await
    }

    /// Delete a connector
    pub async fn delete_connector(&self, namespace: &str, name: &str) -> Result<()> {
        let connector = self.store.get_connector(namespace, name)?;
        let access = self.optional_access(namespace)?;
        let executor = self.factory.delete_connector_executor(connector, access)?;
        self.run_one(namespace, executor).await?;
        Ok(())
    }

    // Microservices

    /// Replace the stored microservices with what `client` reports
    async fn sync_with(&self, namespace: &str, client: &ControllerClient) -> Result<usize> {
        let records = microservice::fetch(client).await?;
        for stale in self.store.get_microservices(namespace)? {
            if !records.iter().any(|m| m.name == stale.name) {
                debug!("Forgetting microservice {}", stale.name);
                self.store.delete_microservice(namespace, &stale.name)?;
            }
        }
        let count = records.len();
        for record in records {
            self.store.update_microservice(namespace, record)?;
        }
        Ok(count)
    }

    /// Refresh the stored microservices from the namespace's Controller
    pub async fn sync_microservices(&self, namespace: &str) -> Result<usize> {
        let client = self.access(namespace)?.client().await?;
        let count = self.sync_with(namespace, &client).await?;
        info!("Synced {} microservices of {}", count, namespace);
        Ok(count)
    }

    /// The stored microservice, looked up on the Controller when unknown locally
    async fn find_microservice(&self, namespace: &str, name: &str) -> Result<Microservice> {
        match self.store.get_microservice(namespace, name) {
            Err(e) if e.is_not_found() => {
                if self.optional_access(namespace)?.is_none() {
                    return Err(e.into());
                }
                self.sync_microservices(namespace).await?;
                Ok(self.store.get_microservice(namespace, name)?)
            }
            other => Ok(other?),
        }
    }

    /// Create a microservice on a provisioned agent of the namespace
    ///
    /// The application is created when missing. Routes must name
    /// microservices of the same application.
    pub async fn deploy_microservice(&self, namespace: &str, spec: MicroserviceSpec) -> Result<()> {
        validate_name("microservice", &spec.name)?;
        let agent = self.store.get_agent(namespace, &spec.agent)?;
        if agent.uuid().is_empty() {
            return Err(Error::input(format!("agent {} is not provisioned", spec.agent)));
        }

        let client = self.access(namespace)?.client().await?;
        self.sync_with(namespace, &client).await?;
        if self.store.get_microservice(namespace, &spec.name).is_ok() {
            return Err(Error::Conflict(format!("microservice {}", spec.name)));
        }
        let deployed = microservice::deploy(&client, &spec, agent.uuid()).await?;
        self.store.add_microservice(namespace, deployed)?;
        info!("Deployed microservice {} on agent {}", spec.name, spec.agent);
        Ok(())
    }

    /// Delete a microservice from the Controller and the store
    pub async fn delete_microservice(&self, namespace: &str, name: &str) -> Result<()> {
        let microservice = self.find_microservice(namespace, name).await?;
        if !microservice.uuid.is_empty() {
            let client = self.access(namespace)?.client().await?;
            match client.delete_microservice(&microservice.uuid).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    warn!("Microservice {} was already gone from the Controller", name);
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.store.delete_microservice(namespace, name)?;
        info!("Deleted microservice {}", name);
        Ok(())
    }

    /// Move a microservice onto another agent of the namespace
    pub async fn move_microservice(&self, namespace: &str, name: &str, agent: &str) -> Result<()> {
        let mut microservice = self.find_microservice(namespace, name).await?;
        let target = self.store.get_agent(namespace, agent)?;
        if target.uuid().is_empty() {
            return Err(Error::input(format!("agent {agent} is not provisioned")));
        }
        if !microservice.uuid.is_empty() {
            let client = self.access(namespace)?.client().await?;
            client
                .move_microservice(&microservice.uuid, target.uuid())
                .await?;
        }
        microservice.agent = agent.to_string();
        self.store.update_microservice(namespace, microservice)?;
        info!("Moved microservice {} to agent {}", name, agent);
        Ok(())
    }

    /// Delete every agent and connector in parallel, then the control plane
    ///
    /// The control plane is kept while any of its agents or connectors
    /// failed to go away.
    pub async fn delete_all(&self, namespace: &str) -> Result<Report> {
        let ns = self.store.get_namespace(namespace)?;
        let access = self.optional_access(namespace)?;

        let mut executors = Vec::new();
        for agent in ns.agents {
            executors.push(self.factory.delete_agent_executor(agent, access.clone())?);
        }
        for connector in ns.connectors {
            executors.push(self.factory.delete_connector_executor(connector, access.clone())?);
        }
        let mut report = self.run(namespace, executors).await?;

        let detached: Vec<Box<dyn Executor>> = ns
            .detached
            .agents
            .into_iter()
            .map(|agent| self.factory.delete_agent_executor(agent, None))
            .collect::<Result<_>>()?;
        let detached_names: Vec<String> = detached.iter().map(|e| e.name().to_string()).collect();
        let detached_report = run_parallel(detached).await;
        for name in &detached_names {
            if detached_report.outcomes.iter().any(|(n, _)| n == name) {
                self.store.delete_detached_agent(namespace, name)?;
            }
        }
        report.outcomes.extend(detached_report.outcomes);
        report.failures.extend(detached_report.failures);

        if let Some(control_plane) = ns.control_plane {
            if report.is_success() {
                let executor = self
                    .factory
                    .delete_control_plane_executor(namespace, control_plane)?;
                report.merge(self.run(namespace, vec![executor]).await?);
            } else {
                warn!(
                    "Keeping the control plane of {} since {} resources failed to delete",
                    namespace,
                    report.failures.len()
                );
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ResourceKind;
    use async_trait::async_trait;
    use chrono::Utc;
    use resource_store::{LocalAgent, LocalControlPlane, RemoteAgent, Ssh, User, DEFAULT_NAMESPACE};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Succeeds with a canned outcome, or fails
    struct Scripted {
        name: String,
        outcome: Option<Outcome>,
    }

    #[async_trait]
    impl Executor for Scripted {
        async fn execute(&self) -> Result<Outcome> {
            self.outcome
                .clone()
                .ok_or_else(|| Error::internal(format!("{} failed", self.name)))
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    /// Builds scripted executors; names listed in `failing` fail
    #[derive(Default)]
    struct FakeFactory {
        failing: Vec<String>,
        built: Mutex<Vec<String>>,
    }

    impl FakeFactory {
        fn failing(names: &[&str]) -> Self {
            Self {
                failing: names.iter().map(|n| n.to_string()).collect(),
                ..Default::default()
            }
        }

        fn scripted(&self, name: &str, outcome: Outcome) -> Result<Box<dyn Executor>> {
            self.built.lock().unwrap().push(name.to_string());
            let fails = self.failing.iter().any(|f| f == name);
            Ok(Box::new(Scripted {
                name: name.to_string(),
                outcome: (!fails).then_some(outcome),
            }))
        }
    }

    impl Factory for FakeFactory {
        fn control_plane_executor(&self, _: &str, mut cp: ControlPlane) -> Result<Box<dyn Executor>> {
            cp.set_endpoint("localhost:51121");
            self.scripted("controlplane", Outcome::ControlPlane(cp))
        }

        fn delete_control_plane_executor(&self, ns: &str, _: ControlPlane) -> Result<Box<dyn Executor>> {
            self.scripted(
                "controlplane",
                Outcome::Removed {
                    kind: ResourceKind::ControlPlane,
                    name: ns.to_string(),
                },
            )
        }

        fn agent_executor(&self, mut agent: Agent, _: ControllerAccess) -> Result<Box<dyn Executor>> {
            let name = agent.name().to_string();
            agent.set_uuid(format!("uuid-{name}"));
            self.scripted(&name, Outcome::Agent(agent))
        }

        fn attach_agent_executor(&self, agent: Agent, access: ControllerAccess) -> Result<Box<dyn Executor>> {
            self.agent_executor(agent, access)
        }

        fn detach_agent_executor(&self, agent: Agent, _: Option<ControllerAccess>) -> Result<Box<dyn Executor>> {
            self.scripted(agent.name(), Outcome::Nothing)
        }

        fn delete_agent_executor(&self, agent: Agent, _: Option<ControllerAccess>) -> Result<Box<dyn Executor>> {
            let name = agent.name().to_string();
            self.scripted(
                &name,
                Outcome::Removed {
                    kind: ResourceKind::Agent,
                    name: name.clone(),
                },
            )
        }

        fn connector_executor(&self, connector: Connector, _: ControllerAccess) -> Result<Box<dyn Executor>> {
            let name = connector.name.clone();
            self.scripted(&name, Outcome::Connector(connector))
        }

        fn delete_connector_executor(&self, connector: Connector, _: Option<ControllerAccess>) -> Result<Box<dyn Executor>> {
            self.scripted(
                &connector.name,
                Outcome::Removed {
                    kind: ResourceKind::Connector,
                    name: connector.name.clone(),
                },
            )
        }
    }

    fn store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::load(dir.path().join("config.yaml")).unwrap();
        (dir, store)
    }

    fn control_plane() -> ControlPlane {
        ControlPlane::Local(LocalControlPlane {
            iofog_user: User {
                name: "a".to_string(),
                surname: "b".to_string(),
                email: "a@b.c".to_string(),
                password: "pw".to_string(),
            },
            controllers: Vec::new(),
            endpoint: String::new(),
        })
    }

    fn local_agent(name: &str) -> Agent {
        Agent::Local(LocalAgent {
            name: name.to_string(),
            uuid: String::new(),
            host: "localhost".to_string(),
            container: Default::default(),
            config: None,
            created: Utc::now(),
        })
    }

    fn agent(name: &str) -> Agent {
        Agent::Remote(RemoteAgent {
            name: name.to_string(),
            uuid: String::new(),
            host: format!("{name}.edge.lan"),
            ssh: Ssh {
                user: "edge".to_string(),
                key_file: "/home/edge/.ssh/id_ed25519".into(),
                port: 22,
            },
            package: Default::default(),
            scripts: None,
            config: None,
            created: Utc::now(),
        })
    }

    #[smol_potat::test]
    async fn test_agents_need_a_control_plane() {
        let (_dir, store) = store();
        let factory = FakeFactory::default();
        let lifecycle = Lifecycle::new(&store, &factory);

        let err = lifecycle
            .deploy_agents(DEFAULT_NAMESPACE, vec![local_agent("a1")])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(factory.built.lock().unwrap().is_empty());
    }

    #[smol_potat::test]
    async fn test_partial_failure_records_successes() {
        let (_dir, store) = store();
        let factory = FakeFactory::failing(&["a2", "a4"]);
        let lifecycle = Lifecycle::new(&store, &factory);
        lifecycle
            .deploy_control_plane(DEFAULT_NAMESPACE, control_plane())
            .await
            .unwrap();

        let agents = ["a1", "a2", "a3", "a4", "a5"].map(agent).to_vec();
        let report = lifecycle.deploy_agents(DEFAULT_NAMESPACE, agents).await.unwrap();

        assert!(!report.is_success());
        let mut failed: Vec<_> = report.failures.iter().map(|f| f.executor.name()).collect();
        failed.sort();
        assert_eq!(failed, ["a2", "a4"]);

        let recorded: Vec<_> = store
            .get_agents(DEFAULT_NAMESPACE)
            .unwrap()
            .into_iter()
            .map(|a| (a.name().to_string(), a.uuid().to_string()))
            .collect();
        assert_eq!(recorded.len(), 3);
        assert!(recorded.contains(&("a3".to_string(), "uuid-a3".to_string())));
    }

    #[smol_potat::test]
    async fn test_control_plane_kind_is_fixed() {
        let (_dir, store) = store();
        let factory = FakeFactory::default();
        let lifecycle = Lifecycle::new(&store, &factory);
        lifecycle
            .deploy_control_plane(DEFAULT_NAMESPACE, control_plane())
            .await
            .unwrap();

        let kube = ControlPlane::Kubernetes(resource_store::KubernetesControlPlane {
            iofog_user: control_plane().user().clone(),
            controllers: Vec::new(),
            endpoint: String::new(),
            kube_config: "/k".into(),
            replicas: Default::default(),
            images: Default::default(),
            services: Default::default(),
            database: None,
        });
        let err = lifecycle
            .deploy_control_plane(DEFAULT_NAMESPACE, kube)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Input(_)));
    }

    #[smol_potat::test]
    async fn test_detach_then_attach_elsewhere() {
        let (_dir, store) = store();
        let factory = FakeFactory::default();
        let lifecycle = Lifecycle::new(&store, &factory);
        lifecycle.create_namespace("edge").unwrap();
        for ns in [DEFAULT_NAMESPACE, "edge"] {
            lifecycle.deploy_control_plane(ns, control_plane()).await.unwrap();
        }
        lifecycle
            .deploy_agents(DEFAULT_NAMESPACE, vec![local_agent("a1")])
            .await
            .unwrap();

        lifecycle.move_agent(DEFAULT_NAMESPACE, "a1", "edge").await.unwrap();

        assert!(store.get_agents(DEFAULT_NAMESPACE).unwrap().is_empty());
        assert!(store.get_detached_agents(DEFAULT_NAMESPACE).unwrap().is_empty());
        let moved = store.get_agent("edge", "a1").unwrap();
        assert_eq!(moved.uuid(), "uuid-a1");
    }

    #[smol_potat::test]
    async fn test_one_local_agent_per_machine() {
        let (_dir, store) = store();
        let factory = FakeFactory::default();
        let lifecycle = Lifecycle::new(&store, &factory);
        lifecycle.create_namespace("edge").unwrap();
        for ns in [DEFAULT_NAMESPACE, "edge"] {
            lifecycle.deploy_control_plane(ns, control_plane()).await.unwrap();
        }

        let err = lifecycle
            .deploy_agents(DEFAULT_NAMESPACE, vec![local_agent("a1"), local_agent("a2")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Input(_)));
        assert_eq!(factory.built.lock().unwrap().as_slice(), ["controlplane", "controlplane"]);

        lifecycle
            .deploy_agents(DEFAULT_NAMESPACE, vec![local_agent("a1"), agent("r1")])
            .await
            .unwrap();
        // Redeploying the same local agent is fine
        lifecycle
            .deploy_agents(DEFAULT_NAMESPACE, vec![local_agent("a1")])
            .await
            .unwrap();

        let err = lifecycle
            .deploy_agents("edge", vec![local_agent("a2")])
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.to_string(), "local agent default/a1 already exists");
        let err = lifecycle
            .deploy_agents("edge", vec![local_agent("a1")])
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(store.get_agents("edge").unwrap().is_empty());
    }

    #[smol_potat::test]
    async fn test_attach_refuses_a_second_local_agent() {
        let (_dir, store) = store();
        let factory = FakeFactory::default();
        let lifecycle = Lifecycle::new(&store, &factory);
        lifecycle.create_namespace("edge").unwrap();
        for ns in [DEFAULT_NAMESPACE, "edge"] {
            lifecycle.deploy_control_plane(ns, control_plane()).await.unwrap();
        }
        lifecycle
            .deploy_agents(DEFAULT_NAMESPACE, vec![local_agent("a1")])
            .await
            .unwrap();
        lifecycle.detach_agent(DEFAULT_NAMESPACE, "a1").await.unwrap();
        // A record written before the one-local-agent rule
        store.add_agent("edge", local_agent("a2")).unwrap();

        let err = lifecycle
            .attach_agent(DEFAULT_NAMESPACE, "a1", "edge")
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.get_detached_agents(DEFAULT_NAMESPACE).unwrap().len(), 1);

        store.delete_agent("edge", "a2").unwrap();
        lifecycle
            .attach_agent(DEFAULT_NAMESPACE, "a1", "edge")
            .await
            .unwrap();
        assert_eq!(store.get_agent("edge", "a1").unwrap().uuid(), "uuid-a1");
    }

    fn provisioned(name: &str) -> Agent {
        let mut agent = agent(name);
        agent.set_uuid(format!("uuid-{name}"));
        agent
    }

    #[smol_potat::test]
    async fn test_microservices_need_a_provisioned_agent() {
        let (_dir, store) = store();
        let factory = FakeFactory::default();
        let lifecycle = Lifecycle::new(&store, &factory);
        store.add_agent(DEFAULT_NAMESPACE, agent("r1")).unwrap();

        let spec = |agent: &str| MicroserviceSpec {
            name: "reader".to_string(),
            agent: agent.to_string(),
            application: "sensors".to_string(),
            image: "heart-rate".to_string(),
            config: None,
            routes: Vec::new(),
        };
        let err = lifecycle
            .deploy_microservice(DEFAULT_NAMESPACE, spec("r1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Input(_)));
        let err = lifecycle
            .deploy_microservice(DEFAULT_NAMESPACE, spec("r9"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(store.get_microservices(DEFAULT_NAMESPACE).unwrap().is_empty());
    }

    #[smol_potat::test]
    async fn test_move_and_delete_recorded_microservice() {
        let (_dir, store) = store();
        let factory = FakeFactory::default();
        let lifecycle = Lifecycle::new(&store, &factory);
        store.add_agent(DEFAULT_NAMESPACE, provisioned("r1")).unwrap();
        store.add_agent(DEFAULT_NAMESPACE, provisioned("r2")).unwrap();
        store
            .add_microservice(
                DEFAULT_NAMESPACE,
                Microservice {
                    name: "reader".to_string(),
                    uuid: String::new(),
                    agent: "r1".to_string(),
                    application: "sensors".to_string(),
                    image: "heart-rate".to_string(),
                    routes: Vec::new(),
                },
            )
            .unwrap();

        lifecycle
            .move_microservice(DEFAULT_NAMESPACE, "reader", "r2")
            .await
            .unwrap();
        assert_eq!(store.get_microservice(DEFAULT_NAMESPACE, "reader").unwrap().agent, "r2");

        lifecycle
            .delete_microservice(DEFAULT_NAMESPACE, "reader")
            .await
            .unwrap();
        // No control plane to ask, so unknown stays unknown
        let err = lifecycle
            .delete_microservice(DEFAULT_NAMESPACE, "reader")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[smol_potat::test]
    async fn test_delete_all_keeps_control_plane_after_failure() {
        let (_dir, store) = store();
        let factory = FakeFactory::default();
        let lifecycle = Lifecycle::new(&store, &factory);
        lifecycle
            .deploy_control_plane(DEFAULT_NAMESPACE, control_plane())
            .await
            .unwrap();
        lifecycle
            .deploy_agents(DEFAULT_NAMESPACE, vec![agent("a1"), agent("a2")])
            .await
            .unwrap();

        let failing = FakeFactory::failing(&["a2"]);
        let report = Lifecycle::new(&store, &failing)
            .delete_all(DEFAULT_NAMESPACE)
            .await
            .unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(store.get_control_plane(DEFAULT_NAMESPACE).is_ok());
        assert_eq!(store.get_agents(DEFAULT_NAMESPACE).unwrap().len(), 1);

        let report = lifecycle.delete_all(DEFAULT_NAMESPACE).await.unwrap();
        assert!(report.is_success());
        assert!(store.get_namespace(DEFAULT_NAMESPACE).unwrap().is_empty());
    }

    #[smol_potat::test]
    async fn test_forced_namespace_delete_tears_down_first() {
        let (_dir, store) = store();
        let factory = FakeFactory::default();
        let lifecycle = Lifecycle::new(&store, &factory);
        lifecycle.create_namespace("edge").unwrap();
        lifecycle.deploy_control_plane("edge", control_plane()).await.unwrap();

        assert!(lifecycle.delete_namespace("edge", false).await.is_err());
        let report = lifecycle.delete_namespace("edge", true).await.unwrap();
        assert!(report.is_success());
        assert!(store.get_namespace("edge").unwrap_err().is_not_found());
        assert_eq!(factory.built.lock().unwrap().last().unwrap(), "controlplane");
    }

    #[smol_potat::test]
    async fn test_forced_namespace_delete_removes_lone_connectors() {
        let (_dir, store) = store();
        let factory = FakeFactory::default();
        let lifecycle = Lifecycle::new(&store, &factory);
        lifecycle.create_namespace("edge").unwrap();
        store
            .add_connector(
                "edge",
                Connector {
                    name: "c1".to_string(),
                    host: "10.0.0.5".to_string(),
                    ssh: None,
                    kube_config: None,
                    container: None,
                    package: None,
                    created: Utc::now(),
                },
            )
            .unwrap();

        assert!(lifecycle.delete_namespace("edge", false).await.is_err());
        let report = lifecycle.delete_namespace("edge", true).await.unwrap();
        assert!(report.is_success());
        assert_eq!(factory.built.lock().unwrap().as_slice(), ["c1"]);
        assert!(store.get_namespace("edge").unwrap_err().is_not_found());
    }
}
