//! YAML-backed store of namespaces and their resources

use crate::{
    error::{Error, Result},
    models::*,
};
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Environment variable overriding the store location
pub const CONFIG_ENV: &str = "EDGECTL_CONFIG";

const NAME_PATTERN: &str = r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$";

/// Check a namespace or resource name
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    let pattern = Regex::new(NAME_PATTERN).map_err(|e| Error::Input(e.to_string()))?;
    if name.len() > 63 || !pattern.is_match(name) {
        return Err(Error::Input(format!(
            "invalid {kind} name {name:?}: use lowercase letters, digits and '-', at most 63 characters"
        )));
    }
    Ok(())
}

/// In-memory view of the store file
///
/// One `Store` is built per process and passed by reference to whatever needs
/// it. Every mutation holds the lock for the whole update; reads take the lock
/// briefly and hand back owned clones.
pub struct Store {
    path: PathBuf,
    config: Mutex<Config>,
    /// Document as last read from or written to disk
    persisted: Mutex<Option<String>>,
}

impl Store {
    /// Default store location: `EDGECTL_CONFIG`, else `~/.edgectl/config.yaml`
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Input("cannot determine home directory".to_string()))?;
        Ok(home.join(".edgectl").join("config.yaml"))
    }

    /// Load the store from `path`; a missing file yields an empty store
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Loading store from {:?}", path);

        let (mut config, persisted) = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => (Config::default(), None),
            Ok(raw) => (serde_yaml::from_str::<Config>(&raw)?, Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No store at {:?}, starting empty", path);
                (Config::default(), None)
            }
            Err(e) => return Err(Error::io(&path, e)),
        };

        if config.default_namespace.is_empty() {
            config.default_namespace = DEFAULT_NAMESPACE.to_string();
        }
        if !config.namespaces.iter().any(|n| n.name == DEFAULT_NAMESPACE) {
            config.namespaces.insert(0, Namespace::new(DEFAULT_NAMESPACE));
        }

        Ok(Self {
            path,
            config: Mutex::new(config),
            persisted: Mutex::new(persisted),
        })
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Config> {
        // A panic mid-mutation still leaves a structurally valid Config
        self.config.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the whole document
    pub fn snapshot(&self) -> Config {
        self.lock().clone()
    }

    /// Persist the in-memory state, replacing the backing file
    ///
    /// Returns `false` when nothing changed since the last load or flush.
    pub fn flush(&self) -> Result<bool> {
        let raw = serde_yaml::to_string(&*self.lock())?;
        let mut persisted = self.persisted.lock().unwrap_or_else(|e| e.into_inner());
        if persisted.as_deref() == Some(raw.as_str()) {
            debug!("Store unchanged, skipping flush");
            return Ok(false);
        }

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| Error::io(&dir, e))?;
        tmp.write_all(raw.as_bytes())
            .map_err(|e| Error::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| Error::io(&self.path, e.error))?;

        info!("Store written to {:?}", self.path);
        *persisted = Some(raw);
        Ok(true)
    }

    fn with_namespace<T>(
        &self,
        namespace: &str,
        f: impl FnOnce(&mut Namespace) -> Result<T>,
    ) -> Result<T> {
        let mut config = self.lock();
        let ns = config
            .namespaces
            .iter_mut()
            .find(|n| n.name == namespace)
            .ok_or_else(|| Error::not_found("namespace", namespace))?;
        f(ns)
    }

    fn read_namespace<T>(&self, namespace: &str, f: impl FnOnce(&Namespace) -> Result<T>) -> Result<T> {
        let config = self.lock();
        let ns = config
            .namespaces
            .iter()
            .find(|n| n.name == namespace)
            .ok_or_else(|| Error::not_found("namespace", namespace))?;
        f(ns)
    }

    // Namespaces

    /// All namespaces
    pub fn list_namespaces(&self) -> Vec<Namespace> {
        self.lock().namespaces.clone()
    }

    /// Look up one namespace
    pub fn get_namespace(&self, name: &str) -> Result<Namespace> {
        self.read_namespace(name, |ns| Ok(ns.clone()))
    }

    /// Create an empty namespace
    pub fn add_namespace(&self, name: &str) -> Result<Namespace> {
        validate_name("namespace", name)?;
        let mut config = self.lock();
        if config.namespaces.iter().any(|n| n.name == name) {
            return Err(Error::conflict("namespace", name));
        }
        info!("Adding namespace {}", name);
        let ns = Namespace::new(name);
        config.namespaces.push(ns.clone());
        Ok(ns)
    }

    /// Fetch a namespace, creating it when missing
    pub fn ensure_namespace(&self, name: &str) -> Result<Namespace> {
        match self.get_namespace(name) {
            Err(e) if e.is_not_found() => match self.add_namespace(name) {
                Err(e) if e.is_conflict() => self.get_namespace(name),
                other => other,
            },
            other => other,
        }
    }

    /// Delete a namespace
    ///
    /// Refuses when the namespace still holds a control plane, agents,
    /// connectors or microservices, live or detached, unless `force` is set. The default namespace is emptied
    /// rather than removed.
    pub fn delete_namespace(&self, name: &str, force: bool) -> Result<()> {
        let mut config = self.lock();
        let idx = config
            .namespaces
            .iter()
            .position(|n| n.name == name)
            .ok_or_else(|| Error::not_found("namespace", name))?;

        if !force && !config.namespaces[idx].is_empty() {
            return Err(Error::Input(format!(
                "namespace {name} is not empty; delete its resources first or force the deletion"
            )));
        }

        if name == DEFAULT_NAMESPACE {
            info!("Clearing default namespace");
            let created = config.namespaces[idx].created;
            config.namespaces[idx] = Namespace {
                created,
                ..Namespace::new(DEFAULT_NAMESPACE)
            };
        } else {
            info!("Deleting namespace {}", name);
            config.namespaces.remove(idx);
            if config.default_namespace == name {
                config.default_namespace = DEFAULT_NAMESPACE.to_string();
            }
        }
        Ok(())
    }

    /// Rename a namespace, carrying all its resources along
    pub fn rename_namespace(&self, name: &str, new_name: &str) -> Result<()> {
        if name == DEFAULT_NAMESPACE {
            return Err(Error::Input("the default namespace cannot be renamed".to_string()));
        }
        validate_name("namespace", new_name)?;
        let mut config = self.lock();
        if config.namespaces.iter().any(|n| n.name == new_name) {
            return Err(Error::conflict("namespace", new_name));
        }
        let ns = config
            .namespaces
            .iter_mut()
            .find(|n| n.name == name)
            .ok_or_else(|| Error::not_found("namespace", name))?;
        ns.name = new_name.to_string();
        if config.default_namespace == name {
            config.default_namespace = new_name.to_string();
        }
        info!("Renamed namespace {} to {}", name, new_name);
        Ok(())
    }

    /// Namespace used when a command names none
    pub fn default_namespace(&self) -> String {
        self.lock().default_namespace.clone()
    }

    /// Change the default namespace; it must exist
    pub fn set_default_namespace(&self, name: &str) -> Result<()> {
        let mut config = self.lock();
        if !config.namespaces.iter().any(|n| n.name == name) {
            return Err(Error::not_found("namespace", name));
        }
        config.default_namespace = name.to_string();
        Ok(())
    }

    // Control plane

    /// The namespace's control plane
    pub fn get_control_plane(&self, namespace: &str) -> Result<ControlPlane> {
        self.read_namespace(namespace, |ns| {
            ns.control_plane
                .clone()
                .ok_or_else(|| Error::not_found("control plane in namespace", namespace))
        })
    }

    /// Set the namespace's control plane; its variant is fixed once created
    pub fn update_control_plane(&self, namespace: &str, control_plane: ControlPlane) -> Result<()> {
        self.with_namespace(namespace, |ns| {
            if let Some(existing) = &ns.control_plane {
                if !existing.same_kind(&control_plane) {
                    return Err(Error::Input(format!(
                        "namespace {namespace} already has a {} control plane, cannot replace it with a {} one",
                        existing.kind(),
                        control_plane.kind()
                    )));
                }
            }
            ns.control_plane = Some(control_plane);
            Ok(())
        })
    }

    /// Remove the namespace's control plane
    pub fn delete_control_plane(&self, namespace: &str) -> Result<()> {
        self.with_namespace(namespace, |ns| {
            ns.control_plane
                .take()
                .map(|_| ())
                .ok_or_else(|| Error::not_found("control plane in namespace", namespace))
        })
    }

    // Controllers

    /// Controllers of the namespace's control plane
    pub fn get_controllers(&self, namespace: &str) -> Result<Vec<Controller>> {
        Ok(self.get_control_plane(namespace)?.controllers().to_vec())
    }

    /// Look up one Controller
    pub fn get_controller(&self, namespace: &str, name: &str) -> Result<Controller> {
        self.get_controllers(namespace)?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::not_found("controller", name))
    }

    /// Add a Controller to an existing control plane
    pub fn add_controller(&self, namespace: &str, controller: Controller) -> Result<()> {
        self.with_namespace(namespace, |ns| {
            let cp = ns
                .control_plane
                .as_mut()
                .ok_or_else(|| Error::not_found("control plane in namespace", namespace))?;
            if cp.controllers().iter().any(|c| c.name == controller.name) {
                return Err(Error::conflict("controller", controller.name));
            }
            cp.controllers_mut().push(controller);
            Ok(())
        })
    }

    /// Insert or replace a Controller by name
    pub fn update_controller(&self, namespace: &str, controller: Controller) -> Result<()> {
        self.with_namespace(namespace, |ns| {
            let cp = ns
                .control_plane
                .as_mut()
                .ok_or_else(|| Error::not_found("control plane in namespace", namespace))?;
            upsert(cp.controllers_mut(), controller, |c| c.name.as_str());
            Ok(())
        })
    }

    /// Remove a Controller
    pub fn delete_controller(&self, namespace: &str, name: &str) -> Result<()> {
        self.with_namespace(namespace, |ns| {
            let cp = ns
                .control_plane
                .as_mut()
                .ok_or_else(|| Error::not_found("control plane in namespace", namespace))?;
            remove(cp.controllers_mut(), name, |c| c.name.as_str())
                .map(|_| ())
                .ok_or_else(|| Error::not_found("controller", name))
        })
    }

    // Agents

    /// Agents of the namespace
    pub fn get_agents(&self, namespace: &str) -> Result<Vec<Agent>> {
        self.read_namespace(namespace, |ns| Ok(ns.agents.clone()))
    }

    /// Look up one agent
    pub fn get_agent(&self, namespace: &str, name: &str) -> Result<Agent> {
        self.read_namespace(namespace, |ns| {
            ns.agent(name)
                .cloned()
                .ok_or_else(|| Error::not_found("agent", name))
        })
    }

    /// Add an agent; fails on a name collision
    pub fn add_agent(&self, namespace: &str, agent: Agent) -> Result<()> {
        self.with_namespace(namespace, |ns| {
            if ns.agent(agent.name()).is_some() {
                return Err(Error::conflict("agent", agent.name()));
            }
            ns.agents.push(agent);
            Ok(())
        })
    }

    /// Insert or replace an agent by name
    pub fn update_agent(&self, namespace: &str, agent: Agent) -> Result<()> {
        self.with_namespace(namespace, |ns| {
            upsert(&mut ns.agents, agent, |a| a.name());
            Ok(())
        })
    }

    /// Remove an agent
    pub fn delete_agent(&self, namespace: &str, name: &str) -> Result<()> {
        self.with_namespace(namespace, |ns| {
            remove(&mut ns.agents, name, |a| a.name())
                .ok_or_else(|| Error::not_found("agent", name))?;
            ns.microservices.retain(|m| m.agent != name);
            Ok(())
        })
    }

    /// Rename a live agent
    pub fn rename_agent(&self, namespace: &str, name: &str, new_name: &str) -> Result<()> {
        validate_name("agent", new_name)?;
        self.with_namespace(namespace, |ns| {
            if ns.agent(new_name).is_some() {
                return Err(Error::conflict("agent", new_name));
            }
            let agent = ns
                .agents
                .iter_mut()
                .find(|a| a.name() == name)
                .ok_or_else(|| Error::not_found("agent", name))?;
            agent.set_name(new_name);
            for msvc in ns.microservices.iter_mut().filter(|m| m.agent == name) {
                msvc.agent = new_name.to_string();
            }
            Ok(())
        })
    }

    /// Move a live agent into the namespace's detached pool
    ///
    /// The agent loses its Controller-assigned UUID.
    pub fn detach_agent(&self, namespace: &str, name: &str) -> Result<Agent> {
        self.with_namespace(namespace, |ns| {
            if ns.detached.agents.iter().any(|a| a.name() == name) {
                return Err(Error::conflict("detached agent", name));
            }
            let mut agent = remove(&mut ns.agents, name, |a| a.name())
                .ok_or_else(|| Error::not_found("agent", name))?;
            agent.set_uuid("");
            ns.microservices.retain(|m| m.agent != name);
            ns.detached.agents.push(agent.clone());
            Ok(agent)
        })
    }

    /// Move a detached agent back into the live list of `namespace`
    ///
    /// `from` names the namespace whose detached pool holds the agent, which
    /// lets an agent move between namespaces.
    pub fn attach_agent(&self, from: &str, namespace: &str, agent: Agent) -> Result<()> {
        let mut config = self.lock();
        if !config.namespaces.iter().any(|n| n.name == namespace) {
            return Err(Error::not_found("namespace", namespace));
        }
        let target_has = config
            .namespaces
            .iter()
            .find(|n| n.name == namespace)
            .is_some_and(|n| n.agent(agent.name()).is_some());
        if target_has {
            return Err(Error::conflict("agent", agent.name()));
        }
        let source = config
            .namespaces
            .iter_mut()
            .find(|n| n.name == from)
            .ok_or_else(|| Error::not_found("namespace", from))?;
        remove(&mut source.detached.agents, agent.name(), |a| a.name())
            .ok_or_else(|| Error::not_found("detached agent", agent.name()))?;
        if let Some(target) = config.namespaces.iter_mut().find(|n| n.name == namespace) {
            target.agents.push(agent);
        }
        Ok(())
    }

    /// Detached agents of the namespace
    pub fn get_detached_agents(&self, namespace: &str) -> Result<Vec<Agent>> {
        self.read_namespace(namespace, |ns| Ok(ns.detached.agents.clone()))
    }

    /// Look up one detached agent
    pub fn get_detached_agent(&self, namespace: &str, name: &str) -> Result<Agent> {
        self.read_namespace(namespace, |ns| {
            ns.detached
                .agents
                .iter()
                .find(|a| a.name() == name)
                .cloned()
                .ok_or_else(|| Error::not_found("detached agent", name))
        })
    }

    /// Forget a detached agent
    pub fn delete_detached_agent(&self, namespace: &str, name: &str) -> Result<()> {
        self.with_namespace(namespace, |ns| {
            remove(&mut ns.detached.agents, name, |a| a.name())
                .map(|_| ())
                .ok_or_else(|| Error::not_found("detached agent", name))
        })
    }

    // Connectors

    /// Connectors of the namespace
    pub fn get_connectors(&self, namespace: &str) -> Result<Vec<Connector>> {
        self.read_namespace(namespace, |ns| Ok(ns.connectors.clone()))
    }

    /// Look up one connector
    pub fn get_connector(&self, namespace: &str, name: &str) -> Result<Connector> {
        self.read_namespace(namespace, |ns| {
            ns.connector(name)
                .cloned()
                .ok_or_else(|| Error::not_found("connector", name))
        })
    }

    /// Add a connector; fails on a name collision
    pub fn add_connector(&self, namespace: &str, connector: Connector) -> Result<()> {
        self.with_namespace(namespace, |ns| {
            if ns.connector(&connector.name).is_some() {
                return Err(Error::conflict("connector", connector.name));
            }
            ns.connectors.push(connector);
            Ok(())
        })
    }

    /// Insert or replace a connector by name
    pub fn update_connector(&self, namespace: &str, connector: Connector) -> Result<()> {
        self.with_namespace(namespace, |ns| {
            upsert(&mut ns.connectors, connector, |c| c.name.as_str());
            Ok(())
        })
    }

    /// Remove a connector
    pub fn delete_connector(&self, namespace: &str, name: &str) -> Result<()> {
        self.with_namespace(namespace, |ns| {
            remove(&mut ns.connectors, name, |c| c.name.as_str())
                .map(|_| ())
                .ok_or_else(|| Error::not_found("connector", name))
        })
    }

    // Microservices

    /// Microservices of the namespace
    pub fn get_microservices(&self, namespace: &str) -> Result<Vec<Microservice>> {
        self.read_namespace(namespace, |ns| Ok(ns.microservices.clone()))
    }

    /// Look up one microservice
    pub fn get_microservice(&self, namespace: &str, name: &str) -> Result<Microservice> {
        self.read_namespace(namespace, |ns| {
            ns.microservices
                .iter()
                .find(|m| m.name == name)
                .cloned()
                .ok_or_else(|| Error::not_found("microservice", name))
        })
    }

    /// Add a microservice
    ///
    /// Its agent must be live in the namespace and every route must name a
    /// microservice of the same application.
    pub fn add_microservice(&self, namespace: &str, microservice: Microservice) -> Result<()> {
        self.with_namespace(namespace, |ns| {
            if ns.microservices.iter().any(|m| m.name == microservice.name) {
                return Err(Error::conflict("microservice", microservice.name));
            }
            if ns.agent(&microservice.agent).is_none() {
                return Err(Error::not_found("agent", microservice.agent));
            }
            for route in &microservice.routes {
                let known = ns
                    .microservices
                    .iter()
                    .any(|m| &m.name == route && m.application == microservice.application);
                if !known {
                    return Err(Error::Input(format!(
                        "route from {} to unknown microservice {} in application {}",
                        microservice.name, route, microservice.application
                    )));
                }
            }
            ns.microservices.push(microservice);
            Ok(())
        })
    }

    /// Insert or replace a microservice by name
    pub fn update_microservice(&self, namespace: &str, microservice: Microservice) -> Result<()> {
        self.with_namespace(namespace, |ns| {
            upsert(&mut ns.microservices, microservice, |m| m.name.as_str());
            Ok(())
        })
    }

    /// Remove a microservice
    pub fn delete_microservice(&self, namespace: &str, name: &str) -> Result<()> {
        self.with_namespace(namespace, |ns| {
            remove(&mut ns.microservices, name, |m| m.name.as_str())
                .map(|_| ())
                .ok_or_else(|| Error::not_found("microservice", name))
        })
    }
}

fn upsert<T>(items: &mut Vec<T>, item: T, key: impl Fn(&T) -> &str) {
    match items.iter().position(|i| key(i) == key(&item)) {
        Some(idx) => items[idx] = item,
        None => items.push(item),
    }
}

fn remove<T>(items: &mut Vec<T>, name: &str, key: impl Fn(&T) -> &str) -> Option<T> {
    let idx = items.iter().position(|i| key(i) == name)?;
    Some(items.remove(idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::load(dir.path().join("config.yaml")).unwrap();
        (dir, store)
    }

    fn local_agent(name: &str) -> Agent {
        Agent::Local(LocalAgent {
            name: name.to_string(),
            uuid: "uuid-1".to_string(),
            host: "localhost".to_string(),
            container: Container::default(),
            config: None,
            created: Utc::now(),
        })
    }

    fn local_control_plane() -> ControlPlane {
        ControlPlane::Local(LocalControlPlane {
            iofog_user: User {
                name: "Test".to_string(),
                surname: "User".to_string(),
                email: "user@example.com".to_string(),
                password: "secret123".to_string(),
            },
            controllers: Vec::new(),
            endpoint: "localhost:51121".to_string(),
        })
    }

    #[test]
    fn test_missing_file_has_default_namespace() {
        let (_dir, store) = store();
        assert_eq!(store.default_namespace(), DEFAULT_NAMESPACE);
        assert!(store.get_namespace(DEFAULT_NAMESPACE).is_ok());
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_name("namespace", "edge-1").is_ok());
        assert!(validate_name("namespace", "Edge").is_err());
        assert!(validate_name("namespace", "-edge").is_err());
        assert!(validate_name("namespace", "").is_err());
        assert!(validate_name("namespace", &"a".repeat(64)).is_err());
    }

    #[test]
    fn test_control_plane_variant_is_fixed() {
        let (_dir, store) = store();
        store
            .update_control_plane(DEFAULT_NAMESPACE, local_control_plane())
            .unwrap();

        let remote = ControlPlane::Remote(RemoteControlPlane {
            iofog_user: local_control_plane().user().clone(),
            controllers: Vec::new(),
            endpoint: String::new(),
            database: None,
        });
        let err = store
            .update_control_plane(DEFAULT_NAMESPACE, remote)
            .unwrap_err();
        assert!(matches!(err, Error::Input(_)));

        // Same variant is an upsert
        let mut cp = local_control_plane();
        cp.set_endpoint("localhost:9999");
        store.update_control_plane(DEFAULT_NAMESPACE, cp).unwrap();
        assert_eq!(
            store.get_control_plane(DEFAULT_NAMESPACE).unwrap().endpoint(),
            "localhost:9999"
        );
    }

    #[test]
    fn test_agent_add_conflict_and_update_upserts() {
        let (_dir, store) = store();
        store.add_agent(DEFAULT_NAMESPACE, local_agent("a1")).unwrap();
        assert!(store
            .add_agent(DEFAULT_NAMESPACE, local_agent("a1"))
            .unwrap_err()
            .is_conflict());

        let mut agent = local_agent("a1");
        agent.set_uuid("uuid-2");
        store.update_agent(DEFAULT_NAMESPACE, agent).unwrap();
        let agents = store.get_agents(DEFAULT_NAMESPACE).unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].uuid(), "uuid-2");

        assert!(store
            .delete_agent(DEFAULT_NAMESPACE, "nope")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_detach_and_attach_across_namespaces() {
        let (_dir, store) = store();
        store.add_namespace("edge").unwrap();
        store.add_agent(DEFAULT_NAMESPACE, local_agent("a1")).unwrap();

        let detached = store.detach_agent(DEFAULT_NAMESPACE, "a1").unwrap();
        assert_eq!(detached.uuid(), "");
        assert!(store.get_agent(DEFAULT_NAMESPACE, "a1").is_err());
        assert!(store.get_detached_agent(DEFAULT_NAMESPACE, "a1").is_ok());

        store.attach_agent(DEFAULT_NAMESPACE, "edge", detached).unwrap();
        assert!(store.get_agent("edge", "a1").is_ok());
        assert!(store.get_detached_agents(DEFAULT_NAMESPACE).unwrap().is_empty());
    }

    #[test]
    fn test_rename_agent_moves_microservices() {
        let (_dir, store) = store();
        store.add_agent(DEFAULT_NAMESPACE, local_agent("a1")).unwrap();
        store
            .add_microservice(
                DEFAULT_NAMESPACE,
                Microservice {
                    name: "ms".to_string(),
                    uuid: String::new(),
                    agent: "a1".to_string(),
                    application: "app".to_string(),
                    image: "busybox".to_string(),
                    routes: Vec::new(),
                },
            )
            .unwrap();

        store.rename_agent(DEFAULT_NAMESPACE, "a1", "a2").unwrap();
        let ms = store.get_microservice(DEFAULT_NAMESPACE, "ms").unwrap();
        assert_eq!(ms.agent, "a2");
    }

    #[test]
    fn test_microservice_routes_are_validated() {
        let (_dir, store) = store();
        store.add_agent(DEFAULT_NAMESPACE, local_agent("a1")).unwrap();
        let msvc = |name: &str, routes: Vec<&str>| Microservice {
            name: name.to_string(),
            uuid: String::new(),
            agent: "a1".to_string(),
            application: "app".to_string(),
            image: "busybox".to_string(),
            routes: routes.into_iter().map(String::from).collect(),
        };

        let err = store
            .add_microservice(DEFAULT_NAMESPACE, msvc("b", vec!["a"]))
            .unwrap_err();
        assert!(matches!(err, Error::Input(_)));

        store
            .add_microservice(DEFAULT_NAMESPACE, msvc("a", vec![]))
            .unwrap();
        store
            .add_microservice(DEFAULT_NAMESPACE, msvc("b", vec!["a"]))
            .unwrap();
    }

    #[test]
    fn test_default_namespace_is_emptied_not_removed() {
        let (_dir, store) = store();
        store.add_agent(DEFAULT_NAMESPACE, local_agent("a1")).unwrap();
        store.delete_namespace(DEFAULT_NAMESPACE, true).unwrap();
        let ns = store.get_namespace(DEFAULT_NAMESPACE).unwrap();
        assert!(ns.agents.is_empty());
    }

    #[test]
    fn test_connectors_and_detached_agents_keep_namespace_alive() {
        let (_dir, store) = store();
        store.add_namespace("edge").unwrap();
        store
            .add_connector(
                "edge",
                Connector {
                    name: "c1".to_string(),
                    host: "localhost".to_string(),
                    ssh: None,
                    kube_config: None,
                    container: None,
                    package: None,
                    created: Utc::now(),
                },
            )
            .unwrap();
        let err = store.delete_namespace("edge", false).unwrap_err();
        assert!(matches!(err, Error::Input(_)));

        store.delete_connector("edge", "c1").unwrap();
        store.add_agent("edge", local_agent("a1")).unwrap();
        store.detach_agent("edge", "a1").unwrap();
        assert!(!store.get_namespace("edge").unwrap().is_empty());
        assert!(store.delete_namespace("edge", false).is_err());

        store.delete_detached_agent("edge", "a1").unwrap();
        store.delete_namespace("edge", false).unwrap();
    }

    #[test]
    fn test_rename_namespace_follows_default() {
        let (_dir, store) = store();
        store.add_namespace("edge").unwrap();
        store.set_default_namespace("edge").unwrap();
        store.rename_namespace("edge", "fleet").unwrap();
        assert_eq!(store.default_namespace(), "fleet");
        assert!(store.get_namespace("edge").unwrap_err().is_not_found());
        assert!(store.rename_namespace(DEFAULT_NAMESPACE, "x").is_err());
    }
}
