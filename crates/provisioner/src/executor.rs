//! The executor abstraction every backend implements

use crate::error::Result;
use async_trait::async_trait;
use resource_store::{Agent, ControlPlane, Connector, Store};
use tracing::debug;

/// Kind of resource an executor acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A namespace's control plane
    ControlPlane,
    /// An agent
    Agent,
    /// A connector
    Connector,
}

/// What an executor wants recorded once it succeeds
///
/// Executors never touch the store; the caller folds outcomes in after the
/// executors are done.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Record this control plane
    ControlPlane(ControlPlane),
    /// Record this agent
    Agent(Agent),
    /// Record this connector
    Connector(Connector),
    /// Forget the named resource
    Removed {
        /// Kind of resource removed
        kind: ResourceKind,
        /// Its name
        name: String,
    },
    /// Nothing to record
    Nothing,
}

impl Outcome {
    /// Fold this outcome into `namespace` of `store`
    pub fn apply(self, store: &Store, namespace: &str) -> Result<()> {
        match self {
            Outcome::ControlPlane(cp) => {
                debug!("Recording {} control plane in {}", cp.kind(), namespace);
                store.update_control_plane(namespace, cp)?;
            }
            Outcome::Agent(agent) => {
                debug!("Recording agent {} in {}", agent.name(), namespace);
                store.update_agent(namespace, agent)?;
            }
            Outcome::Connector(connector) => {
                debug!("Recording connector {} in {}", connector.name, namespace);
                store.update_connector(namespace, connector)?;
            }
            Outcome::Removed { kind, name } => {
                debug!("Forgetting {:?} {} in {}", kind, name, namespace);
                let removed = match kind {
                    ResourceKind::ControlPlane => store.delete_control_plane(namespace),
                    ResourceKind::Agent => store.delete_agent(namespace, &name),
                    ResourceKind::Connector => store.delete_connector(namespace, &name),
                };
                // Already gone is fine
                match removed {
                    Err(e) if e.is_not_found() => {}
                    other => other?,
                }
            }
            Outcome::Nothing => {}
        }
        Ok(())
    }
}

/// One provisioning or deprovisioning job for one resource
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run the job to completion
    async fn execute(&self) -> Result<Outcome>;

    /// Name of the resource the job acts on
    fn name(&self) -> &str;
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for Box<E> {
    async fn execute(&self) -> Result<Outcome> {
        (**self).execute().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use resource_store::{LocalAgent, DEFAULT_NAMESPACE};

    #[test]
    fn test_apply_records_and_forgets() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Store::load(dir.path().join("config.yaml")).unwrap();
        let agent = Agent::Local(LocalAgent {
            name: "a1".to_string(),
            uuid: "u1".to_string(),
            host: "localhost".to_string(),
            container: Default::default(),
            config: None,
            created: Utc::now(),
        });

        Outcome::Agent(agent).apply(&store, DEFAULT_NAMESPACE).unwrap();
        assert_eq!(store.get_agents(DEFAULT_NAMESPACE).unwrap().len(), 1);

        let removed = Outcome::Removed {
            kind: ResourceKind::Agent,
            name: "a1".to_string(),
        };
        removed.clone().apply(&store, DEFAULT_NAMESPACE).unwrap();
        assert!(store.get_agents(DEFAULT_NAMESPACE).unwrap().is_empty());

        // Removing twice is not an error
        removed.apply(&store, DEFAULT_NAMESPACE).unwrap();
    }
}
