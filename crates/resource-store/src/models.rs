//! Data models for the resource store
//!
//! Everything here is plain data. Presence of a resource in a namespace means
//! it was deployed at some point; its health is never cached and must be
//! queried live.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Name of the namespace that always exists
pub const DEFAULT_NAMESPACE: &str = "default";

/// Root of the store document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Namespace used when a command names none
    pub default_namespace: String,
    /// All known namespaces
    #[serde(default)]
    pub namespaces: Vec<Namespace>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            namespaces: vec![Namespace::new(DEFAULT_NAMESPACE)],
        }
    }
}

/// A named grouping of one control plane and the resources attached to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
    /// Unique name
    pub name: String,
    /// When the namespace was created
    pub created: DateTime<Utc>,
    /// The namespace's control plane, if deployed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane: Option<ControlPlane>,
    /// Agents provisioned against the control plane
    #[serde(default)]
    pub agents: Vec<Agent>,
    /// Connectors registered with the control plane
    #[serde(default)]
    pub connectors: Vec<Connector>,
    /// Microservices deployed to this namespace's agents
    #[serde(default)]
    pub microservices: Vec<Microservice>,
    /// Resources known locally but unbound from any control plane
    #[serde(default)]
    pub detached: Detached,
}

impl Namespace {
    /// A new, empty namespace created now
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created: Utc::now(),
            control_plane: None,
            agents: Vec::new(),
            connectors: Vec::new(),
            microservices: Vec::new(),
            detached: Detached::default(),
        }
    }

    /// True when nothing is deployed in the namespace, detached pools included
    pub fn is_empty(&self) -> bool {
        self.control_plane.is_none()
            && self.agents.is_empty()
            && self.connectors.is_empty()
            && self.microservices.is_empty()
            && self.detached.agents.is_empty()
            && self.detached.connectors.is_empty()
    }

    /// Look up a live agent
    pub fn agent(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.name() == name)
    }

    /// Look up a live connector
    pub fn connector(&self, name: &str) -> Option<&Connector> {
        self.connectors.iter().find(|c| c.name == name)
    }
}

/// Detached resource pools
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detached {
    /// Agents that were deprovisioned but not uninstalled
    #[serde(default)]
    pub agents: Vec<Agent>,
    /// Connectors that were unregistered but not uninstalled
    #[serde(default)]
    pub connectors: Vec<Connector>,
}

/// Controller admin credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// First name
    pub name: String,
    /// Last name
    pub surname: String,
    /// Login email
    pub email: String,
    /// Login password
    pub password: String,
}

/// SSH connection details for a remote host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ssh {
    /// Login user
    pub user: String,
    /// Private key path
    pub key_file: PathBuf,
    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

fn default_ssh_port() -> u16 {
    22
}

/// Package source for remote installs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    /// Version to install; empty means latest
    #[serde(default)]
    pub version: String,
    /// Package repository override
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo: String,
    /// Repository token
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
}

/// Container image for local deployments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Image reference
    pub image: String,
}

/// External database for a control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    /// Provider, e.g. `postgres` or `mysql`
    pub provider: String,
    /// Database host
    pub host: String,
    /// Database port
    pub port: u16,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Database name
    pub database_name: String,
}

/// One Controller instance of a control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Controller {
    /// Unique name within the control plane
    pub name: String,
    /// Host the Controller runs on
    pub host: String,
    /// SSH details for remote Controllers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<Ssh>,
    /// Externally reachable API endpoint
    #[serde(default)]
    pub endpoint: String,
    /// Package for remote installs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<Package>,
    /// Image for local installs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,
    /// When the Controller was deployed
    pub created: DateTime<Utc>,
}

/// Control plane of a namespace, one variant per deployment target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ControlPlane {
    /// Controller in a local container
    Local(LocalControlPlane),
    /// Controllers on remote hosts
    Remote(RemoteControlPlane),
    /// Controllers managed by the in-cluster operator
    Kubernetes(KubernetesControlPlane),
}

/// Control plane running in the local container engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalControlPlane {
    /// Admin credentials
    pub iofog_user: User,
    /// The single local Controller
    #[serde(default)]
    pub controllers: Vec<Controller>,
    /// API endpoint
    #[serde(default)]
    pub endpoint: String,
}

/// Control plane on SSH-reachable hosts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteControlPlane {
    /// Admin credentials
    pub iofog_user: User,
    /// One Controller per host
    #[serde(default)]
    pub controllers: Vec<Controller>,
    /// API endpoint of the first Controller
    #[serde(default)]
    pub endpoint: String,
    /// Optional external database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<Database>,
}

/// Control plane deployed through the Kubernetes operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesControlPlane {
    /// Admin credentials
    pub iofog_user: User,
    /// Controller pods, recorded by name
    #[serde(default)]
    pub controllers: Vec<Controller>,
    /// Resolved external endpoint
    #[serde(default)]
    pub endpoint: String,
    /// Kubeconfig for the cluster
    pub kube_config: PathBuf,
    /// Replica counts
    #[serde(default)]
    pub replicas: Replicas,
    /// Image overrides
    #[serde(default)]
    pub images: Images,
    /// Service exposure
    #[serde(default)]
    pub services: Services,
    /// Optional external database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<Database>,
}

/// Replica counts for the Kubernetes control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replicas {
    /// Controller replicas
    pub controller: i32,
}

impl Default for Replicas {
    fn default() -> Self {
        Self { controller: 1 }
    }
}

/// Image overrides for the Kubernetes control plane; empty means default
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Images {
    /// Operator image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operator: String,
    /// Controller image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub controller: String,
    /// Router image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub router: String,
    /// Port manager image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub port_manager: String,
    /// Proxy image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub proxy: String,
}

/// How Kubernetes services are exposed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Services {
    /// Controller service
    #[serde(default)]
    pub controller: ServiceSpec,
    /// Router service
    #[serde(default)]
    pub router: ServiceSpec,
    /// Proxy service
    #[serde(default)]
    pub proxy: ServiceSpec,
}

/// One service's exposure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// `LoadBalancer`, `NodePort` or `ClusterIP`; empty means `LoadBalancer`
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub service_type: String,
    /// Static address for LoadBalancer services
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
}

impl ControlPlane {
    /// Variant name, for messages
    pub fn kind(&self) -> &'static str {
        match self {
            ControlPlane::Local(_) => "Local",
            ControlPlane::Remote(_) => "Remote",
            ControlPlane::Kubernetes(_) => "Kubernetes",
        }
    }

    /// Admin credentials
    pub fn user(&self) -> &User {
        match self {
            ControlPlane::Local(cp) => &cp.iofog_user,
            ControlPlane::Remote(cp) => &cp.iofog_user,
            ControlPlane::Kubernetes(cp) => &cp.iofog_user,
        }
    }

    /// API endpoint
    pub fn endpoint(&self) -> &str {
        match self {
            ControlPlane::Local(cp) => &cp.endpoint,
            ControlPlane::Remote(cp) => &cp.endpoint,
            ControlPlane::Kubernetes(cp) => &cp.endpoint,
        }
    }

    /// Replace the API endpoint
    pub fn set_endpoint(&mut self, endpoint: impl Into<String>) {
        let endpoint = endpoint.into();
        match self {
            ControlPlane::Local(cp) => cp.endpoint = endpoint,
            ControlPlane::Remote(cp) => cp.endpoint = endpoint,
            ControlPlane::Kubernetes(cp) => cp.endpoint = endpoint,
        }
    }

    /// Controllers of the control plane
    pub fn controllers(&self) -> &[Controller] {
        match self {
            ControlPlane::Local(cp) => &cp.controllers,
            ControlPlane::Remote(cp) => &cp.controllers,
            ControlPlane::Kubernetes(cp) => &cp.controllers,
        }
    }

    /// Mutable Controllers of the control plane
    pub fn controllers_mut(&mut self) -> &mut Vec<Controller> {
        match self {
            ControlPlane::Local(cp) => &mut cp.controllers,
            ControlPlane::Remote(cp) => &mut cp.controllers,
            ControlPlane::Kubernetes(cp) => &mut cp.controllers,
        }
    }

    /// True when both are the same variant
    pub fn same_kind(&self, other: &ControlPlane) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Agent configuration passed to the Controller on registration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Fog type: `auto`, `x86` or `arm`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fog_type: Option<String>,
    /// Latitude
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Longitude
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One overridable install script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    /// File name inside the scripts directory
    pub name: String,
    /// Arguments passed to the script
    #[serde(default)]
    pub args: Vec<String>,
}

/// User-supplied replacements for the agent's install scripts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentScripts {
    /// Local directory holding the scripts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Dependency installation script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deps: Option<Script>,
    /// Agent installation script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<Script>,
    /// Agent removal script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uninstall: Option<Script>,
}

/// An edge node, one variant per deployment target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Agent {
    /// Agent in a local container
    Local(LocalAgent),
    /// Agent on an SSH-reachable host
    Remote(RemoteAgent),
}

/// Agent running in the local container engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalAgent {
    /// Unique name within the namespace
    pub name: String,
    /// UUID assigned by the Controller once provisioned
    #[serde(default)]
    pub uuid: String,
    /// Always a loopback host
    pub host: String,
    /// Image to run
    #[serde(default)]
    pub container: Container,
    /// Registration details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<AgentConfig>,
    /// When the agent was deployed
    pub created: DateTime<Utc>,
}

/// Agent installed on a remote host over SSH
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAgent {
    /// Unique name within the namespace
    pub name: String,
    /// UUID assigned by the Controller once provisioned
    #[serde(default)]
    pub uuid: String,
    /// Host address
    pub host: String,
    /// SSH details
    pub ssh: Ssh,
    /// Package to install
    #[serde(default)]
    pub package: Package,
    /// Script overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts: Option<AgentScripts>,
    /// Registration details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<AgentConfig>,
    /// When the agent was deployed
    pub created: DateTime<Utc>,
}

impl Agent {
    /// Agent name
    pub fn name(&self) -> &str {
        match self {
            Agent::Local(a) => &a.name,
            Agent::Remote(a) => &a.name,
        }
    }

    /// Rename the agent
    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        match self {
            Agent::Local(a) => a.name = name,
            Agent::Remote(a) => a.name = name,
        }
    }

    /// Controller-assigned UUID; empty when not provisioned
    pub fn uuid(&self) -> &str {
        match self {
            Agent::Local(a) => &a.uuid,
            Agent::Remote(a) => &a.uuid,
        }
    }

    /// Record the Controller-assigned UUID
    pub fn set_uuid(&mut self, uuid: impl Into<String>) {
        let uuid = uuid.into();
        match self {
            Agent::Local(a) => a.uuid = uuid,
            Agent::Remote(a) => a.uuid = uuid,
        }
    }

    /// Host the agent runs on
    pub fn host(&self) -> &str {
        match self {
            Agent::Local(a) => &a.host,
            Agent::Remote(a) => &a.host,
        }
    }

    /// Registration details
    pub fn config(&self) -> Option<&AgentConfig> {
        match self {
            Agent::Local(a) => a.config.as_ref(),
            Agent::Remote(a) => a.config.as_ref(),
        }
    }

    /// When the agent was deployed
    pub fn created(&self) -> DateTime<Utc> {
        match self {
            Agent::Local(a) => a.created,
            Agent::Remote(a) => a.created,
        }
    }

    /// Variant name, for messages
    pub fn kind(&self) -> &'static str {
        match self {
            Agent::Local(_) => "Local",
            Agent::Remote(_) => "Remote",
        }
    }
}

/// Message-routing service bridging agents and external networks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    /// Unique name within the namespace
    pub name: String,
    /// Host address
    pub host: String,
    /// SSH details for remote connectors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<Ssh>,
    /// Kubeconfig for in-cluster connectors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_config: Option<PathBuf>,
    /// Image for local connectors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,
    /// Package for remote connectors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<Package>,
    /// When the connector was deployed
    pub created: DateTime<Utc>,
}

/// A workload bound to one agent and one application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Microservice {
    /// Name, unique within its application
    pub name: String,
    /// Controller-assigned UUID
    #[serde(default)]
    pub uuid: String,
    /// Agent it runs on
    pub agent: String,
    /// Application it belongs to
    pub application: String,
    /// Image it runs
    #[serde(default)]
    pub image: String,
    /// Names of microservices it routes to
    #[serde(default)]
    pub routes: Vec<String>,
}
