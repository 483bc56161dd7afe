use super::{summarize, ConnectionArgs, PackageArgs, Session};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use provisioner::{default_user, select_target, MicroserviceSpec, Target};
use resource_store::{
    Agent, AgentConfig, Connector, Container, ControlPlane, Controller, Database, Images,
    KubernetesControlPlane, LocalAgent, LocalControlPlane, RemoteAgent, RemoteControlPlane,
    Replicas, ServiceSpec, Services, User,
};

#[derive(Subcommand)]
pub enum DeployCommands {
    /// Deploy or redeploy the namespace's control plane
    Controlplane(ControlPlaneArgs),

    /// Deploy and provision agents
    Agent(AgentArgs),

    /// Deploy and register connectors
    Connector(ConnectorArgs),

    /// Run a catalog item as a microservice on an agent
    Microservice(MicroserviceArgs),
}

#[derive(Args, Debug, Default)]
pub struct UserArgs {
    /// Admin login email; generated when unset
    #[arg(long)]
    email: Option<String>,

    /// Admin password; generated when unset
    #[arg(long)]
    password: Option<String>,

    /// Admin first name
    #[arg(long)]
    first_name: Option<String>,

    /// Admin last name
    #[arg(long)]
    last_name: Option<String>,
}

impl UserArgs {
    fn user(&self) -> User {
        let mut user = default_user();
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(password) = &self.password {
            user.password = password.clone();
        }
        if let Some(name) = &self.first_name {
            user.name = name.clone();
        }
        if let Some(surname) = &self.last_name {
            user.surname = surname.clone();
        }
        user
    }
}

#[derive(Args, Debug, Default)]
pub struct DatabaseArgs {
    /// External database provider, e.g. postgres or mysql
    #[arg(long)]
    db_provider: Option<String>,

    #[arg(long)]
    db_host: Option<String>,

    #[arg(long)]
    db_port: Option<u16>,

    #[arg(long)]
    db_user: Option<String>,

    #[arg(long)]
    db_password: Option<String>,

    #[arg(long)]
    db_name: Option<String>,
}

impl DatabaseArgs {
    fn database(&self) -> Result<Option<Database>> {
        let Some(provider) = &self.db_provider else {
            return Ok(None);
        };
        let host = self.db_host.clone().context("--db-host is required with --db-provider")?;
        let port = self.db_port.context("--db-port is required with --db-provider")?;
        Ok(Some(Database {
            provider: provider.clone(),
            host,
            port,
            user: self.db_user.clone().unwrap_or_default(),
            password: self.db_password.clone().unwrap_or_default(),
            database_name: self.db_name.clone().unwrap_or_default(),
        }))
    }
}

#[derive(Args, Debug, Default)]
pub struct ControlPlaneArgs {
    /// Controller host; repeat for one Controller per host
    #[arg(long = "host")]
    hosts: Vec<String>,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(flatten)]
    package: PackageArgs,

    #[command(flatten)]
    user: UserArgs,

    #[command(flatten)]
    database: DatabaseArgs,

    /// Controller image for local and cluster deployments
    #[arg(long)]
    image: Option<String>,

    /// Operator image for cluster deployments
    #[arg(long)]
    operator_image: Option<String>,

    /// Controller replicas for cluster deployments
    #[arg(long, default_value_t = 1)]
    replicas: i32,

    /// Controller service type for cluster deployments
    #[arg(long)]
    service_type: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct AgentArgs {
    /// Agent names
    #[arg(required = true)]
    names: Vec<String>,

    /// Host per agent, in the order of the names; one host is used for all
    #[arg(long = "host", required = true)]
    hosts: Vec<String>,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(flatten)]
    package: PackageArgs,

    /// Agent image for local deployments
    #[arg(long)]
    image: Option<String>,

    /// Fog type: auto, x86 or arm
    #[arg(long)]
    fog_type: Option<String>,

    /// Description registered with the Controller
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct ConnectorArgs {
    /// Connector names
    #[arg(required = true)]
    names: Vec<String>,

    /// Host per connector, in the order of the names; one host is used for all
    #[arg(long = "host", required = true)]
    hosts: Vec<String>,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(flatten)]
    package: PackageArgs,

    /// Connector image for local deployments
    #[arg(long)]
    image: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct MicroserviceArgs {
    /// Microservice name
    name: String,

    /// Agent to run it on
    #[arg(long)]
    agent: String,

    /// Application to add it to; created when missing
    #[arg(long)]
    application: String,

    /// Catalog item to run
    #[arg(long)]
    image: String,

    /// Config as a JSON object
    #[arg(long)]
    config: Option<String>,

    /// Microservice of the same application to route to; repeatable
    #[arg(long = "route")]
    routes: Vec<String>,
}

fn microservice(args: MicroserviceArgs) -> Result<MicroserviceSpec> {
    if let Some(config) = &args.config {
        let value: serde_json::Value =
            serde_json::from_str(config).context("--config is not valid JSON")?;
        if !value.is_object() {
            bail!("--config must be a JSON object");
        }
    }
    Ok(MicroserviceSpec {
        name: args.name,
        agent: args.agent,
        application: args.application,
        image: args.image,
        config: args.config,
        routes: args.routes,
    })
}

/// Match every name with its host
fn pair_hosts(names: &[String], hosts: &[String]) -> Result<Vec<(String, String)>> {
    match hosts {
        [] => bail!("no host given"),
        [host] => Ok(names.iter().map(|n| (n.clone(), host.clone())).collect()),
        _ if hosts.len() == names.len() => Ok(names.iter().cloned().zip(hosts.iter().cloned()).collect()),
        _ => bail!("{} names but {} hosts", names.len(), hosts.len()),
    }
}

fn controller(name: &str, host: &str, now: chrono::DateTime<Utc>) -> Controller {
    Controller {
        name: name.to_string(),
        host: host.to_string(),
        ssh: None,
        endpoint: String::new(),
        package: None,
        container: None,
        created: now,
    }
}

fn control_plane(args: &ControlPlaneArgs) -> Result<ControlPlane> {
    let now = Utc::now();
    let first = args.hosts.first().cloned();
    let iofog_user = args.user.user();
    let image = args.image.clone().unwrap_or_default();

    let control_plane = match select_target(&args.connection.options_for(first))? {
        Target::Local => {
            if args.hosts.len() > 1 {
                bail!("a local control plane has exactly one Controller");
            }
            let mut local = controller("local", "localhost", now);
            local.container = Some(Container { image });
            ControlPlane::Local(LocalControlPlane {
                iofog_user,
                controllers: vec![local],
                endpoint: String::new(),
            })
        }
        Target::Remote { .. } => {
            let mut controllers = Vec::new();
            for (i, host) in args.hosts.iter().enumerate() {
                let Target::Remote { host, ssh } =
                    select_target(&args.connection.options_for(Some(host.clone())))?
                else {
                    bail!("host {host} cannot be mixed with remote Controllers");
                };
                let mut remote = controller(&format!("controller-{}", i + 1), &host, now);
                remote.ssh = Some(ssh);
                remote.package = Some(args.package.package());
                controllers.push(remote);
            }
            ControlPlane::Remote(RemoteControlPlane {
                iofog_user,
                controllers,
                endpoint: String::new(),
                database: args.database.database()?,
            })
        }
        Target::Kubernetes { kube_config } => {
            if args.replicas < 1 {
                bail!("--replicas must be at least 1");
            }
            ControlPlane::Kubernetes(KubernetesControlPlane {
                iofog_user,
                controllers: Vec::new(),
                endpoint: String::new(),
                kube_config,
                replicas: Replicas {
                    controller: args.replicas,
                },
                images: Images {
                    operator: args.operator_image.clone().unwrap_or_default(),
                    controller: image,
                    ..Default::default()
                },
                services: Services {
                    controller: ServiceSpec {
                        service_type: args.service_type.clone().unwrap_or_default(),
                        address: String::new(),
                    },
                    ..Default::default()
                },
                database: args.database.database()?,
            })
        }
    };
    Ok(control_plane)
}

fn agents(args: &AgentArgs) -> Result<Vec<Agent>> {
    let now = Utc::now();
    let config = (args.fog_type.is_some() || args.description.is_some()).then(|| AgentConfig {
        fog_type: args.fog_type.clone(),
        description: args.description.clone(),
        ..Default::default()
    });

    pair_hosts(&args.names, &args.hosts)?
        .into_iter()
        .map(|(name, host)| -> Result<Agent> {
            let agent = match select_target(&args.connection.options_for(Some(host.clone())))? {
                Target::Local => Agent::Local(LocalAgent {
                    name,
                    uuid: String::new(),
                    host,
                    container: Container {
                        image: args.image.clone().unwrap_or_default(),
                    },
                    config: config.clone(),
                    created: now,
                }),
                Target::Remote { host, ssh } => Agent::Remote(RemoteAgent {
                    name,
                    uuid: String::new(),
                    host,
                    ssh,
                    package: args.package.package(),
                    scripts: None,
                    config: config.clone(),
                    created: now,
                }),
                Target::Kubernetes { .. } => bail!("agent {name} cannot be deployed to a cluster"),
            };
            Ok(agent)
        })
        .collect()
}

fn connectors(args: &ConnectorArgs) -> Result<Vec<Connector>> {
    let now = Utc::now();
    pair_hosts(&args.names, &args.hosts)?
        .into_iter()
        .map(|(name, host)| -> Result<Connector> {
            let mut connector = Connector {
                name,
                host,
                ssh: None,
                kube_config: None,
                container: None,
                package: None,
                created: now,
            };
            match select_target(&args.connection.options_for(Some(connector.host.clone())))? {
                Target::Local => {
                    connector.container = Some(Container {
                        image: args.image.clone().unwrap_or_default(),
                    });
                }
                Target::Remote { ssh, .. } => {
                    connector.ssh = Some(ssh);
                    connector.package = Some(args.package.package());
                }
                Target::Kubernetes { kube_config } => connector.kube_config = Some(kube_config),
            }
            Ok(connector)
        })
        .collect()
}

pub async fn run(session: &Session<'_>, command: DeployCommands) -> Result<()> {
    let lifecycle = session.lifecycle();
    let namespace = session.namespace.as_str();
    match command {
        DeployCommands::Controlplane(args) => {
            let control_plane = control_plane(&args)?;
            println!("Deploying {} control plane to {}...", control_plane.kind(), namespace);
            lifecycle.deploy_control_plane(namespace, control_plane).await?;

            let deployed = session.store.get_control_plane(namespace)?;
            println!("✓ Control plane is up at {}", deployed.endpoint());
            println!("  Login: {}", deployed.user().email);
        }
        DeployCommands::Agent(args) => {
            let report = lifecycle.deploy_agents(namespace, agents(&args)?).await?;
            summarize(&report, "Deployed")?;
        }
        DeployCommands::Connector(args) => {
            let report = lifecycle
                .deploy_connectors(namespace, connectors(&args)?)
                .await?;
            summarize(&report, "Deployed")?;
        }
        DeployCommands::Microservice(args) => {
            let spec = microservice(args)?;
            let name = spec.name.clone();
            lifecycle.deploy_microservice(namespace, spec).await?;
            println!("✓ Deployed microservice {}", name);
        }
    }
    Ok(())
}
