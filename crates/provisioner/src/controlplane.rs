//! Control plane executors, one per backend

use crate::error::{Error, Result};
use crate::executor::{Executor, Outcome, ResourceKind};
use crate::kubernetes::KubernetesBackend;
use crate::local::{layout, LocalContainers};
use crate::remote::scripts::controller_plan;
use crate::remote::{RemoteHost, TRANSIENT};
use crate::settings::Settings;
use crate::wait::Poll;
use async_trait::async_trait;
use chrono::Utc;
use controller_client::{ControllerClient, SignupRequest};
use regex::Regex;
use resource_store::{
    ControlPlane, Controller, KubernetesControlPlane, LocalControlPlane, RemoteControlPlane, User,
};
use tracing::{debug, info};

/// Controller status output once the API is serving
pub const CONTROLLER_ONLINE: &str = r#""status"\s*:\s*"online""#;

/// Credentials generated when the user supplies none
pub fn default_user() -> User {
    let password = uuid::Uuid::new_v4().simple().to_string();
    User {
        name: "Edge".to_string(),
        surname: "Admin".to_string(),
        email: "admin@edgectl.local".to_string(),
        password,
    }
}

/// How executors reach and authenticate with a namespace's Controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerAccess {
    /// `host:port` or URL of the Controller
    pub endpoint: String,
    /// Login email
    pub email: String,
    /// Login password
    pub password: String,
    /// The Controller runs in the local container engine
    pub local: bool,
}

impl ControllerAccess {
    /// Access details of a deployed control plane
    pub fn of(control_plane: &ControlPlane) -> Result<Self> {
        if control_plane.endpoint().is_empty() {
            return Err(Error::input(
                "the control plane has no endpoint; deploy it before its agents",
            ));
        }
        Ok(Self {
            endpoint: control_plane.endpoint().to_string(),
            email: control_plane.user().email.clone(),
            password: control_plane.user().password.clone(),
            local: matches!(control_plane, ControlPlane::Local(_)),
        })
    }

    /// Authenticated client
    pub async fn client(&self) -> Result<ControllerClient> {
        Ok(ControllerClient::connect(&self.endpoint, &self.email, &self.password).await?)
    }
}

/// Poll the Controller's status endpoint until it reports online
async fn wait_for_controller(endpoint: &str, poll: Poll) -> Result<()> {
    let client = ControllerClient::new(endpoint)?;
    poll.until(&format!("controller at {endpoint}"), |attempt| {
        let client = &client;
        async move {
            match client.status().await {
                Ok(status) if status.is_online() => Ok(Some(())),
                Ok(status) => {
                    debug!("Attempt {}: controller status {}", attempt, status.status);
                    Ok(None)
                }
                // Not listening yet
                Err(controller_client::Error::Request(e)) => {
                    debug!("Attempt {}: {}", attempt, e);
                    Ok(None)
                }
                Err(e) => Err(Error::from(e)),
            }
        }
    })
    .await
}

/// Create the admin account, then check the credentials work
async fn bootstrap_user(endpoint: &str, user: &User) -> Result<()> {
    let mut client = ControllerClient::new(endpoint)?;
    let signup = SignupRequest {
        first_name: user.name.clone(),
        last_name: user.surname.clone(),
        email: user.email.clone(),
        password: user.password.clone(),
    };
    match client.signup(&signup).await {
        Ok(()) => info!("Created user {} on {}", user.email, endpoint),
        Err(e) if e.is_conflict() => debug!("User {} already exists on {}", user.email, endpoint),
        Err(e) => return Err(e.into()),
    }
    client.login(&user.email, &user.password).await?;
    Ok(())
}

/// Deploys a Controller into the local container engine
pub struct LocalControlPlaneExecutor {
    name: String,
    control_plane: LocalControlPlane,
    settings: Settings,
}

impl LocalControlPlaneExecutor {
    /// Executor for `control_plane` of `namespace`
    pub fn new(namespace: &str, control_plane: LocalControlPlane, settings: Settings) -> Self {
        Self {
            name: format!("{namespace}/controlplane"),
            control_plane,
            settings,
        }
    }
}

#[async_trait]
impl Executor for LocalControlPlaneExecutor {
    async fn execute(&self) -> Result<Outcome> {
        let mut control_plane = self.control_plane.clone();
        if control_plane.controllers.len() > 1 {
            return Err(Error::input("a local control plane runs exactly one controller"));
        }

        let containers = LocalContainers::connect(self.settings.clone())?;
        let image = control_plane
            .controllers
            .first()
            .and_then(|c| c.container.as_ref())
            .map(|c| c.image.clone())
            .unwrap_or_default();
        containers
            .deploy_container(&layout::controller(&image))
            .await?;

        let endpoint = format!("localhost:{}", layout::CONTROLLER_PORT);
        wait_for_controller(&endpoint, Poll::container(&self.settings)).await?;
        bootstrap_user(&endpoint, &control_plane.iofog_user).await?;

        if control_plane.controllers.is_empty() {
            control_plane.controllers.push(Controller {
                name: "local".to_string(),
                host: "localhost".to_string(),
                ssh: None,
                endpoint: String::new(),
                package: None,
                container: None,
                created: Utc::now(),
            });
        }
        for controller in &mut control_plane.controllers {
            controller.endpoint = endpoint.clone();
        }
        control_plane.endpoint = endpoint;
        Ok(Outcome::ControlPlane(ControlPlane::Local(control_plane)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Installs Controllers on remote hosts over SSH
pub struct RemoteControlPlaneExecutor {
    name: String,
    control_plane: RemoteControlPlane,
    settings: Settings,
}

impl RemoteControlPlaneExecutor {
    /// Executor for `control_plane` of `namespace`
    pub fn new(namespace: &str, control_plane: RemoteControlPlane, settings: Settings) -> Self {
        Self {
            name: format!("{namespace}/controlplane"),
            control_plane,
            settings,
        }
    }

    async fn install(&self, controller: &Controller) -> Result<String> {
        let ssh = controller.ssh.as_ref().ok_or_else(|| {
            Error::input(format!("controller {} needs SSH details", controller.name))
        })?;
        let plan = controller_plan(&controller.package.clone().unwrap_or_default());
        let online = Regex::new(CONTROLLER_ONLINE)
            .map_err(|e| Error::internal(format!("bad readiness pattern: {e}")))?;

        let session = RemoteHost::new(&controller.host, ssh, self.settings.clone())
            .connect()
            .await?;
        let installed = async {
            session.install(&plan).await?;
            session
                .run_until(
                    &online,
                    &format!(
                        "curl --silent --max-time 5 http://localhost:{}/api/v3/status",
                        layout::CONTROLLER_PORT
                    ),
                    TRANSIENT,
                )
                .await
        }
        .await;
        session.close_with(installed).await?;

        info!("Controller {} is online on {}", controller.name, controller.host);
        Ok(format!("{}:{}", controller.host, layout::CONTROLLER_PORT))
    }
}

#[async_trait]
impl Executor for RemoteControlPlaneExecutor {
    async fn execute(&self) -> Result<Outcome> {
        let mut control_plane = self.control_plane.clone();
        if control_plane.controllers.is_empty() {
            return Err(Error::input("a remote control plane needs at least one controller"));
        }

        for controller in &mut control_plane.controllers {
            controller.endpoint = self.install(controller).await?;
        }

        let endpoint = control_plane.controllers[0].endpoint.clone();
        bootstrap_user(&endpoint, &control_plane.iofog_user).await?;
        control_plane.endpoint = endpoint;
        Ok(Outcome::ControlPlane(ControlPlane::Remote(control_plane)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Deploys a control plane through the in-cluster operator
pub struct KubernetesControlPlaneExecutor {
    name: String,
    namespace: String,
    control_plane: KubernetesControlPlane,
    settings: Settings,
}

impl KubernetesControlPlaneExecutor {
    /// Executor for `control_plane` of `namespace`
    pub fn new(namespace: &str, control_plane: KubernetesControlPlane, settings: Settings) -> Self {
        Self {
            name: format!("{namespace}/controlplane"),
            namespace: namespace.to_string(),
            control_plane,
            settings,
        }
    }
}

#[async_trait]
impl Executor for KubernetesControlPlaneExecutor {
    async fn execute(&self) -> Result<Outcome> {
        let mut control_plane = self.control_plane.clone();
        let backend = KubernetesBackend::connect(
            &control_plane.kube_config,
            &self.namespace,
            self.settings.clone(),
        )
        .await?;

        let endpoint = backend.create_control_plane(&control_plane).await?;
        info!("Control plane in {} serves {}", self.namespace, endpoint);
        wait_for_controller(&endpoint, Poll::container(&self.settings)).await?;
        bootstrap_user(&endpoint, &control_plane.iofog_user).await?;

        let replicas = control_plane.replicas.controller.max(1);
        control_plane.controllers = (0..replicas)
            .map(|i| Controller {
                name: format!("controller-{i}"),
                host: endpoint.clone(),
                ssh: None,
                endpoint: endpoint.clone(),
                package: None,
                container: None,
                created: Utc::now(),
            })
            .collect();
        control_plane.endpoint = endpoint;
        Ok(Outcome::ControlPlane(ControlPlane::Kubernetes(control_plane)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Tears a control plane down on whichever backend it runs
pub struct DeleteControlPlaneExecutor {
    name: String,
    namespace: String,
    control_plane: ControlPlane,
    settings: Settings,
}

impl DeleteControlPlaneExecutor {
    /// Executor removing `control_plane` from `namespace`
    pub fn new(namespace: &str, control_plane: ControlPlane, settings: Settings) -> Self {
        Self {
            name: format!("{namespace}/controlplane"),
            namespace: namespace.to_string(),
            control_plane,
            settings,
        }
    }

    async fn uninstall_remote(&self, controller: &Controller) -> Result<()> {
        let Some(ssh) = controller.ssh.as_ref() else {
            return Err(Error::input(format!(
                "controller {} has no SSH details",
                controller.name
            )));
        };
        let plan = controller_plan(&controller.package.clone().unwrap_or_default());
        let session = RemoteHost::new(&controller.host, ssh, self.settings.clone())
            .connect()
            .await?;
        let removed = session.uninstall(&plan).await;
        session.close_with(removed).await
    }
}

#[async_trait]
impl Executor for DeleteControlPlaneExecutor {
    async fn execute(&self) -> Result<Outcome> {
        match &self.control_plane {
            ControlPlane::Local(_) => {
                LocalContainers::connect(self.settings.clone())?
                    .clean_container(layout::CONTROLLER_CONTAINER)
                    .await?;
            }
            ControlPlane::Remote(remote) => {
                for controller in &remote.controllers {
                    self.uninstall_remote(controller).await?;
                }
            }
            ControlPlane::Kubernetes(kube) => {
                KubernetesBackend::connect(&kube.kube_config, &self.namespace, self.settings.clone())
                    .await?
                    .delete_control_plane()
                    .await?;
            }
        }
        info!("Deleted {} control plane of {}", self.control_plane.kind(), self.namespace);
        Ok(Outcome::Removed {
            kind: ResourceKind::ControlPlane,
            name: self.namespace.clone(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(endpoint: &str) -> ControlPlane {
        ControlPlane::Local(LocalControlPlane {
            iofog_user: User {
                name: "a".to_string(),
                surname: "b".to_string(),
                email: "a@b.c".to_string(),
                password: "secret".to_string(),
            },
            controllers: Vec::new(),
            endpoint: endpoint.to_string(),
        })
    }

    #[test]
    fn test_default_user_passwords_differ() {
        let a = default_user();
        let b = default_user();
        assert_eq!(a.email, b.email);
        assert_ne!(a.password, b.password);
        assert_eq!(a.password.len(), 32);
    }

    #[test]
    fn test_access_requires_endpoint() {
        let err = ControllerAccess::of(&local("")).unwrap_err();
        assert!(matches!(err, Error::Input(_)));

        let access = ControllerAccess::of(&local("localhost:51121")).unwrap();
        assert!(access.local);
        assert_eq!(access.email, "a@b.c");
    }

    #[test]
    fn test_online_pattern() {
        let online = Regex::new(CONTROLLER_ONLINE).unwrap();
        assert!(online.is_match(r#"{"status": "online","timestamp":1}"#));
        assert!(!online.is_match(r#"{"status":"starting"}"#));
    }
}
