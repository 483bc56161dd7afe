//! Kubernetes backend: the control plane as an operator-managed custom resource

pub mod crd;
pub mod endpoint;
pub mod operator;
pub mod resources;

use crate::error::{Error, Result};
use crate::settings::Settings;
use crate::wait::Poll;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, Resource};
use resource_store::{KubernetesControlPlane, DEFAULT_NAMESPACE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use endpoint::{resolve_endpoint, CONTROLLER_SERVICE};
use operator::OPERATOR_NAME;
use resources::{ControlPlaneResource, ControlPlaneSpec, CONTROL_PLANE_NAME};

/// Create `object` unless one of the same name exists
async fn create_if_missing<K>(api: &Api<K>, object: &K) -> Result<bool>
where
    K: Resource + Clone + Debug + Serialize + DeserializeOwned,
{
    match api.create(&PostParams::default(), object).await {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(resp)) if resp.code == 409 => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Delete `name`; absent is fine
async fn delete_if_present<K>(api: &Api<K>, name: &str) -> Result<()>
where
    K: Resource + Clone + Debug + DeserializeOwned,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            debug!("Deleted {}", name);
            Ok(())
        }
        Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// A namespace of one cluster
#[derive(Clone)]
pub struct KubernetesBackend {
    client: Client,
    namespace: String,
    settings: Settings,
}

impl KubernetesBackend {
    /// Connect with the kubeconfig at `kube_config`, acting in `namespace`
    pub async fn connect(kube_config: &Path, namespace: &str, settings: Settings) -> Result<Self> {
        let kubeconfig = Kubeconfig::read_from(kube_config)?;
        let config =
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        let client = Client::try_from(config)?;
        Ok(Self::with_client(client, namespace, settings))
    }

    /// Use an existing client
    pub fn with_client(client: Client, namespace: &str, settings: Settings) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            settings,
        }
    }

    /// Namespace this backend acts in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// Create the namespace if it does not exist
    pub async fn ensure_namespace(&self) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(self.namespace.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        if create_if_missing(&api, &ns).await? {
            info!("Created namespace {}", self.namespace);
        }
        Ok(())
    }

    /// Deploy the operator, replacing a deployment running another image
    pub async fn deploy_operator(&self, image: &str) -> Result<()> {
        let ns = self.namespace.as_str();
        create_if_missing(&self.api::<ServiceAccount>(), &operator::service_account(ns)).await?;
        create_if_missing(&self.api::<Role>(), &operator::role(ns)).await?;
        create_if_missing(&self.api::<RoleBinding>(), &operator::role_binding(ns)).await?;

        let deployments = self.api::<Deployment>();
        if let Some(existing) = deployments.get_opt(OPERATOR_NAME).await? {
            if operator::deployed_image(&existing) == Some(image) {
                debug!("Operator in {} already runs {}", ns, image);
                return Ok(());
            }
            info!("Replacing stale operator deployment in {}", ns);
            delete_if_present(&deployments, OPERATOR_NAME).await?;
            self.kube_poll()
                .until("old operator deployment to go away", |_| {
                    let deployments = deployments.clone();
                    async move {
                        Ok::<_, Error>(deployments.get_opt(OPERATOR_NAME).await?.is_none().then_some(()))
                    }
                })
                .await?;
        }

        info!("Deploying operator {} in {}", image, ns);
        create_if_missing(&deployments, &operator::deployment(ns, image)).await?;
        Ok(())
    }

    /// Create or update the namespace's ControlPlane resource
    pub async fn apply_control_plane(&self, spec: ControlPlaneSpec) -> Result<()> {
        let api = self.api::<ControlPlaneResource>();
        let mut desired = ControlPlaneResource::new(CONTROL_PLANE_NAME, spec);
        desired.metadata.namespace = Some(self.namespace.clone());

        match api.get_opt(CONTROL_PLANE_NAME).await? {
            Some(existing) => {
                info!("Updating control plane resource in {}", self.namespace);
                desired.metadata.resource_version = existing.metadata.resource_version;
                api.replace(CONTROL_PLANE_NAME, &PostParams::default(), &desired)
                    .await?;
            }
            None => {
                info!("Creating control plane resource in {}", self.namespace);
                api.create(&PostParams::default(), &desired).await?;
            }
        }
        Ok(())
    }

    /// Deploy a control plane and return its Controller endpoint
    pub async fn create_control_plane(&self, control_plane: &KubernetesControlPlane) -> Result<String> {
        self.ensure_namespace().await?;
        crd::ensure_all(&self.client).await?;

        let operator_image = if control_plane.images.operator.is_empty() {
            operator::OPERATOR_IMAGE
        } else {
            control_plane.images.operator.as_str()
        };
        self.deploy_operator(operator_image).await?;

        self.apply_control_plane(ControlPlaneSpec {
            replicas: control_plane.replicas.clone(),
            database: control_plane.database.clone(),
            user: control_plane.iofog_user.clone(),
            images: control_plane.images.clone(),
            services: control_plane.services.clone(),
        })
        .await?;

        self.wait_ready().await?;
        self.get_controller_endpoint().await
    }

    fn kube_poll(&self) -> Poll {
        let interval = self.settings.kube_poll_interval.max(Duration::from_millis(1));
        let attempts = (self.settings.kube_timeout().as_millis() / interval.as_millis()).max(1);
        Poll::new(u32::try_from(attempts).unwrap_or(u32::MAX), interval)
            .with_deadline(self.settings.deadline)
    }

    async fn poll_ready(&self) -> Result<()> {
        let api = self.api::<ControlPlaneResource>();
        loop {
            match api.get_opt(CONTROL_PLANE_NAME).await? {
                Some(cp) if cp.is_ready() => {
                    info!("Control plane in {} is ready", self.namespace);
                    return Ok(());
                }
                Some(_) => debug!("Control plane in {} not ready yet", self.namespace),
                None => warn!("Control plane resource in {} disappeared", self.namespace),
            }
            tokio::time::sleep(self.settings.kube_poll_interval).await;
        }
    }

    /// Forward new operator log lines at debug level until cancelled
    async fn tail_operator_logs(&self) {
        let pods = self.api::<Pod>();
        let since = i64::try_from(self.settings.kube_poll_interval.as_secs())
            .unwrap_or(i64::MAX)
            .max(1);
        loop {
            tokio::time::sleep(self.settings.kube_poll_interval).await;
            let listed = match pods
                .list(&ListParams::default().labels(&format!("name={OPERATOR_NAME}")))
                .await
            {
                Ok(list) => list,
                Err(e) => {
                    debug!("Cannot list operator pods: {}", e);
                    continue;
                }
            };
            for pod in listed.items {
                let Some(name) = pod.metadata.name else { continue };
                let params = LogParams {
                    since_seconds: Some(since),
                    ..Default::default()
                };
                match pods.logs(&name, &params).await {
                    Ok(logs) => {
                        for line in logs.lines().filter(|l| !l.trim().is_empty()) {
                            debug!("{}: {}", name, line);
                        }
                    }
                    Err(e) => debug!("Cannot read logs of {}: {}", name, e),
                }
            }
        }
    }

    /// Wait until the operator reports the control plane ready
    pub async fn wait_ready(&self) -> Result<()> {
        let timeout = self.settings.kube_timeout();
        info!("Waiting up to {:?} for control plane in {}", timeout, self.namespace);
        tokio::select! {
            ready = self.poll_ready() => ready,
            _ = self.tail_operator_logs() => Err(Error::internal("operator log tail ended")),
            _ = tokio::time::sleep(timeout) => Err(Error::internal(format!(
                "timed out after {}s waiting for control plane in {}",
                timeout.as_secs(),
                self.namespace
            ))),
        }
    }

    /// Externally reachable `host:port` of the Controller service
    pub async fn get_controller_endpoint(&self) -> Result<String> {
        let services = self.api::<Service>();
        let nodes: Api<Node> = Api::all(self.client.clone());
        self.kube_poll()
            .until(&format!("controller endpoint in {}", self.namespace), |_| {
                let services = services.clone();
                let nodes = nodes.clone();
                async move {
                    let Some(service) = services.get_opt(CONTROLLER_SERVICE).await? else {
                        return Ok::<_, Error>(None);
                    };
                    let nodes = nodes.list(&ListParams::default()).await?.items;
                    resolve_endpoint(&service, &nodes)
                }
            })
            .await
    }

    /// Whether the namespace holds a ControlPlane resource
    pub async fn exists_in_namespace(&self) -> Result<bool> {
        Ok(self
            .api::<ControlPlaneResource>()
            .get_opt(CONTROL_PLANE_NAME)
            .await?
            .is_some())
    }

    /// Remove the control plane, the operator and the namespace
    ///
    /// The `default` namespace itself is kept.
    pub async fn delete_control_plane(&self) -> Result<()> {
        info!("Deleting control plane in {}", self.namespace);
        delete_if_present(&self.api::<ControlPlaneResource>(), CONTROL_PLANE_NAME).await?;
        delete_if_present(&self.api::<Deployment>(), OPERATOR_NAME).await?;
        delete_if_present(&self.api::<RoleBinding>(), OPERATOR_NAME).await?;
        delete_if_present(&self.api::<Role>(), OPERATOR_NAME).await?;
        delete_if_present(&self.api::<ServiceAccount>(), OPERATOR_NAME).await?;

        if self.namespace != DEFAULT_NAMESPACE {
            let namespaces: Api<Namespace> = Api::all(self.client.clone());
            delete_if_present(&namespaces, &self.namespace).await?;
        }
        Ok(())
    }
}
