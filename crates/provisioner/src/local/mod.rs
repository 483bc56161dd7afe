//! Local backend: containers on the local Docker engine

pub mod layout;

use crate::error::{Error, Result};
use crate::settings::Settings;
use crate::wait::Poll;
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::{HostConfig, PortBinding};
use command_executor::{Command, Launcher, Output};
use futures::StreamExt;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// A host port published from a container port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    /// Port on the host
    pub host: u16,
    /// Port inside the container
    pub container: u16,
}

impl PortMapping {
    /// Publish `container` on `host`
    pub fn new(host: u16, container: u16) -> Self {
        Self { host, container }
    }
}

/// Everything needed to start one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name
    pub name: String,
    /// Image reference
    pub image: String,
    /// Published ports
    pub ports: Vec<PortMapping>,
    /// Bind mounts, `host:container[:mode]`
    pub binds: Vec<String>,
    /// Environment, `KEY=value`
    pub env: Vec<String>,
    /// Run privileged
    pub privileged: bool,
    /// Network mode
    pub network_mode: String,
}

/// Build the engine's create request for `spec`
pub fn container_config(spec: &ContainerSpec) -> Config<String> {
    let mut exposed = HashMap::new();
    let mut bindings = HashMap::new();
    for port in &spec.ports {
        let key = format!("{}/tcp", port.container);
        exposed.insert(key.clone(), HashMap::new());
        bindings.insert(
            key,
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(port.host.to_string()),
            }]),
        );
    }

    Config {
        image: Some(spec.image.clone()),
        env: Some(spec.env.clone()),
        exposed_ports: Some(exposed),
        host_config: Some(HostConfig {
            port_bindings: Some(bindings),
            binds: Some(spec.binds.clone()),
            privileged: Some(spec.privileged),
            network_mode: Some(spec.network_mode.clone()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Whether `image` appears among `tags`; an untagged image means `latest`
pub fn image_present(tags: &[String], image: &str) -> bool {
    let last = image.rsplit('/').next().unwrap_or(image);
    let wanted = if last.contains(':') {
        image.to_string()
    } else {
        format!("{image}:latest")
    };
    tags.iter()
        .any(|t| t == &wanted || t.strip_prefix("docker.io/") == Some(wanted.as_str()))
}

/// Client for the local container engine
#[derive(Debug, Clone)]
pub struct LocalContainers {
    docker: Docker,
    settings: Settings,
}

impl LocalContainers {
    /// Connect to the engine on its default socket
    pub fn connect(settings: Settings) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker, settings })
    }

    async fn image_tags(&self) -> Result<Vec<String>> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await?;
        Ok(images.into_iter().flat_map(|i| i.repo_tags).collect())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        info!("Pulling image {}", image);
        let mut stream = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );
        let mut failure = None;
        while let Some(progress) = stream.next().await {
            match progress {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!("{}: {}", image, status);
                    }
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = failure {
            // A failed pull is fine when the tag is already here
            if image_present(&self.image_tags().await?, image) {
                warn!("Could not pull {}, using local copy: {}", image, e);
                return Ok(());
            }
            return Err(Error::internal(format!("failed to pull image {image}: {e}")));
        }

        Poll::image(&self.settings)
            .until(&format!("image {image}"), |_| async move {
                Ok::<_, Error>(image_present(&self.image_tags().await?, image).then_some(()))
            })
            .await
    }

    /// Pull the image, then create and start the container
    ///
    /// A container of the same name is removed first. Returns the new
    /// container's id.
    pub async fn deploy_container(&self, spec: &ContainerSpec) -> Result<String> {
        self.pull_image(&spec.image).await?;
        self.clean_container(&spec.name).await?;

        info!("Creating container {} from {}", spec.name, spec.image);
        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                container_config(spec),
            )
            .await?;
        for warning in &created.warnings {
            warn!("{}: {}", spec.name, warning);
        }

        self.docker
            .start_container(&spec.name, None::<StartContainerOptions<String>>)
            .await?;
        info!("Started container {} ({})", spec.name, created.id);
        Ok(created.id)
    }

    /// Run `argv` inside a running container and capture its output
    pub async fn execute_cmd(&self, name: &str, argv: &[String]) -> Result<Output> {
        Ok(exec(&self.docker, name, argv.to_vec(), None).await?)
    }

    /// Repeat `argv` in the container until stdout matches `pattern`
    pub async fn wait_for_command(&self, name: &str, pattern: &Regex, argv: &[String]) -> Result<()> {
        Poll::container(&self.settings)
            .until(&format!("container {name}"), |_| async move {
                let out = self.execute_cmd(name, argv).await?;
                Ok::<_, Error>(pattern.is_match(&out.stdout).then_some(()))
            })
            .await
            .map_err(|e| match e {
                Error::Internal(_) => Error::internal(format!("timed out waiting for container {name}")),
                other => other,
            })
    }

    /// Stop and force-remove a container; absent or stopped is fine
    pub async fn clean_container(&self, name: &str) -> Result<()> {
        match self
            .docker
            .stop_container(name, Some(StopContainerOptions { t: 10 }))
            .await
        {
            Ok(()) => debug!("Stopped container {}", name),
            Err(e) => {
                let e = Error::from(e);
                if !(e.is_not_found() || is_not_modified(&e)) {
                    return Err(e);
                }
            }
        }

        match self
            .docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => {
                info!("Removed container {}", name);
                Ok(())
            }
            Err(e) => {
                let e = Error::from(e);
                if e.is_not_found() { Ok(()) } else { Err(e) }
            }
        }
    }

    /// Bridge IP of a running container
    pub async fn get_container_ip(&self, name: &str) -> Result<String> {
        let inspect = self.docker.inspect_container(name, None).await?;
        let settings = inspect
            .network_settings
            .ok_or_else(|| Error::internal(format!("container {name} has no network settings")))?;

        let from_networks = settings.networks.as_ref().and_then(|networks| {
            networks
                .values()
                .filter_map(|n| n.ip_address.clone())
                .find(|ip| !ip.is_empty())
        });
        from_networks
            .or(settings.ip_address.filter(|ip| !ip.is_empty()))
            .ok_or_else(|| Error::internal(format!("container {name} has no IP address")))
    }

    /// A launcher running commands inside the named container
    pub fn launcher(&self, name: &str) -> ContainerLauncher {
        ContainerLauncher {
            docker: self.docker.clone(),
            container: name.to_string(),
        }
    }
}

fn is_not_modified(err: &Error) -> bool {
    matches!(
        err,
        Error::Docker(bollard::errors::Error::DockerResponseServerError { status_code: 304, .. })
    )
}

/// Exit code of a finished exec
///
/// The engine leaves the code unset while the process still runs, which after
/// the output stream closed means the exec was lost.
fn exit_code(container: &str, code: Option<i64>) -> command_executor::Result<i32> {
    let code = code.ok_or_else(|| {
        command_executor::Error::spawn_failed(format!("exec in {container} reported no exit code"))
    })?;
    i32::try_from(code).map_err(|_| {
        command_executor::Error::spawn_failed(format!("exec in {container} exited with {code}"))
    })
}

async fn exec(
    docker: &Docker,
    container: &str,
    argv: Vec<String>,
    env: Option<Vec<String>>,
) -> command_executor::Result<Output> {
    let spawn = |e: bollard::errors::Error| {
        command_executor::Error::spawn_failed(format!("exec in {container}: {e}"))
    };
    debug!("Exec in {}: {:?}", container, argv);

    let created = docker
        .create_exec(
            container,
            CreateExecOptions {
                cmd: Some(argv),
                env,
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                ..Default::default()
            },
        )
        .await
        .map_err(spawn)?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    if let StartExecResults::Attached { mut output, .. } =
        docker.start_exec(&created.id, None).await.map_err(spawn)?
    {
        while let Some(msg) = output.next().await {
            match msg.map_err(spawn)? {
                LogOutput::StdOut { message } => stdout.extend_from_slice(&message),
                LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
                _ => {}
            }
        }
    }

    let inspect = docker.inspect_exec(&created.id).await.map_err(spawn)?;
    let code = exit_code(container, inspect.exit_code)?;
    Ok(Output::new(
        code,
        String::from_utf8_lossy(&stdout),
        String::from_utf8_lossy(&stderr),
    ))
}

/// Runs commands inside one container through the engine's exec API
#[derive(Debug, Clone)]
pub struct ContainerLauncher {
    docker: Docker,
    container: String,
}

#[async_trait]
impl Launcher for ContainerLauncher {
    async fn output(&self, command: Command) -> command_executor::Result<Output> {
        if command.get_stdin().is_some() {
            return Err(command_executor::Error::spawn_failed(
                "stdin is not supported for container exec",
            ));
        }
        let mut argv = Vec::with_capacity(command.get_args().len() + 1);
        argv.push(command.get_program().to_string_lossy().into_owned());
        argv.extend(
            command
                .get_args()
                .iter()
                .map(|a| a.to_string_lossy().into_owned()),
        );
        let env: Vec<String> = command
            .get_envs()
            .iter()
            .map(|(k, v)| format!("{}={}", k.to_string_lossy(), v.to_string_lossy()))
            .collect();
        exec(
            &self.docker,
            &self.container,
            argv,
            (!env.is_empty()).then_some(env),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_must_be_reported() {
        assert_eq!(exit_code("edgectl-agent", Some(3)).unwrap(), 3);
        assert!(exit_code("edgectl-agent", None).is_err());
        assert!(exit_code("edgectl-agent", Some(i64::from(i32::MAX) + 1)).is_err());
    }

    #[test]
    fn test_agent_layout() {
        let spec = layout::agent("");
        assert_eq!(spec.image, layout::AGENT_IMAGE);
        let config = container_config(&spec);

        let host = config.host_config.unwrap();
        assert_eq!(host.privileged, Some(true));
        assert_eq!(host.network_mode.as_deref(), Some("bridge"));
        assert_eq!(
            host.binds.unwrap(),
            vec!["/var/run/docker.sock:/var/run/docker.sock:rw".to_string()]
        );

        let bindings = host.port_bindings.unwrap();
        let ssh = bindings["22/tcp"].as_ref().unwrap();
        assert_eq!(ssh[0].host_port.as_deref(), Some("8081"));
        let api = bindings["54321/tcp"].as_ref().unwrap();
        assert_eq!(api[0].host_port.as_deref(), Some("54321"));
        assert!(config.exposed_ports.unwrap().contains_key("54321/tcp"));
    }

    #[test]
    fn test_controller_layout_publishes_viewer() {
        let spec = layout::controller("my/controller:dev");
        assert_eq!(spec.image, "my/controller:dev");
        assert!(spec.ports.contains(&PortMapping::new(8008, 80)));
        assert!(spec.ports.contains(&PortMapping::new(51121, 51121)));
    }

    #[test]
    fn test_image_present() {
        let tags = vec![
            "iofog/agent:3.0.1".to_string(),
            "busybox:latest".to_string(),
            "docker.io/library/nginx:1.25".to_string(),
        ];
        assert!(image_present(&tags, "iofog/agent:3.0.1"));
        assert!(image_present(&tags, "busybox"));
        assert!(image_present(&tags, "library/nginx:1.25"));
        assert!(!image_present(&tags, "iofog/agent:3.0.0"));
        assert!(!image_present(&tags, "localhost:5000/agent"));
    }
}
