//! Tests against the local Docker engine.
//!
//! Run with `--features docker-tests` on a machine with a running daemon.

#![cfg(feature = "docker-tests")]

use provisioner::local::{ContainerSpec, LocalContainers, PortMapping};
use provisioner::Settings;
use regex::Regex;

const IMAGE: &str = "nginx:alpine";
const NAME: &str = "edgectl-docker-test";

fn spec() -> ContainerSpec {
    ContainerSpec {
        name: NAME.to_string(),
        image: IMAGE.to_string(),
        ports: vec![PortMapping::new(54321, 54321)],
        binds: Vec::new(),
        env: vec!["EDGECTL_TEST=1".to_string()],
        privileged: false,
        network_mode: "bridge".to_string(),
    }
}

#[tokio::test]
async fn test_deploy_exec_and_clean() {
    let containers = LocalContainers::connect(Settings::default()).unwrap();

    let spec = spec();
    let id = containers.deploy_container(&spec).await.unwrap();
    assert!(!id.is_empty());

    let ip = containers.get_container_ip(NAME).await.unwrap();
    assert!(!ip.is_empty());

    let out = containers
        .execute_cmd(NAME, &["sh".to_string(), "-c".to_string(), "echo $EDGECTL_TEST".to_string()])
        .await
        .unwrap();
    assert_eq!(out.stdout.trim(), "1");

    let pattern = Regex::new("^ok").unwrap();
    containers
        .wait_for_command(NAME, &pattern, &["echo".to_string(), "ok".to_string()])
        .await
        .unwrap();

    containers.clean_container(NAME).await.unwrap();
    // Cleaning an absent container is fine
    containers.clean_container(NAME).await.unwrap();
}
