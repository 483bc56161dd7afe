//! Tests against a live cluster.
//!
//! Run with `--features kube-tests` and `KUBECONFIG` pointing at a disposable
//! cluster. The tests create and remove the `edgectl-test` namespace.

#![cfg(feature = "kube-tests")]

use provisioner::kubernetes::{crd, KubernetesBackend};
use provisioner::Settings;
use std::path::PathBuf;

const NAMESPACE: &str = "edgectl-test";

fn kube_config() -> Option<PathBuf> {
    std::env::var_os("KUBECONFIG").map(PathBuf::from)
}

#[tokio::test]
async fn test_setup_is_idempotent() {
    let Some(path) = kube_config() else {
        eprintln!("KUBECONFIG not set, skipping");
        return;
    };
    let backend = KubernetesBackend::connect(&path, NAMESPACE, Settings::default())
        .await
        .unwrap();

    for _ in 0..2 {
        backend.ensure_namespace().await.unwrap();
        backend
            .deploy_operator(provisioner::kubernetes::operator::OPERATOR_IMAGE)
            .await
            .unwrap();
    }
    assert!(!backend.exists_in_namespace().await.unwrap());

    backend.delete_control_plane().await.unwrap();
    // Everything is already gone the second time
    backend.delete_control_plane().await.unwrap();
}

#[tokio::test]
async fn test_crd_definitions_are_idempotent() {
    let Some(path) = kube_config() else {
        eprintln!("KUBECONFIG not set, skipping");
        return;
    };
    let kubeconfig = kube::config::Kubeconfig::read_from(&path).unwrap();
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &Default::default())
        .await
        .unwrap();
    let client = kube::Client::try_from(config).unwrap();

    crd::ensure_all(&client).await.unwrap();
    crd::ensure_all(&client).await.unwrap();
}
