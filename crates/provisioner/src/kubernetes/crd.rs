//! Definitions of the operator's custom resource types

use crate::error::Result;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, PostParams};
use kube::Client;
use serde_json::json;
use tracing::info;

use super::resources::GROUP;

/// Version written by this tool
pub const STORAGE_VERSION: &str = "v3";
/// Older version still served for existing clients
pub const LEGACY_VERSION: &str = "v2";

fn definition(kind: &str, plural: &str, singular: &str) -> Result<CustomResourceDefinition> {
    let version = |name: &str, storage: bool| {
        json!({
            "name": name,
            "served": true,
            "storage": storage,
            "schema": {
                "openAPIV3Schema": {
                    "type": "object",
                    "x-kubernetes-preserve-unknown-fields": true
                }
            },
            "subresources": { "status": {} }
        })
    };

    Ok(serde_json::from_value(json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "CustomResourceDefinition",
        "metadata": { "name": format!("{plural}.{GROUP}") },
        "spec": {
            "group": GROUP,
            "names": {
                "kind": kind,
                "listKind": format!("{kind}List"),
                "plural": plural,
                "singular": singular
            },
            "scope": "Namespaced",
            "versions": [version(STORAGE_VERSION, true), version(LEGACY_VERSION, false)]
        }
    }))?)
}

/// Definition of the ControlPlane kind
pub fn control_plane_crd() -> Result<CustomResourceDefinition> {
    definition("ControlPlane", "controlplanes", "controlplane")
}

/// Definition of the Application kind
pub fn app_crd() -> Result<CustomResourceDefinition> {
    definition("Application", "apps", "app")
}

/// Whether an installed definition lacks the version this tool writes
pub fn needs_upgrade(installed: &CustomResourceDefinition) -> bool {
    !installed
        .spec
        .versions
        .iter()
        .any(|v| v.name == STORAGE_VERSION && v.served)
}

/// Create the definition, or replace it in place if outdated
pub async fn ensure(client: &Client, desired: CustomResourceDefinition) -> Result<()> {
    let api: Api<CustomResourceDefinition> = Api::all(client.clone());
    let name = desired.metadata.name.clone().unwrap_or_default();

    match api.get_opt(&name).await? {
        None => {
            info!("Creating CRD {}", name);
            match api.create(&PostParams::default(), &desired).await {
                Ok(_) => Ok(()),
                // Created concurrently by someone else
                Err(kube::Error::Api(resp)) if resp.code == 409 => Ok(()),
                Err(e) => Err(e.into()),
            }
        }
        Some(installed) if needs_upgrade(&installed) => {
            info!("Upgrading CRD {} to {}", name, STORAGE_VERSION);
            let mut desired = desired;
            desired.metadata.resource_version = installed.metadata.resource_version;
            api.replace(&name, &PostParams::default(), &desired).await?;
            Ok(())
        }
        Some(_) => Ok(()),
    }
}

/// Ensure both operator definitions exist and are current
pub async fn ensure_all(client: &Client) -> Result<()> {
    ensure(client, control_plane_crd()?).await?;
    ensure(client, app_crd()?).await
}
