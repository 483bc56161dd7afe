//! The in-cluster operator's objects

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, ServiceAccount};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;

/// Name shared by all operator objects
pub const OPERATOR_NAME: &str = "iofog-operator";
/// Default operator image
pub const OPERATOR_IMAGE: &str = "iofog/operator:3.0.1";

fn labels() -> BTreeMap<String, String> {
    BTreeMap::from([("name".to_string(), OPERATOR_NAME.to_string())])
}

fn meta(namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(OPERATOR_NAME.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(labels()),
        ..Default::default()
    }
}

/// Service account the operator runs as
pub fn service_account(namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: meta(namespace),
        ..Default::default()
    }
}

/// Namespace-scoped permissions of the operator
pub fn role(namespace: &str) -> Role {
    let all = |groups: &[&str]| PolicyRule {
        api_groups: Some(groups.iter().map(|g| g.to_string()).collect()),
        resources: Some(vec!["*".to_string()]),
        verbs: vec!["*".to_string()],
        ..Default::default()
    };
    Role {
        metadata: meta(namespace),
        rules: Some(vec![
            all(&[""]),
            all(&["apps", "extensions"]),
            all(&["rbac.authorization.k8s.io"]),
            all(&["iofog.org"]),
        ]),
    }
}

/// Binding of the role to the service account
pub fn role_binding(namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: meta(namespace),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: OPERATOR_NAME.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: OPERATOR_NAME.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}

/// Single-replica operator deployment
pub fn deployment(namespace: &str, image: &str) -> Deployment {
    Deployment {
        metadata: meta(namespace),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(OPERATOR_NAME.to_string()),
                    containers: vec![Container {
                        name: OPERATOR_NAME.to_string(),
                        image: Some(image.to_string()),
                        image_pull_policy: Some("Always".to_string()),
                        command: Some(vec![OPERATOR_NAME.to_string()]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Image of the first container of a deployment
pub fn deployed_image(deployment: &Deployment) -> Option<&str> {
    deployment
        .spec
        .as_ref()?
        .template
        .spec
        .as_ref()?
        .containers
        .first()?
        .image
        .as_deref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objects_share_name_and_namespace() {
        let ns = "edge";
        assert_eq!(service_account(ns).metadata.name.as_deref(), Some(OPERATOR_NAME));
        assert_eq!(role(ns).metadata.namespace.as_deref(), Some(ns));
        let binding = role_binding(ns);
        assert_eq!(binding.role_ref.name, OPERATOR_NAME);
        assert_eq!(binding.subjects.unwrap()[0].namespace.as_deref(), Some(ns));
    }

    #[test]
    fn test_deployment_image() {
        let deploy = deployment("edge", "my/operator:dev");
        assert_eq!(deployed_image(&deploy), Some("my/operator:dev"));
        let spec = deploy.spec.unwrap();
        assert_eq!(spec.selector.match_labels, Some(labels()));
        assert_eq!(
            spec.template.spec.unwrap().service_account_name.as_deref(),
            Some(OPERATOR_NAME)
        );
    }
}
