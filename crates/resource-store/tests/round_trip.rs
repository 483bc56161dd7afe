//! Store persistence tests

use chrono::Utc;
use resource_store::{
    Agent, AgentScripts, ControlPlane, Controller, Error, KubernetesControlPlane, LocalAgent,
    Package, RemoteAgent, Replicas, Script, Ssh, Store, User, DEFAULT_NAMESPACE,
};
use std::path::PathBuf;
use tempfile::TempDir;

fn user() -> User {
    User {
        name: "Edge".to_string(),
        surname: "Admin".to_string(),
        email: "admin@example.com".to_string(),
        password: "hunter22".to_string(),
    }
}

fn remote_agent(name: &str) -> Agent {
    Agent::Remote(RemoteAgent {
        name: name.to_string(),
        uuid: format!("{name}-uuid"),
        host: "10.0.0.7".to_string(),
        ssh: Ssh {
            user: "ubuntu".to_string(),
            key_file: PathBuf::from("/home/me/.ssh/id_rsa"),
            port: 2222,
        },
        package: Package {
            version: "3.0.1".to_string(),
            ..Package::default()
        },
        scripts: Some(AgentScripts {
            dir: Some(PathBuf::from("/opt/scripts")),
            install: Some(Script {
                name: "my_install.sh".to_string(),
                args: vec!["--fast".to_string()],
            }),
            ..AgentScripts::default()
        }),
        config: None,
        created: Utc::now(),
    })
}

#[test]
fn test_add_then_get_namespace() {
    let dir = TempDir::new().unwrap();
    let store = Store::load(dir.path().join("config.yaml")).unwrap();

    let added = store.add_namespace("edge").unwrap();
    let fetched = store.get_namespace("edge").unwrap();
    assert_eq!(fetched.name, "edge");
    assert_eq!(fetched.created, added.created);

    let err = store.add_namespace("edge").unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));
}

#[test]
fn test_delete_non_empty_namespace_requires_force() {
    let dir = TempDir::new().unwrap();
    let store = Store::load(dir.path().join("config.yaml")).unwrap();
    store.add_namespace("edge").unwrap();
    store.add_agent("edge", remote_agent("a1")).unwrap();

    let err = store.delete_namespace("edge", false).unwrap_err();
    assert!(matches!(err, Error::Input(_)));
    assert!(store.get_namespace("edge").is_ok());

    store.delete_namespace("edge", true).unwrap();
    assert!(store.get_namespace("edge").unwrap_err().is_not_found());
}

#[test]
fn test_empty_namespace_deletes_without_force() {
    let dir = TempDir::new().unwrap();
    let store = Store::load(dir.path().join("config.yaml")).unwrap();
    store.add_namespace("edge").unwrap();
    store.delete_namespace("edge", false).unwrap();
}

#[test]
fn test_flush_and_reload_preserves_everything() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.yaml");
    let store = Store::load(&path).unwrap();

    store.add_namespace("cluster").unwrap();
    store
        .update_control_plane(
            "cluster",
            ControlPlane::Kubernetes(KubernetesControlPlane {
                iofog_user: user(),
                controllers: vec![Controller {
                    name: "controller-0".to_string(),
                    host: String::new(),
                    ssh: None,
                    endpoint: "1.2.3.4:31000".to_string(),
                    package: None,
                    container: None,
                    created: Utc::now(),
                }],
                endpoint: "1.2.3.4:31000".to_string(),
                kube_config: PathBuf::from("/home/me/.kube/config"),
                replicas: Replicas { controller: 2 },
                images: Default::default(),
                services: Default::default(),
                database: None,
            }),
        )
        .unwrap();
    store.add_agent("cluster", remote_agent("a1")).unwrap();
    store.add_agent("cluster", remote_agent("a2")).unwrap();
    store.detach_agent("cluster", "a2").unwrap();
    store
        .add_agent(
            DEFAULT_NAMESPACE,
            Agent::Local(LocalAgent {
                name: "local".to_string(),
                uuid: String::new(),
                host: "localhost".to_string(),
                container: Default::default(),
                config: None,
                created: Utc::now(),
            }),
        )
        .unwrap();

    assert!(store.flush().unwrap());
    // Nothing changed since the last write
    assert!(!store.flush().unwrap());

    let reloaded = Store::load(&path).unwrap();
    assert_eq!(reloaded.snapshot(), store.snapshot());
    assert_eq!(reloaded.get_agents("cluster").unwrap().len(), 1);
    assert_eq!(reloaded.get_detached_agents("cluster").unwrap().len(), 1);
    assert!(!reloaded.flush().unwrap());
}
