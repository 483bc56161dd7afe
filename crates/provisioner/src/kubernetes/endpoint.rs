//! Resolve the externally reachable Controller address

use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::{Node, Service, ServicePort};
use tracing::{debug, warn};

/// Name of the Controller service created by the operator
pub const CONTROLLER_SERVICE: &str = "controller";
/// Port the Controller listens on
pub const CONTROLLER_PORT: i32 = 51121;

fn controller_port(service: &Service) -> Option<&ServicePort> {
    let ports = service.spec.as_ref()?.ports.as_ref()?;
    ports
        .iter()
        .find(|p| p.port == CONTROLLER_PORT)
        .or_else(|| {
            ports.iter().find(|p| {
                matches!(
                    &p.target_port,
                    Some(k8s_openapi::apimachinery::pkg::util::intstr::IntOrString::Int(CONTROLLER_PORT))
                )
            })
        })
        .or_else(|| ports.first())
}

fn node_address<'a>(nodes: &'a [Node], kind: &str) -> Option<&'a str> {
    nodes
        .iter()
        .filter_map(|n| n.status.as_ref()?.addresses.as_ref())
        .flatten()
        .find(|a| a.type_ == kind && !a.address.is_empty())
        .map(|a| a.address.as_str())
}

/// Resolve `service` to `host:port`
///
/// Returns `None` while a LoadBalancer has no ingress or a NodePort no port yet.
pub fn resolve_endpoint(service: &Service, nodes: &[Node]) -> Result<Option<String>> {
    let name = service.metadata.name.as_deref().unwrap_or(CONTROLLER_SERVICE);
    let spec = service
        .spec
        .as_ref()
        .ok_or_else(|| Error::internal(format!("service {name} has no spec")))?;
    let port = controller_port(service)
        .ok_or_else(|| Error::internal(format!("service {name} exposes no ports")))?;

    match spec.type_.as_deref().unwrap_or("ClusterIP") {
        "LoadBalancer" => {
            let ingress = service
                .status
                .as_ref()
                .and_then(|s| s.load_balancer.as_ref())
                .and_then(|lb| lb.ingress.as_ref())
                .and_then(|i| i.first());
            let host = ingress.and_then(|i| {
                i.ip.as_deref()
                    .filter(|ip| !ip.is_empty())
                    .or(i.hostname.as_deref().filter(|h| !h.is_empty()))
            });
            Ok(host.map(|h| format!("{h}:{}", port.port)))
        }
        "NodePort" => {
            let Some(node_port) = port.node_port else {
                debug!("Service {} has no node port yet", name);
                return Ok(None);
            };
            let host = match node_address(nodes, "ExternalIP") {
                Some(ip) => ip.to_string(),
                None => {
                    warn!("No node has an external IP, falling back to the cluster IP of {}", name);
                    spec.cluster_ip
                        .clone()
                        .filter(|ip| !ip.is_empty() && ip != "None")
                        .ok_or_else(|| Error::internal(format!("service {name} has no cluster IP")))?
                }
            };
            Ok(Some(format!("{host}:{node_port}")))
        }
        "ClusterIP" => {
            let host = node_address(nodes, "InternalIP")
                .ok_or_else(|| Error::internal("no node has an internal IP"))?;
            Ok(Some(format!("{host}:{}", port.port)))
        }
        other => Err(Error::internal(format!(
            "service {name} has unsupported type {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        LoadBalancerIngress, LoadBalancerStatus, NodeAddress, NodeStatus, ServiceSpec,
        ServiceStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    fn service(type_: &str, node_port: Option<i32>) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(CONTROLLER_SERVICE.to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some(type_.to_string()),
                cluster_ip: Some("10.96.0.12".to_string()),
                ports: Some(vec![ServicePort {
                    port: 80,
                    target_port: Some(IntOrString::Int(CONTROLLER_PORT)),
                    node_port,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn node(addresses: &[(&str, &str)]) -> Node {
        Node {
            status: Some(NodeStatus {
                addresses: Some(
                    addresses
                        .iter()
                        .map(|(t, a)| NodeAddress {
                            type_: t.to_string(),
                            address: a.to_string(),
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_node_port_uses_external_ip() {
        let svc = service("NodePort", Some(31234));
        let nodes = vec![node(&[("InternalIP", "192.168.0.4"), ("ExternalIP", "1.2.3.4")])];
        assert_eq!(
            resolve_endpoint(&svc, &nodes).unwrap().as_deref(),
            Some("1.2.3.4:31234")
        );
    }

    #[test]
    fn test_node_port_waits_for_allocation() {
        let svc = service("NodePort", None);
        let nodes = vec![node(&[("ExternalIP", "1.2.3.4")])];
        assert_eq!(resolve_endpoint(&svc, &nodes).unwrap(), None);
    }

    #[test]
    fn test_node_port_falls_back_to_cluster_ip() {
        let svc = service("NodePort", Some(31234));
        let nodes = vec![node(&[("InternalIP", "192.168.0.4")])];
        assert_eq!(
            resolve_endpoint(&svc, &nodes).unwrap().as_deref(),
            Some("10.96.0.12:31234")
        );
    }

    #[test]
    fn test_load_balancer_waits_for_ingress() {
        let mut svc = service("LoadBalancer", None);
        assert_eq!(resolve_endpoint(&svc, &[]).unwrap(), None);

        svc.status = Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(vec![LoadBalancerIngress {
                    hostname: Some("ctl.example.com".to_string()),
                    ..Default::default()
                }]),
            }),
            ..Default::default()
        });
        assert_eq!(
            resolve_endpoint(&svc, &[]).unwrap().as_deref(),
            Some("ctl.example.com:80")
        );
    }

    #[test]
    fn test_cluster_ip_uses_internal_ip() {
        let svc = service("ClusterIP", None);
        let nodes = vec![node(&[("InternalIP", "192.168.0.4")])];
        assert_eq!(
            resolve_endpoint(&svc, &nodes).unwrap().as_deref(),
            Some("192.168.0.4:80")
        );
        assert!(resolve_endpoint(&svc, &[]).is_err());
    }
}
