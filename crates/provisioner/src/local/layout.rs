//! Fixed container layouts for local deployments

use super::{ContainerSpec, PortMapping};

/// Controller container name
pub const CONTROLLER_CONTAINER: &str = "edgectl-controller";
/// Agent container name
pub const AGENT_CONTAINER: &str = "edgectl-agent";
/// Connector container name
pub const CONNECTOR_CONTAINER: &str = "edgectl-connector";

/// Default Controller image
pub const CONTROLLER_IMAGE: &str = "iofog/controller:3.0.1";
/// Default Agent image
pub const AGENT_IMAGE: &str = "iofog/agent:3.0.1";
/// Default Connector image
pub const CONNECTOR_IMAGE: &str = "iofog/connector:3.0.1";

/// Controller API port
pub const CONTROLLER_PORT: u16 = 51121;
/// Agent API port
pub const AGENT_PORT: u16 = 54321;

const NETWORK: &str = "bridge";

fn or_default(image: &str, default: &str) -> String {
    if image.is_empty() {
        default.to_string()
    } else {
        image.to_string()
    }
}

/// Controller: API on 51121, web viewer on host port 8008
pub fn controller(image: &str) -> ContainerSpec {
    ContainerSpec {
        name: CONTROLLER_CONTAINER.to_string(),
        image: or_default(image, CONTROLLER_IMAGE),
        ports: vec![
            PortMapping::new(CONTROLLER_PORT, CONTROLLER_PORT),
            PortMapping::new(8008, 80),
        ],
        binds: Vec::new(),
        env: Vec::new(),
        privileged: false,
        network_mode: NETWORK.to_string(),
    }
}

/// Agent: API on 54321, SSH on host port 8081, host Docker socket mounted
pub fn agent(image: &str) -> ContainerSpec {
    ContainerSpec {
        name: AGENT_CONTAINER.to_string(),
        image: or_default(image, AGENT_IMAGE),
        ports: vec![
            PortMapping::new(AGENT_PORT, AGENT_PORT),
            PortMapping::new(8081, 22),
        ],
        binds: vec!["/var/run/docker.sock:/var/run/docker.sock:rw".to_string()],
        env: Vec::new(),
        privileged: true,
        network_mode: NETWORK.to_string(),
    }
}

/// Connector: HTTP on 8080, AMQP on 5672
pub fn connector(image: &str) -> ContainerSpec {
    ContainerSpec {
        name: CONNECTOR_CONTAINER.to_string(),
        image: or_default(image, CONNECTOR_IMAGE),
        ports: vec![PortMapping::new(8080, 8080), PortMapping::new(5672, 5672)],
        binds: Vec::new(),
        env: Vec::new(),
        privileged: false,
        network_mode: NETWORK.to_string(),
    }
}
