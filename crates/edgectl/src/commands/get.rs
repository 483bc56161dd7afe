use super::Session;
use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use comfy_table::{Cell, Color, Table};
use resource_store::{Agent, ControlPlane, Namespace};
use tracing::warn;

#[derive(Subcommand)]
pub enum GetCommands {
    /// List namespaces
    Namespaces,

    /// Everything in the namespace
    All,

    /// Agents, including detached ones
    Agents,

    /// Controllers of the control plane
    Controlplane,

    /// Connectors
    Connectors,

    /// Microservices
    Microservices,
}

pub async fn run(session: &Session<'_>, command: GetCommands) -> Result<()> {
    if let GetCommands::Namespaces = command {
        display_namespaces(&session.store.list_namespaces(), &session.store.default_namespace());
        return Ok(());
    }

    if matches!(command, GetCommands::All | GetCommands::Microservices) {
        sync_microservices(session).await;
    }
    let namespace = session.store.get_namespace(&session.namespace)?;
    println!("NAMESPACE {}\n", namespace.name);
    match command {
        GetCommands::Namespaces => {}
        GetCommands::All => {
            display_control_plane(&namespace);
            display_agents(&namespace);
            display_connectors(&namespace);
            display_microservices(&namespace);
        }
        GetCommands::Agents => display_agents(&namespace),
        GetCommands::Controlplane => display_control_plane(&namespace),
        GetCommands::Connectors => display_connectors(&namespace),
        GetCommands::Microservices => display_microservices(&namespace),
    }
    Ok(())
}

/// Refresh microservices from a deployed Controller; the stored copy is shown when it is unreachable
async fn sync_microservices(session: &Session<'_>) {
    let deployed = session
        .store
        .get_control_plane(&session.namespace)
        .is_ok_and(|cp| !cp.endpoint().is_empty());
    if !deployed {
        return;
    }
    if let Err(e) = session.lifecycle().sync_microservices(&session.namespace).await {
        warn!("Showing stored microservices, the Controller could not be read: {}", e);
    }
}

/// Short human age, like `5m` or `3d`
fn age(created: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(created);
    if elapsed.num_days() > 0 {
        format!("{}d", elapsed.num_days())
    } else if elapsed.num_hours() > 0 {
        format!("{}h", elapsed.num_hours())
    } else if elapsed.num_minutes() > 0 {
        format!("{}m", elapsed.num_minutes())
    } else {
        format!("{}s", elapsed.num_seconds().max(0))
    }
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

fn display_namespaces(namespaces: &[Namespace], default: &str) {
    let now = Utc::now();
    let mut table = Table::new();
    table.set_header(vec!["NAMESPACE", "CONTROL PLANE", "AGENTS", "AGE"]);

    for namespace in namespaces {
        let name = if namespace.name == default {
            Cell::new(format!("{} (default)", namespace.name)).fg(Color::Green)
        } else {
            Cell::new(&namespace.name)
        };
        let control_plane = namespace
            .control_plane
            .as_ref()
            .map(ControlPlane::kind)
            .unwrap_or("-");
        table.add_row(vec![
            name,
            Cell::new(control_plane),
            Cell::new(namespace.agents.len()),
            Cell::new(age(namespace.created, now)),
        ]);
    }
    println!("{}", table);
}

fn display_control_plane(namespace: &Namespace) {
    let Some(control_plane) = &namespace.control_plane else {
        println!("No control plane deployed\n");
        return;
    };

    let now = Utc::now();
    let mut table = Table::new();
    table.set_header(vec!["CONTROLLER", "KIND", "HOST", "ENDPOINT", "AGE"]);
    for controller in control_plane.controllers() {
        let endpoint = if controller.endpoint.is_empty() {
            control_plane.endpoint()
        } else {
            &controller.endpoint
        };
        table.add_row(vec![
            Cell::new(&controller.name),
            Cell::new(control_plane.kind()),
            Cell::new(or_dash(&controller.host)),
            Cell::new(or_dash(endpoint)),
            Cell::new(age(controller.created, now)),
        ]);
    }
    println!("{}\n", table);
}

fn agent_row(agent: &Agent, detached: bool, now: DateTime<Utc>) -> Vec<Cell> {
    let (status, color) = match (detached, agent.uuid().is_empty()) {
        (true, _) => ("detached", Color::DarkGrey),
        (false, true) => ("pending", Color::Yellow),
        (false, false) => ("provisioned", Color::Green),
    };
    vec![
        Cell::new(agent.name()),
        Cell::new(status).fg(color),
        Cell::new(agent.kind()),
        Cell::new(or_dash(agent.host())),
        Cell::new(or_dash(agent.uuid())),
        Cell::new(age(agent.created(), now)),
    ]
}

fn display_agents(namespace: &Namespace) {
    let now = Utc::now();
    let mut table = Table::new();
    table.set_header(vec!["AGENT", "STATUS", "KIND", "HOST", "UUID", "AGE"]);
    for agent in &namespace.agents {
        table.add_row(agent_row(agent, false, now));
    }
    for agent in &namespace.detached.agents {
        table.add_row(agent_row(agent, true, now));
    }
    println!("{}\n", table);
}

fn display_connectors(namespace: &Namespace) {
    let now = Utc::now();
    let mut table = Table::new();
    table.set_header(vec!["CONNECTOR", "HOST", "AGE"]);
    for connector in &namespace.connectors {
        table.add_row(vec![
            Cell::new(&connector.name),
            Cell::new(or_dash(&connector.host)),
            Cell::new(age(connector.created, now)),
        ]);
    }
    println!("{}\n", table);
}

fn display_microservices(namespace: &Namespace) {
    let mut table = Table::new();
    table.set_header(vec!["MICROSERVICE", "APPLICATION", "AGENT", "IMAGE", "ROUTES"]);
    for microservice in &namespace.microservices {
        let routes = microservice.routes.join(", ");
        table.add_row(vec![
            Cell::new(&microservice.name),
            Cell::new(&microservice.application),
            Cell::new(&microservice.agent),
            Cell::new(or_dash(&microservice.image)),
            Cell::new(or_dash(&routes)),
        ]);
    }
    println!("{}\n", table);
}
