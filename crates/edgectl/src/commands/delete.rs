use super::{summarize, Session};
use anyhow::Result;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum DeleteCommands {
    /// Delete a namespace
    Namespace {
        /// Namespace name
        name: String,

        /// Tear down everything deployed in it first
        #[arg(long)]
        force: bool,
    },

    /// Tear down the control plane
    Controlplane,

    /// Deprovision and remove an agent
    Agent {
        /// Agent name
        name: String,
    },

    /// Unregister and remove a connector
    Connector {
        /// Connector name
        name: String,
    },

    /// Remove a microservice from the Controller
    Microservice {
        /// Microservice name
        name: String,
    },

    /// Remove every agent, connector and the control plane
    All,
}

pub async fn run(session: &Session<'_>, command: DeleteCommands) -> Result<()> {
    let lifecycle = session.lifecycle();
    let namespace = session.namespace.as_str();
    match command {
        DeleteCommands::Namespace { name, force } => {
            let report = lifecycle.delete_namespace(&name, force).await?;
            summarize(&report, "Deleted")?;
            println!("✓ Deleted namespace {}", name);
        }
        DeleteCommands::Controlplane => {
            lifecycle.delete_control_plane(namespace).await?;
            println!("✓ Deleted control plane of {}", namespace);
        }
        DeleteCommands::Agent { name } => {
            lifecycle.delete_agent(namespace, &name).await?;
            println!("✓ Deleted agent {}", name);
        }
        DeleteCommands::Connector { name } => {
            lifecycle.delete_connector(namespace, &name).await?;
            println!("✓ Deleted connector {}", name);
        }
        DeleteCommands::Microservice { name } => {
            lifecycle.delete_microservice(namespace, &name).await?;
            println!("✓ Deleted microservice {}", name);
        }
        DeleteCommands::All => {
            let report = lifecycle.delete_all(namespace).await?;
            summarize(&report, "Deleted")?;
        }
    }
    Ok(())
}
