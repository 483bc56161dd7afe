use super::Session;
use anyhow::Result;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum DetachCommands {
    /// Deprovision an agent but leave it installed
    Agent {
        /// Agent name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum AttachCommands {
    /// Provision a detached agent against this namespace's control plane
    Agent {
        /// Agent name
        name: String,

        /// Namespace the agent was detached from; defaults to the target namespace
        #[arg(long)]
        from: Option<String>,
    },
}

pub async fn detach(session: &Session<'_>, command: DetachCommands) -> Result<()> {
    match command {
        DetachCommands::Agent { name } => {
            session
                .lifecycle()
                .detach_agent(&session.namespace, &name)
                .await?;
            println!("✓ Detached agent {}", name);
            Ok(())
        }
    }
}

pub async fn attach(session: &Session<'_>, command: AttachCommands) -> Result<()> {
    match command {
        AttachCommands::Agent { name, from } => {
            let from = from.unwrap_or_else(|| session.namespace.clone());
            session
                .lifecycle()
                .attach_agent(&from, &name, &session.namespace)
                .await?;
            println!("✓ Attached agent {} to {}", name, session.namespace);
            Ok(())
        }
    }
}
