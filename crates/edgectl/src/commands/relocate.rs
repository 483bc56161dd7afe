use super::Session;
use anyhow::Result;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum MoveCommands {
    /// Move an agent to the control plane of another namespace
    Agent {
        /// Agent name
        name: String,
        /// Destination namespace
        to: String,
    },

    /// Move a microservice onto another agent
    Microservice {
        /// Microservice name
        name: String,
        /// Destination agent
        #[arg(long)]
        agent: String,
    },
}

pub async fn run(session: &Session<'_>, command: MoveCommands) -> Result<()> {
    let lifecycle = session.lifecycle();
    match command {
        MoveCommands::Agent { name, to } => {
            lifecycle.move_agent(&session.namespace, &name, &to).await?;
            println!("✓ Moved agent {} from {} to {}", name, session.namespace, to);
        }
        MoveCommands::Microservice { name, agent } => {
            lifecycle
                .move_microservice(&session.namespace, &name, &agent)
                .await?;
            println!("✓ Moved microservice {} to agent {}", name, agent);
        }
    }
    Ok(())
}
