use super::Session;
use anyhow::Result;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum UpgradeCommands {
    /// Ask the Controller to upgrade an agent in place
    Agent {
        /// Agent name
        name: String,
    },
}

pub async fn run(session: &Session<'_>, command: UpgradeCommands) -> Result<()> {
    match command {
        UpgradeCommands::Agent { name } => {
            session
                .lifecycle()
                .upgrade_agent(&session.namespace, &name)
                .await?;
            println!("✓ Upgrade of agent {} requested", name);
            Ok(())
        }
    }
}
