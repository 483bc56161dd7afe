use super::Session;
use anyhow::Result;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum RenameCommands {
    /// Rename an agent locally and on the Controller
    Agent {
        /// Current name
        name: String,
        /// New name
        new_name: String,
    },

    /// Rename a namespace
    Namespace {
        /// Current name
        name: String,
        /// New name
        new_name: String,
    },
}

pub async fn run(session: &Session<'_>, command: RenameCommands) -> Result<()> {
    let lifecycle = session.lifecycle();
    match command {
        RenameCommands::Agent { name, new_name } => {
            lifecycle
                .rename_agent(&session.namespace, &name, &new_name)
                .await?;
            println!("✓ Renamed agent {} to {}", name, new_name);
        }
        RenameCommands::Namespace { name, new_name } => {
            lifecycle.rename_namespace(&name, &new_name)?;
            println!("✓ Renamed namespace {} to {}", name, new_name);
        }
    }
    Ok(())
}
