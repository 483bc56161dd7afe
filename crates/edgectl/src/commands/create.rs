use super::Session;
use anyhow::Result;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum CreateCommands {
    /// Create an empty namespace
    Namespace {
        /// Namespace name
        name: String,
    },
}

pub async fn run(session: &Session<'_>, command: CreateCommands) -> Result<()> {
    match command {
        CreateCommands::Namespace { name } => {
            session.lifecycle().create_namespace(&name)?;
            println!("✓ Created namespace {}", name);
            Ok(())
        }
    }
}
