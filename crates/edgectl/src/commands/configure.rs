use super::Session;
use anyhow::Result;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum ConfigureCommands {
    /// Namespace used when a command names none
    DefaultNamespace {
        /// Existing namespace
        name: String,
    },
}

pub fn run(session: &Session<'_>, command: ConfigureCommands) -> Result<()> {
    match command {
        ConfigureCommands::DefaultNamespace { name } => {
            session.store.set_default_namespace(&name)?;
            println!("✓ Default namespace is now {}", name);
            Ok(())
        }
    }
}
