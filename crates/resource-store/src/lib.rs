//! Resource store for edgectl
//!
//! Holds every namespace and the control planes, agents, connectors and
//! microservices deployed into it. The whole document lives in one YAML file,
//! loaded once per command and written back with [`Store::flush`].
//!
//! # Example
//!
//! ```no_run
//! use resource_store::{Store, DEFAULT_NAMESPACE};
//!
//! # fn example() -> resource_store::Result<()> {
//! let store = Store::load(Store::default_path()?)?;
//! store.add_namespace("edge")?;
//! let agents = store.get_agents(DEFAULT_NAMESPACE)?;
//! println!("{} agents", agents.len());
//! store.flush()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod store;

pub use error::{Error, Result};
pub use models::*;
pub use store::{validate_name, Store, CONFIG_ENV};
