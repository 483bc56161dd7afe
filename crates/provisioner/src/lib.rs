//! Provisioning engine for edgectl
//!
//! Deploys control planes, agents and connectors onto one of three targets,
//! and microservices onto provisioned agents. The targets are
//! the local container engine, hosts reachable over SSH, or a Kubernetes
//! cluster. Every job is an [`Executor`]; the [`Factory`] picks the backend
//! for a resource and [`run_parallel`] runs independent jobs side by side.
//!
//! # Example
//!
//! ```no_run
//! use provisioner::{BackendFactory, Lifecycle, Settings};
//! use resource_store::{Store, DEFAULT_NAMESPACE};
//!
//! # async fn example() -> provisioner::Result<()> {
//! let store = Store::load(Store::default_path()?)?;
//! let factory = BackendFactory::new(Settings::default());
//! let lifecycle = Lifecycle::new(&store, &factory);
//!
//! let report = lifecycle.delete_all(DEFAULT_NAMESPACE).await?;
//! store.flush()?;
//! for failure in &report.failures {
//!     eprintln!("{}: {}", failure.executor.name(), failure.error);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod agent;
pub mod connector;
pub mod controlplane;
pub mod error;
pub mod executor;
pub mod factory;
pub mod kubernetes;
pub mod lifecycle;
pub mod local;
pub mod microservice;
pub mod remote;
pub mod runner;
pub mod settings;
pub mod wait;

pub use controlplane::{default_user, ControllerAccess};
pub use error::{Error, Result};
pub use executor::{Executor, Outcome, ResourceKind};
pub use factory::{select_target, BackendFactory, ConnectionOptions, Factory, Target};
pub use lifecycle::Lifecycle;
pub use microservice::MicroserviceSpec;
pub use runner::{run_parallel, Failure, Report};
pub use settings::Settings;
pub use wait::Poll;
