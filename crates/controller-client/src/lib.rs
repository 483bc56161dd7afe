//! Client for the edge Controller REST API
//!
//! Covers the calls edgectl makes while provisioning: status, users, agents,
//! connectors, applications, microservices and the catalog. Every call except
//! [`ControllerClient::status`] and signup needs a token from
//! [`ControllerClient::login`].

#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod models;

pub use client::{api_base, resolve_routes, ControllerClient};
pub use error::{Error, Result};
pub use models::*;
