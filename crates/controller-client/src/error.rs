//! Error types for the Controller client

use thiserror::Error;

/// Controller client error type
#[derive(Error, Debug)]
pub enum Error {
    /// The Controller answered 404
    #[error("not found: {0}")]
    NotFound(String),

    /// The Controller answered 409
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any other non-success response
    #[error("controller returned HTTP {status}: {message}")]
    Http {
        /// Status code
        status: u16,
        /// Message from the response body, or the raw body
        message: String,
    },

    /// A call that needs a token was made before `login`
    #[error("not logged in to the controller")]
    NotAuthenticated,

    /// A microservice routes to something outside its application
    #[error("microservice {microservice} routes to unknown microservice {route} in application {application}")]
    InvalidRoute {
        /// Microservice being created
        microservice: String,
        /// Offending route destination
        route: String,
        /// Application both should belong to
        application: String,
    },

    /// A response lacked a field the client relies on
    #[error("controller response is missing {0}")]
    MissingField(&'static str),

    /// Transport error
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Body could not be decoded
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build the error for a non-success status and its body
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or_else(|| body.trim().to_string());
        match status {
            404 => Error::NotFound(message),
            409 => Error::Conflict(message),
            _ => Error::Http { status, message },
        }
    }

    /// Whether the Controller reported the resource missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether the Controller reported a collision
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
