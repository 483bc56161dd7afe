//! Error types for the resource store

use thiserror::Error;

/// Resource store error type
#[derive(Error, Debug)]
pub enum Error {
    /// The namespace or resource does not exist
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind, e.g. `namespace` or `agent`
        kind: &'static str,
        /// Resource name
        name: String,
    },

    /// A resource with the same name already exists
    #[error("{kind} {name} already exists")]
    Conflict {
        /// Resource kind
        kind: &'static str,
        /// Resource name
        name: String,
    },

    /// The request is invalid as given
    #[error("{0}")]
    Input(String),

    /// I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File being read or written
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// YAML serialization error
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn conflict(kind: &'static str, name: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Whether the error reports a missing namespace or resource
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Whether the error reports a name collision
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
