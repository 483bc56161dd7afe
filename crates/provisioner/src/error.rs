//! Error types for provisioning

use thiserror::Error;

/// Provisioning error type
#[derive(Error, Debug)]
pub enum Error {
    /// A namespace or resource does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// A resource with the same name already exists
    #[error("{0} already exists")]
    Conflict(String),

    /// Options are invalid or insufficient; re-run with corrected input
    #[error("invalid input: {0}")]
    Input(String),

    /// The engine observed an unexpected state
    #[error("{0}")]
    Internal(String),

    /// Resource store failure other than the ones mapped above
    #[error("store error: {0}")]
    Store(resource_store::Error),

    /// Command execution failure, local or over SSH
    #[error(transparent)]
    Command(#[from] command_executor::Error),

    /// Container engine failure
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// Kubernetes API failure
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Kubeconfig could not be read
    #[error("kubeconfig error: {0}")]
    KubeConfig(#[from] kube::config::KubeconfigError),

    /// Controller API failure
    #[error("controller error: {0}")]
    Controller(#[from] controller_client::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<resource_store::Error> for Error {
    fn from(err: resource_store::Error) -> Self {
        match err {
            resource_store::Error::NotFound { kind, name } => Error::NotFound(format!("{kind} {name}")),
            resource_store::Error::Conflict { kind, name } => Error::Conflict(format!("{kind} {name}")),
            resource_store::Error::Input(msg) => Error::Input(msg),
            other => Error::Store(other),
        }
    }
}

impl Error {
    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    pub(crate) fn input(msg: impl Into<String>) -> Self {
        Error::Input(msg.into())
    }

    /// Whether the error reports something missing, at any layer
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Controller(e) => e.is_not_found(),
            Error::Kube(kube::Error::Api(resp)) => resp.code == 404,
            Error::Docker(bollard::errors::Error::DockerResponseServerError { status_code, .. }) => {
                *status_code == 404
            }
            Error::Command(e) => e.kind() == Some(command_executor::FailureKind::NotFound),
            _ => false,
        }
    }

    /// Whether the error reports a name collision, at any layer
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::Controller(e) => e.is_conflict(),
            Error::Kube(kube::Error::Api(resp)) => resp.code == 409,
            Error::Docker(bollard::errors::Error::DockerResponseServerError { status_code, .. }) => {
                *status_code == 409
            }
            _ => false,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_keep_their_meaning() {
        let err: Error = resource_store::Error::NotFound {
            kind: "agent",
            name: "a1".to_string(),
        }
        .into();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "agent a1 not found");

        let err: Error = resource_store::Error::Conflict {
            kind: "namespace",
            name: "edge".to_string(),
        }
        .into();
        assert!(err.is_conflict());

        let err: Error = resource_store::Error::Input("bad".to_string()).into();
        assert!(matches!(err, Error::Input(_)));
    }

    #[test]
    fn test_controller_not_found_is_not_found() {
        let err: Error = controller_client::Error::NotFound("agent".to_string()).into();
        assert!(err.is_not_found());
    }
}
