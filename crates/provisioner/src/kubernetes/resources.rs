//! Custom resources read and written by the operator

use kube::CustomResource;
use resource_store::{Database, Images, Replicas, Services, User};
use serde::{Deserialize, Serialize};

/// API group of the operator's resources
pub const GROUP: &str = "iofog.org";
/// Name of the one ControlPlane resource per namespace
pub const CONTROL_PLANE_NAME: &str = "iofog";

/// Desired state of a control plane, as the operator reads it
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[kube(
    group = "iofog.org",
    version = "v3",
    kind = "ControlPlane",
    struct = "ControlPlaneResource",
    plural = "controlplanes",
    namespaced,
    status = "ControlPlaneStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneSpec {
    /// Replica counts
    pub replicas: Replicas,
    /// External database, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<Database>,
    /// Admin credentials
    pub user: User,
    /// Image overrides
    #[serde(default)]
    pub images: Images,
    /// Service exposure
    #[serde(default)]
    pub services: Services,
}

/// Observed state reported by the operator
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneStatus {
    /// Condition list
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Older operators report a single state string instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// One status condition
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, e.g. `ready`
    #[serde(rename = "type")]
    pub type_: String,
    /// `True`, `False` or `Unknown`
    pub status: String,
    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ControlPlaneStatus {
    /// Whether the operator reports the control plane ready
    pub fn is_ready(&self) -> bool {
        let by_condition = self
            .conditions
            .iter()
            .any(|c| c.type_.eq_ignore_ascii_case("ready") && c.status.eq_ignore_ascii_case("true"));
        by_condition
            || self
                .state
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("ready"))
    }
}

impl ControlPlaneResource {
    /// Whether the operator reports this resource ready
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(ControlPlaneStatus::is_ready)
    }
}
