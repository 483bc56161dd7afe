//! Request and response bodies of the Controller API

use serde::{Deserialize, Serialize};

/// `GET /status`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
    /// `online` once the Controller serves requests
    pub status: String,
    /// Controller version
    #[serde(default)]
    pub versions: Option<Versions>,
    /// Seconds since start
    #[serde(default)]
    pub uptime_sec: Option<f64>,
}

impl ControllerStatus {
    /// Whether the Controller reports itself online
    pub fn is_online(&self) -> bool {
        self.status == "online"
    }
}

/// Component versions reported by the Controller
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Versions {
    /// Controller version
    #[serde(default)]
    pub controller: String,
    /// Embedded ECN viewer version
    #[serde(default)]
    pub ecn_viewer: String,
}

/// User account, used for signup
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: String,
    /// Login email
    pub email: String,
    /// Password
    pub password: String,
}

/// Credentials, used for login
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    /// Login email
    pub email: String,
    /// Password
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginResponse {
    pub access_token: String,
}

/// Agent registration
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
    /// Agent name
    pub name: String,
    /// 0 auto, 1 x86, 2 arm
    pub fog_type: i32,
    /// Latitude
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Longitude
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Map a fog type name to the Controller's numeric code
pub fn fog_type_code(name: Option<&str>) -> i32 {
    match name.map(str::to_ascii_lowercase).as_deref() {
        Some("x86") | Some("amd64") => 1,
        Some("arm") | Some("arm64") | Some("aarch64") => 2,
        _ => 0,
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UuidResponse {
    pub uuid: String,
}

/// An agent as the Controller sees it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    /// Controller-assigned UUID
    pub uuid: String,
    /// Agent name
    pub name: String,
    /// Reported daemon status, e.g. `RUNNING`
    #[serde(default)]
    pub daemon_status: String,
    /// Reported IP address
    #[serde(default)]
    pub ip_address: String,
    /// Reported agent version
    #[serde(default)]
    pub version: String,
    /// Last status report, epoch milliseconds
    #[serde(default)]
    pub last_status_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AgentList {
    #[serde(default)]
    pub fogs: Vec<AgentInfo>,
}

/// One-shot key the agent exchanges for its credentials
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningKey {
    /// The key
    pub key: String,
    /// Expiry, epoch milliseconds
    #[serde(default)]
    pub expiration_time: Option<i64>,
}

/// Connector registration
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorRequest {
    /// Connector name
    pub name: String,
    /// Address agents reach the connector on
    pub public_ip: String,
    /// Domain name, may equal the address
    pub domain: String,
    /// Whether TLS is off
    pub dev_mode: bool,
}

/// An application (flow) on the Controller
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Numeric id
    pub id: i64,
    /// Application name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Whether it is running
    #[serde(default)]
    pub is_activated: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApplicationList {
    #[serde(default)]
    pub flows: Vec<Application>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdResponse {
    pub id: i64,
}

/// Application creation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationRequest {
    /// Application name
    pub name: String,
    /// Description
    pub description: String,
    /// Start it right away
    pub is_activated: bool,
}

/// A microservice as the Controller sees it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroserviceInfo {
    /// Controller-assigned UUID
    pub uuid: String,
    /// Name
    pub name: String,
    /// Agent it runs on
    #[serde(default)]
    pub iofog_uuid: String,
    /// Application id
    #[serde(default)]
    pub flow_id: i64,
    /// Catalog item it was built from
    #[serde(default)]
    pub catalog_item_id: i64,
    /// UUIDs of the microservices it routes to
    #[serde(default)]
    pub routes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MicroserviceList {
    #[serde(default)]
    pub microservices: Vec<MicroserviceInfo>,
}

/// Microservice creation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMicroserviceRequest {
    /// Name
    pub name: String,
    /// Catalog item to instantiate
    pub catalog_item_id: i64,
    /// Application id
    pub flow_id: i64,
    /// Target agent UUID
    pub iofog_uuid: String,
    /// Free-form config, serialized JSON
    pub config: String,
    /// Names of microservices it routes to, resolved by the client
    #[serde(skip_serializing)]
    pub routes: Vec<String>,
}

/// A catalog item
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    /// Numeric id
    pub id: i64,
    /// Name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Category
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CatalogList {
    #[serde(default)]
    pub catalog_items: Vec<CatalogItem>,
}
