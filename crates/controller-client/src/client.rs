//! HTTP client for one Controller

use crate::error::{Error, Result};
use crate::models::*;
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Default request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Turn a recorded endpoint into the API base URL
///
/// Endpoints are stored as `host:port` or as a full URL; both end up as
/// `<scheme>://host:port/api/v3`.
pub fn api_base(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    let endpoint = endpoint.strip_suffix("/api/v3").unwrap_or(endpoint);
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        format!("{endpoint}/api/v3")
    } else {
        format!("http://{endpoint}/api/v3")
    }
}

/// Map route names to UUIDs of microservices in the same application
pub fn resolve_routes(
    microservice: &str,
    application: &Application,
    routes: &[String],
    known: &[MicroserviceInfo],
) -> Result<Vec<String>> {
    routes
        .iter()
        .map(|route| {
            known
                .iter()
                .find(|m| &m.name == route && m.flow_id == application.id)
                .map(|m| m.uuid.clone())
                .ok_or_else(|| Error::InvalidRoute {
                    microservice: microservice.to_string(),
                    route: route.clone(),
                    application: application.name.clone(),
                })
        })
        .collect()
}

/// Client for the Controller REST API
#[derive(Debug, Clone)]
pub struct ControllerClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ControllerClient {
    /// Client for the Controller at `endpoint`, not yet logged in
    pub fn new(endpoint: &str) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: api_base(endpoint),
            token: None,
        })
    }

    /// Log in and return an authenticated client
    pub async fn connect(endpoint: &str, email: &str, password: &str) -> Result<Self> {
        let mut client = Self::new(endpoint)?;
        client.login(email, password).await?;
        Ok(client)
    }

    /// API base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        let mut req = self.http.request(method, url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        Ok(req)
    }

    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        if self.token.is_none() {
            return Err(Error::NotAuthenticated);
        }
        self.request(method, path)
    }

    async fn send(req: RequestBuilder) -> Result<String> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::from_response(status.as_u16(), &body));
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T> {
        let body = Self::send(req).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_body<B: Serialize + ?Sized>(req: RequestBuilder, body: &B) -> Result<String> {
        Self::send(req.json(body)).await
    }

    // Status and users

    /// Controller health; needs no login
    pub async fn status(&self) -> Result<ControllerStatus> {
        Self::send_json(self.request(Method::GET, "/status")?).await
    }

    /// Create a user account
    pub async fn signup(&self, request: &SignupRequest) -> Result<()> {
        Self::send_body(self.request(Method::POST, "/user/signup")?, request).await?;
        Ok(())
    }

    /// Obtain an access token
    pub async fn login(&mut self, email: &str, password: &str) -> Result<()> {
        let body = Self::send_body(
            self.request(Method::POST, "/user/login")?,
            &LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            },
        )
        .await?;
        let login: LoginResponse = serde_json::from_str(&body)?;
        if login.access_token.is_empty() {
            return Err(Error::MissingField("accessToken"));
        }
        self.token = Some(login.access_token);
        Ok(())
    }

    // Agents

    /// Register an agent and return its UUID
    pub async fn create_agent(&self, request: &CreateAgentRequest) -> Result<String> {
        let body = Self::send_body(self.authed(Method::POST, "/iofog")?, request).await?;
        let created: UuidResponse = serde_json::from_str(&body)?;
        Ok(created.uuid)
    }

    /// All registered agents
    pub async fn list_agents(&self) -> Result<Vec<AgentInfo>> {
        let list: AgentList = Self::send_json(self.authed(Method::GET, "/iofog-list")?).await?;
        Ok(list.fogs)
    }

    /// Look up an agent by name
    pub async fn get_agent_by_name(&self, name: &str) -> Result<AgentInfo> {
        self.list_agents()
            .await?
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| Error::NotFound(format!("agent {name}")))
    }

    /// Fresh provisioning key for an agent
    pub async fn get_provisioning_key(&self, uuid: &str) -> Result<ProvisioningKey> {
        Self::send_json(self.authed(Method::GET, &format!("/iofog/{uuid}/provisioning-key"))?).await
    }

    /// Rename an agent
    pub async fn update_agent_name(&self, uuid: &str, name: &str) -> Result<()> {
        Self::send_body(
            self.authed(Method::PATCH, &format!("/iofog/{uuid}"))?,
            &serde_json::json!({ "name": name }),
        )
        .await?;
        Ok(())
    }

    /// Unregister an agent
    pub async fn delete_agent(&self, uuid: &str) -> Result<()> {
        Self::send(self.authed(Method::DELETE, &format!("/iofog/{uuid}"))?).await?;
        Ok(())
    }

    /// Ask an agent to upgrade itself on its next status report
    pub async fn upgrade_agent(&self, uuid: &str) -> Result<()> {
        Self::send(self.authed(Method::POST, &format!("/iofog/{uuid}/version/upgrade"))?).await?;
        Ok(())
    }

    // Connectors

    /// Register a connector
    pub async fn register_connector(&self, request: &ConnectorRequest) -> Result<()> {
        Self::send_body(self.authed(Method::POST, "/connector")?, request).await?;
        Ok(())
    }

    /// Unregister a connector by its public address
    pub async fn delete_connector(&self, public_ip: &str) -> Result<()> {
        Self::send_body(
            self.authed(Method::DELETE, "/connector")?,
            &serde_json::json!({ "publicIp": public_ip }),
        )
        .await?;
        Ok(())
    }

    // Applications and microservices

    /// All applications
    pub async fn list_applications(&self) -> Result<Vec<Application>> {
        let list: ApplicationList = Self::send_json(self.authed(Method::GET, "/flow")?).await?;
        Ok(list.flows)
    }

    /// Look up an application by name
    pub async fn get_application_by_name(&self, name: &str) -> Result<Application> {
        self.list_applications()
            .await?
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| Error::NotFound(format!("application {name}")))
    }

    /// Create an application and return its id
    pub async fn create_application(&self, request: &CreateApplicationRequest) -> Result<i64> {
        let body = Self::send_body(self.authed(Method::POST, "/flow")?, request).await?;
        let created: IdResponse = serde_json::from_str(&body)?;
        Ok(created.id)
    }

    /// Microservices of one application
    pub async fn list_microservices(&self, application_id: i64) -> Result<Vec<MicroserviceInfo>> {
        let list: MicroserviceList = Self::send_json(
            self.authed(Method::GET, &format!("/microservices?flowId={application_id}"))?,
        )
        .await?;
        Ok(list.microservices)
    }

    /// Create a microservice and its routes, returning its UUID
    ///
    /// Routes are checked against the application's microservices before
    /// anything is created.
    pub async fn create_microservice(&self, request: &CreateMicroserviceRequest) -> Result<String> {
        let application = self
            .list_applications()
            .await?
            .into_iter()
            .find(|a| a.id == request.flow_id)
            .ok_or_else(|| Error::NotFound(format!("application {}", request.flow_id)))?;
        let known = self.list_microservices(application.id).await?;
        let routes = resolve_routes(&request.name, &application, &request.routes, &known)?;

        let body = Self::send_body(self.authed(Method::POST, "/microservices")?, request).await?;
        let created: UuidResponse = serde_json::from_str(&body)?;

        for dest in routes {
            Self::send(self.authed(
                Method::POST,
                &format!("/microservices/{}/routes/{}", created.uuid, dest),
            )?)
            .await?;
        }
        Ok(created.uuid)
    }

    /// Move a microservice to another agent
    pub async fn move_microservice(&self, uuid: &str, agent_uuid: &str) -> Result<()> {
        Self::send_body(
            self.authed(Method::PATCH, &format!("/microservices/{uuid}"))?,
            &serde_json::json!({ "iofogUuid": agent_uuid }),
        )
        .await?;
        Ok(())
    }

    /// Delete a microservice
    pub async fn delete_microservice(&self, uuid: &str) -> Result<()> {
        Self::send(self.authed(Method::DELETE, &format!("/microservices/{uuid}"))?).await?;
        Ok(())
    }

    /// Catalog of microservice images
    pub async fn list_catalog(&self) -> Result<Vec<CatalogItem>> {
        let list: CatalogList =
            Self::send_json(self.authed(Method::GET, "/catalog/microservices")?).await?;
        Ok(list.catalog_items)
    }
}
