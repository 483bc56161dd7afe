//! Microservices on the namespace's Controller
//!
//! The Controller owns microservices; the store keeps a copy keyed by name so
//! `get` and `move` work offline. [`fetch`] rebuilds that copy from the
//! Controller and [`deploy`] creates one microservice from a catalog item.

use crate::error::{Error, Result};
use controller_client::{
    AgentInfo, Application, CatalogItem, ControllerClient, CreateApplicationRequest,
    CreateMicroserviceRequest, MicroserviceInfo,
};
use resource_store::Microservice;
use std::collections::HashMap;
use tracing::{debug, info};

/// What to run, where, and what it routes to
#[derive(Debug, Clone)]
pub struct MicroserviceSpec {
    /// Name, unique within the namespace
    pub name: String,
    /// Agent to run on
    pub agent: String,
    /// Application to add it to; created when missing
    pub application: String,
    /// Catalog item to instantiate
    pub image: String,
    /// Free-form JSON config
    pub config: Option<String>,
    /// Names of microservices of the same application it routes to
    pub routes: Vec<String>,
}

/// Store records for everything the Controller runs
///
/// Agents, applications and catalog items are referred to by name; a UUID
/// the Controller no longer knows is kept as is.
pub fn records(
    applications: &[Application],
    microservices: &[MicroserviceInfo],
    catalog: &[CatalogItem],
    agents: &[AgentInfo],
) -> Vec<Microservice> {
    let agent_names: HashMap<&str, &str> = agents
        .iter()
        .map(|a| (a.uuid.as_str(), a.name.as_str()))
        .collect();
    let application_names: HashMap<i64, &str> = applications
        .iter()
        .map(|a| (a.id, a.name.as_str()))
        .collect();
    let images: HashMap<i64, &str> = catalog.iter().map(|c| (c.id, c.name.as_str())).collect();
    let names: HashMap<&str, &str> = microservices
        .iter()
        .map(|m| (m.uuid.as_str(), m.name.as_str()))
        .collect();

    microservices
        .iter()
        .map(|m| Microservice {
            name: m.name.clone(),
            uuid: m.uuid.clone(),
            agent: agent_names
                .get(m.iofog_uuid.as_str())
                .copied()
                .unwrap_or(m.iofog_uuid.as_str())
                .to_string(),
            application: application_names
                .get(&m.flow_id)
                .map(|name| name.to_string())
                .unwrap_or_else(|| m.flow_id.to_string()),
            image: images
                .get(&m.catalog_item_id)
                .map(|name| name.to_string())
                .unwrap_or_default(),
            routes: m
                .routes
                .iter()
                .map(|uuid| names.get(uuid.as_str()).copied().unwrap_or(uuid.as_str()).to_string())
                .collect(),
        })
        .collect()
}

/// Read every microservice off the Controller
pub async fn fetch(client: &ControllerClient) -> Result<Vec<Microservice>> {
    let applications = client.list_applications().await?;
    let mut microservices = Vec::new();
    for application in &applications {
        microservices.extend(client.list_microservices(application.id).await?);
    }
    let catalog = client.list_catalog().await?;
    let agents = client.list_agents().await?;
    debug!(
        "Controller runs {} microservices in {} applications",
        microservices.len(),
        applications.len()
    );
    Ok(records(&applications, &microservices, &catalog, &agents))
}

/// Application named `name`, created when the Controller has none
async fn find_or_create_application(client: &ControllerClient, name: &str) -> Result<Application> {
    match client.get_application_by_name(name).await {
        Ok(application) => Ok(application),
        Err(e) if e.is_not_found() => {
            info!("Creating application {}", name);
            let request = CreateApplicationRequest {
                name: name.to_string(),
                description: String::new(),
                is_activated: true,
            };
            let id = client.create_application(&request).await?;
            Ok(Application {
                id,
                name: name.to_string(),
                description: String::new(),
                is_activated: true,
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Create `spec` on the agent with UUID `agent_uuid` and return its record
pub async fn deploy(
    client: &ControllerClient,
    spec: &MicroserviceSpec,
    agent_uuid: &str,
) -> Result<Microservice> {
    let item = client
        .list_catalog()
        .await?
        .into_iter()
        .find(|item| item.name == spec.image)
        .ok_or_else(|| Error::NotFound(format!("catalog item {}", spec.image)))?;
    let application = find_or_create_application(client, &spec.application).await?;

    let request = CreateMicroserviceRequest {
        name: spec.name.clone(),
        catalog_item_id: item.id,
        flow_id: application.id,
        iofog_uuid: agent_uuid.to_string(),
        config: spec.config.clone().unwrap_or_else(|| "{}".to_string()),
        routes: spec.routes.clone(),
    };
    let uuid = client.create_microservice(&request).await?;
    info!("Created microservice {} in {}", spec.name, application.name);

    Ok(Microservice {
        name: spec.name.clone(),
        uuid,
        agent: spec.agent.clone(),
        application: application.name,
        image: item.name,
        routes: spec.routes.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_records_use_names() {
        let applications: Vec<Application> =
            serde_json::from_value(json!([{ "id": 4, "name": "sensors" }])).unwrap();
        let catalog: Vec<CatalogItem> =
            serde_json::from_value(json!([{ "id": 11, "name": "heart-rate" }])).unwrap();
        let agents: Vec<AgentInfo> =
            serde_json::from_value(json!([{ "uuid": "ag-1", "name": "edge-1" }])).unwrap();
        let microservices: Vec<MicroserviceInfo> = serde_json::from_value(json!([
            {
                "uuid": "ms-1",
                "name": "reader",
                "iofogUuid": "ag-1",
                "flowId": 4,
                "catalogItemId": 11,
                "routes": ["ms-2"]
            },
            {
                "uuid": "ms-2",
                "name": "viewer",
                "iofogUuid": "ag-gone",
                "flowId": 4,
                "catalogItemId": 99
            }
        ]))
        .unwrap();

        let records = records(&applications, &microservices, &catalog, &agents);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].agent, "edge-1");
        assert_eq!(records[0].application, "sensors");
        assert_eq!(records[0].image, "heart-rate");
        assert_eq!(records[0].routes, ["viewer"]);
        assert_eq!(records[1].agent, "ag-gone");
        assert_eq!(records[1].image, "");
        assert!(records[1].routes.is_empty());
    }
}
