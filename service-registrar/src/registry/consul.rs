use crate::config::{format_duration, HealthPolicy};
use crate::registry::traits::{RegistryError, ServiceRegistry};
use crate::service::{Service, ServiceId};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    tags: Vec<String>,
    address: &'a str,
    port: u16,
    check: AgentServiceCheck,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceCheck {
    #[serde(rename = "TTL")]
    ttl: String,
    deregister_critical_service_after: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CheckUpdate<'a> {
    status: &'a str,
    output: &'a str,
}

/// Registers services with a local Consul agent over its HTTP API.
///
/// Each service carries one TTL check, whose id Consul derives as
/// `service:<service id>`; renewing marks that check as passing.
pub struct ConsulRegistry {
    client: Client,
    base_url: String,
}

impl ConsulRegistry {
    /// `endpoint` is `host:port` or a full `http(s)://` base URL.
    pub fn new(endpoint: &str) -> Result<Self, RegistryError> {
        let base_url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", endpoint.trim_end_matches('/'))
        };
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        info!("Consul: Using agent at {}", base_url);
        Ok(Self { client, base_url })
    }

    fn put(&self, path: &str) -> RequestBuilder {
        self.client.put(format!("{}{}", self.base_url, path))
    }

    async fn execute(
        &self,
        operation: &'static str,
        id: &ServiceId,
        request: RequestBuilder,
    ) -> Result<(), RegistryError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!("Consul: {} {} -> {}", operation, id, status);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(RegistryError::Rejected {
            operation,
            id: id.clone(),
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ServiceRegistry for ConsulRegistry {
    async fn register(
        &self,
        service: &Service,
        policy: &HealthPolicy,
    ) -> Result<(), RegistryError> {
        let id = service.id();
        let registration = AgentServiceRegistration {
            id: id.as_str(),
            name: service.name(),
            tags: Vec::new(),
            address: service.host(),
            port: service.port(),
            check: AgentServiceCheck {
                ttl: format_duration(policy.ttl()),
                deregister_critical_service_after: format_duration(policy.deregister_after()),
            },
        };

        let request = self.put("/v1/agent/service/register").json(&registration);
        self.execute("register", &id, request).await
    }

    async fn renew(&self, id: &ServiceId) -> Result<(), RegistryError> {
        let update = CheckUpdate {
            status: "passing",
            output: "",
        };
        let request = self
            .put(&format!("/v1/agent/check/update/service:{}", id))
            .json(&update);
        self.execute("renew", id, request).await
    }

    async fn deregister(&self, id: &ServiceId) -> Result<(), RegistryError> {
        let request = self.put(&format!("/v1/agent/service/deregister/{}", id));
        self.execute("deregister", id, request).await
    }
}
