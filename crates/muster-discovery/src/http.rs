//! HTTP client for the registry API

use std::time::Duration;

use muster_api::{REGISTER_PATH, RegisterRequest, RegisterResponse, SERVICES_PATH, ServiceInstance};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::DiscoveryError;

#[derive(Clone)]
pub struct RegistryHttpClient {
    client: Client,
    base_url: String,
}

impl RegistryHttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DiscoveryError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /register`
    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, DiscoveryError> {
        let url = format!("{}{}", self.base_url, REGISTER_PATH);
        debug!(url = %url, service = %request.name, "Registering");
        let response = self.client.post(&url).json(request).send().await?;
        read_json(response).await
    }

    /// `GET /services`
    pub async fn list_all(&self) -> Result<Vec<ServiceInstance>, DiscoveryError> {
        let url = format!("{}{}", self.base_url, SERVICES_PATH);
        let response = self.client.get(&url).send().await?;
        read_json(response).await
    }

    /// `GET /services/{name}`. A 404 means the registry answered and knows no
    /// instance of `name`.
    pub async fn list_by_name(&self, name: &str) -> Result<Vec<ServiceInstance>, DiscoveryError> {
        let url = format!("{}{}/{}", self.base_url, SERVICES_PATH, name);
        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, DiscoveryError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DiscoveryError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<T>().await?)
}
