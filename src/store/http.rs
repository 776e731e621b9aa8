//! HTTP client for the remote store's REST API

use super::traits::{RemoteStore, StoreError, StoreResult};
use crate::types::{Action, Instance, Topology};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

const API_ROOT: &str = "/data/v1_1";

/// Connection settings for [`HttpStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpStoreConfig {
    pub address: String,
    /// Defaults to 80, or 443 with `https`.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub https: bool,
    /// Prepended to every endpoint path (e.g. a reverse-proxy mount point).
    #[serde(default)]
    pub endpoint_prefix: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl HttpStoreConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: None,
            https: false,
            endpoint_prefix: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_https(mut self, https: bool) -> Self {
        self.https = https;
        self
    }

    pub fn with_endpoint_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.endpoint_prefix = prefix.into();
        self
    }

    /// Scheme, host and port, plus the endpoint prefix.
    pub fn base_url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        let port = self.port.unwrap_or(if self.https { 443 } else { 80 });
        format!(
            "{}://{}:{}{}",
            scheme,
            self.address,
            port,
            self.endpoint_prefix.trim_end_matches('/')
        )
    }
}

/// A `RemoteStore` speaking JSON over HTTP.
pub struct HttpStore {
    config: HttpStoreConfig,
    client: Mutex<Option<Client>>,
}

impl HttpStore {
    pub fn new(config: HttpStoreConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HttpStoreConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}{}", self.config.base_url(), API_ROOT, endpoint)
    }

    fn client(&self) -> StoreResult<Client> {
        self.client
            .lock()
            .map_err(|_| StoreError::Connection("client lock poisoned".to_string()))?
            .clone()
            .ok_or(StoreError::NotConnected)
    }

    /// POST a JSON body and check for the expected status.
    async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        expected: StatusCode,
    ) -> StoreResult<reqwest::Response> {
        let client = self.client()?;
        let url = self.url(endpoint);
        let payload = serde_json::to_vec(body)?;
        tracing::trace!(%url, bytes = payload.len(), "POST");

        let response = client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .body(payload)
            .send()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let status = response.status();
        if status != expected {
            tracing::debug!(%url, %status, "unexpected response status");
            return Err(StoreError::Request {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> StoreResult<T> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StoreError::Response(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Response(e.to_string()))
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn connect(&self) -> StoreResult<()> {
        let mut guard = self
            .client
            .lock()
            .map_err(|_| StoreError::Connection("client lock poisoned".to_string()))?;
        if guard.is_some() {
            return Ok(());
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        *guard = Some(client);
        tracing::debug!(base = %self.config.base_url(), "connected");
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        if let Ok(mut guard) = self.client.lock() {
            guard.take();
        }
        Ok(())
    }

    async fn create_action(&self, action: &Action) -> StoreResult<Action> {
        let response = self.post("/actions", action, StatusCode::CREATED).await?;
        Self::decode(response).await
    }

    async fn create_topology(&self, topology: &Topology) -> StoreResult<Topology> {
        let response = self.post("/topologies", topology, StatusCode::CREATED).await?;
        let mut created: Topology = Self::decode(response).await?;
        // The store does not echo labels back; keep ours for the link call.
        if created.labels.is_empty() {
            created.labels = topology.labels.clone();
        }
        Ok(created)
    }

    async fn batch_create(&self, instances: &[Instance]) -> StoreResult<()> {
        self.post("/instances", instances, StatusCode::CREATED).await?;
        Ok(())
    }

    async fn link(&self, action: &Action, topology: &Topology) -> StoreResult<()> {
        let action_id = action
            .id
            .ok_or_else(|| StoreError::Response("action has no identity".to_string()))?;
        let endpoint = format!("/actions/{}/topologies", action_id);
        self.post(&endpoint, &topology.link_payload(), StatusCode::CREATED)
            .await?;
        Ok(())
    }
}
