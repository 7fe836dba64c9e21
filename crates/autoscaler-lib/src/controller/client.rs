//! HTTP client for the container controller API

use crate::collector::{ContainerDiscovery, RecordStream, StatsSource};
use crate::models::ContainerInfo;
use crate::scaler::ScaleExecutor;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::{Client, Response};
use serde::Serialize;
use std::time::Duration;
use tokio_util::io::StreamReader;
use tracing::debug;
use url::Url;

/// Configuration for the controller client
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub base_url: String,
    pub api_key: String,
    /// Timeout for listing and scaling calls; stats streams have none
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl ControllerConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Serialize)]
struct ScaleRequest {
    containers: usize,
}

/// Client for container listing, stats streaming and scaling
pub struct ControllerClient {
    client: Client,
    base_url: Url,
    api_key: String,
    request_timeout: Duration,
}

impl ControllerClient {
    pub fn new(config: ControllerConfig) -> Result<Self> {
        // No overall timeout here, it would cut long-lived stats streams
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(&config.base_url).context("Invalid controller URL")?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Controller URL cannot be a base: {}", config.base_url);
        }

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
            request_timeout: config.request_timeout,
        })
    }

    /// Build an API URL from path segments, escaping each one
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Controller URL cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut().append_pair("ApiKey", &self.api_key);
        Ok(url)
    }

    async fn check(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Controller API error ({}): {}", status, body.trim())
    }
}

#[async_trait]
impl ContainerDiscovery for ControllerClient {
    async fn list_containers(&self, app: &str, service: &str) -> Result<Vec<ContainerInfo>> {
        let url = self.endpoint(&["api", "apps", app, "services", service, "containers"])?;

        let response = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .context("Failed to call container list API")?;

        Self::check(response)
            .await?
            .json()
            .await
            .context("Failed to parse container list")
    }
}

#[async_trait]
impl StatsSource for ControllerClient {
    async fn open(&self, container_id: &str) -> Result<RecordStream> {
        let url = self.endpoint(&["api", "containers", container_id, "stats"])?;
        debug!(container_id = %container_id, "Opening stats stream");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to open stats stream for {container_id}"))?;
        let response = Self::check(response).await?;

        let body = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        Ok(Box::new(StreamReader::new(Box::pin(body))))
    }
}

#[async_trait]
impl ScaleExecutor for ControllerClient {
    async fn scale(&self, app: &str, service: &str, target: usize) -> Result<()> {
        let url = self.endpoint(&["api", "apps", app, "services", service, "scale"])?;

        let response = self
            .client
            .post(url)
            .timeout(self.request_timeout)
            .json(&ScaleRequest { containers: target })
            .send()
            .await
            .with_context(|| format!("Failed to call scale API for {app}.{service}"))?;

        Self::check(response).await?;
        Ok(())
    }
}
