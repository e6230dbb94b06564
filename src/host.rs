//! Clients for the host platform: the catalog write API and the shops service.

use crate::catalog::CanonicalItem;
use crate::http::build_client;
use crate::security::OwnerContext;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use urlencoding::encode;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("host responded with HTTP {0}")]
    Upstream(u16),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("host endpoint is not configured: {0}")]
    NotConfigured(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    #[serde(default)]
    pub total_items: usize,
    #[serde(default)]
    pub created_count: usize,
    #[serde(default)]
    pub updated_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shop {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Serialize)]
struct BulkUpsertRequest<'a> {
    items: &'a [CanonicalItem],
}

/// Destination of transformed items.
#[async_trait]
pub trait CatalogSink: Send + Sync {
    async fn bulk_upsert(&self, items: &[CanonicalItem]) -> Result<LoadSummary, HostError>;

    async fn delete_batch(&self, batch_id: &str) -> Result<(), HostError>;
}

/// Resolves which shop an authenticated owner sells from.
#[async_trait]
pub trait ShopDirectory: Send + Sync {
    async fn shop_for_owner(&self, owner: &OwnerContext) -> Result<Shop, HostError>;
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub items_url: String,
    pub shops_url: String,
}

impl HostConfig {
    pub fn from_env() -> Self {
        let read = |key: &str| {
            std::env::var(key)
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_default()
        };
        Self {
            items_url: read("HOST_ITEMS_URL"),
            shops_url: read("HOST_SHOPS_URL"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HostClient {
    config: HostConfig,
    http: Client,
}

impl HostClient {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            http: build_client(),
        }
    }

    fn items_root(&self) -> Result<&str, HostError> {
        match self.config.items_url.as_str() {
            "" => Err(HostError::NotConfigured("HOST_ITEMS_URL")),
            root => Ok(root),
        }
    }
}

#[async_trait]
impl CatalogSink for HostClient {
    async fn bulk_upsert(&self, items: &[CanonicalItem]) -> Result<LoadSummary, HostError> {
        let url = format!("{}/items/bulk", self.items_root()?);
        let response = self
            .http
            .post(url)
            .json(&BulkUpsertRequest { items })
            .send()
            .await
            .map_err(|err| HostError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(HostError::Upstream(response.status().as_u16()));
        }

        let summary: LoadSummary = response
            .json()
            .await
            .map_err(|err| HostError::Decode(err.to_string()))?;
        info!(
            target = "catalog.sync",
            sent = items.len(),
            created = summary.created_count,
            updated = summary.updated_count,
            "bulk upsert accepted"
        );
        Ok(summary)
    }

    async fn delete_batch(&self, batch_id: &str) -> Result<(), HostError> {
        let url = format!("{}/items/batches/{}", self.items_root()?, encode(batch_id));
        let response = self
            .http
            .delete(url)
            .send()
            .await
            .map_err(|err| HostError::Transport(err.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(HostError::NotFound("batch")),
            status => Err(HostError::Upstream(status.as_u16())),
        }
    }
}

#[async_trait]
impl ShopDirectory for HostClient {
    async fn shop_for_owner(&self, owner: &OwnerContext) -> Result<Shop, HostError> {
        if self.config.shops_url.is_empty() {
            return Err(HostError::NotConfigured("HOST_SHOPS_URL"));
        }
        let url = format!("{}/shops", self.config.shops_url);
        let response = self
            .http
            .get(url)
            .header("Authorization", &owner.authorization)
            .send()
            .await
            .map_err(|err| HostError::Transport(err.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json()
                .await
                .map_err(|err| HostError::Decode(err.to_string())),
            StatusCode::NOT_FOUND => Err(HostError::NotFound("shop")),
            status => Err(HostError::Upstream(status.as_u16())),
        }
    }
}
