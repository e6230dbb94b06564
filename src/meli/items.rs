use crate::http::build_client;
use crate::meli::models::{ItemEnvelope, ItemSearchPage, SizeChart};
use crate::meli::{MeliConfig, MeliError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use urlencoding::encode;

/// Read side of the marketplace catalog API.
#[async_trait]
pub trait MarketplaceCatalog: Send + Sync {
    async fn list_item_ids(
        &self,
        seller_id: i64,
        offset: usize,
        limit: usize,
        access_token: &str,
    ) -> Result<ItemSearchPage, MeliError>;

    async fn get_items(
        &self,
        ids: &[String],
        access_token: &str,
    ) -> Result<Vec<ItemEnvelope>, MeliError>;

    async fn get_item(&self, item_id: &str, access_token: &str) -> Result<Value, MeliError>;

    async fn size_chart(&self, chart_id: &str, access_token: &str)
    -> Result<SizeChart, MeliError>;
}

#[derive(Debug, Clone)]
pub struct MeliClient {
    api_root: String,
    http: Client,
}

impl MeliClient {
    pub fn new(config: &MeliConfig) -> Self {
        Self {
            api_root: config.api_root.trim_end_matches('/').to_string(),
            http: build_client(),
        }
    }

    async fn send(
        endpoint: &'static str,
        request: RequestBuilder,
        access_token: &str,
    ) -> Result<Response, MeliError> {
        let response = request
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| MeliError::transport(endpoint, err))?;
        if !response.status().is_success() {
            return Err(MeliError::Upstream {
                endpoint,
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
        access_token: &str,
    ) -> Result<T, MeliError> {
        Self::send(endpoint, request, access_token)
            .await?
            .json()
            .await
            .map_err(|err| MeliError::decode(endpoint, err))
    }
}

#[async_trait]
impl MarketplaceCatalog for MeliClient {
    async fn list_item_ids(
        &self,
        seller_id: i64,
        offset: usize,
        limit: usize,
        access_token: &str,
    ) -> Result<ItemSearchPage, MeliError> {
        if seller_id <= 0 {
            return Err(MeliError::InvalidInput("seller id is required"));
        }
        let url = format!("{}/users/{}/items/search", self.api_root, seller_id);
        let request = self
            .http
            .get(url)
            .query(&[("offset", offset), ("limit", limit)]);
        self.get_json("list_seller_items", request, access_token)
            .await
    }

    async fn get_items(
        &self,
        ids: &[String],
        access_token: &str,
    ) -> Result<Vec<ItemEnvelope>, MeliError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/items", self.api_root);
        let request = self.http.get(url).query(&[("ids", ids.join(","))]);
        self.get_json("batch_get_items", request, access_token)
            .await
    }

    async fn get_item(&self, item_id: &str, access_token: &str) -> Result<Value, MeliError> {
        let item_id = item_id.trim();
        if item_id.is_empty() {
            return Err(MeliError::InvalidInput("item id is required"));
        }
        let url = format!("{}/items/{}", self.api_root, encode(item_id));
        self.get_json("get_item", self.http.get(url), access_token)
            .await
    }

    async fn size_chart(
        &self,
        chart_id: &str,
        access_token: &str,
    ) -> Result<SizeChart, MeliError> {
        let chart_id = chart_id.trim();
        if chart_id.is_empty() {
            return Err(MeliError::InvalidInput("chart id is required"));
        }
        let url = format!("{}/catalog/charts/{}", self.api_root, encode(chart_id));
        self.get_json("size_chart", self.http.get(url), access_token)
            .await
    }
}
