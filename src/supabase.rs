use crate::credentials::{Credential, CredentialStore, StoreError};
use crate::http::build_client;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;
use urlencoding::encode;

const TABLE: &str = "marketplace_credentials";

/// Credential store backed by a Supabase (PostgREST) table.
#[derive(Debug, Clone)]
pub struct SupabaseCredentialStore {
    base_url: String,
    service_key: String,
    http: Client,
}

impl SupabaseCredentialStore {
    pub fn new(base_url: &str, service_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            http: build_client(),
        }
    }

    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("SUPABASE_URL").ok()?;
        let service_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .or_else(|_| std::env::var("SUPABASE_SERVICE_KEY"))
            .or_else(|_| std::env::var("SUPABASE_KEY"))
            .ok()?;
        Some(Self::new(&base_url, &service_key))
    }

    fn table_url(&self, filters: &str) -> String {
        format!("{}/rest/v1/{}?{}", self.base_url, TABLE, filters)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    async fn rows<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Vec<T>, StoreError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|err| StoreError::Deserialize(err.to_string()))
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Credential>, StoreError> {
        let url = self.table_url(&format!(
            "{column}=eq.{}&select=*&limit=1",
            encode(value)
        ));
        let mut rows: Vec<Credential> = self.rows(self.http.get(url)).await?;
        Ok(rows.pop())
    }
}

fn timestamp_filter(at: DateTime<Utc>) -> String {
    encode(&at.to_rfc3339_opts(SecondsFormat::Micros, true)).into_owned()
}

#[async_trait]
impl CredentialStore for SupabaseCredentialStore {
    async fn find_by_owner(&self, owner_id: &str) -> Result<Option<Credential>, StoreError> {
        self.find_one("owner_id", owner_id).await
    }

    async fn find_by_shop(&self, shop_id: &str) -> Result<Option<Credential>, StoreError> {
        self.find_one("shop_id", shop_id).await
    }

    async fn insert(&self, credential: &Credential) -> Result<(), StoreError> {
        let url = self.table_url("on_conflict=owner_id");
        let request = self
            .http
            .post(url)
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[credential]);
        let rows: Vec<Credential> = self.rows(request).await?;
        debug!(
            target = "catalog.store",
            owner_id = %credential.owner_id,
            rows = rows.len(),
            "credential upserted"
        );
        Ok(())
    }

    async fn replace(
        &self,
        credential: &Credential,
        expected_issued_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let url = self.table_url(&format!(
            "owner_id=eq.{}&issued_at=eq.{}",
            encode(&credential.owner_id),
            timestamp_filter(expected_issued_at)
        ));
        let request = self
            .http
            .patch(url)
            .header("Prefer", "return=representation")
            .json(credential);
        let rows: Vec<Credential> = self.rows(request).await?;
        Ok(!rows.is_empty())
    }

    async fn delete(&self, owner_id: &str) -> Result<bool, StoreError> {
        let url = self.table_url(&format!("owner_id=eq.{}", encode(owner_id)));
        let request = self
            .http
            .delete(url)
            .header("Prefer", "return=representation");
        let rows: Vec<Credential> = self.rows(request).await?;
        Ok(!rows.is_empty())
    }
}
