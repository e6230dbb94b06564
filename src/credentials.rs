//! Marketplace OAuth credentials and their refresh lifecycle.

use crate::meli::{MeliError, TokenGrant};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tokens are refreshed this long before their hard expiry.
pub const REFRESH_MARGIN_SECS: i64 = 3600;

/// Issue timestamps are kept at microsecond precision, the resolution the
/// database stores, so conditional writes can compare them exactly.
pub fn issue_stamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub id: Uuid,
    pub owner_id: String,
    pub shop_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub scope: String,
    pub expires_in_seconds: i64,
    pub issued_at: DateTime<Utc>,
    pub marketplace_user_id: i64,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    pub fn from_grant(
        owner_id: &str,
        shop_id: &str,
        grant: TokenGrant,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            shop_id: shop_id.to_string(),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            token_type: grant.token_type,
            scope: grant.scope,
            expires_in_seconds: grant.expires_in,
            issued_at: now,
            marketplace_user_id: grant.user_id,
            created_at: now,
        }
    }

    /// New token pair on the same record: id, owner, shop and creation time
    /// are kept. A grant without a refresh token or user id keeps the old one.
    pub fn renewed(&self, grant: TokenGrant, now: DateTime<Utc>) -> Self {
        Self {
            id: self.id,
            owner_id: self.owner_id.clone(),
            shop_id: self.shop_id.clone(),
            access_token: grant.access_token,
            refresh_token: if grant.refresh_token.is_empty() {
                self.refresh_token.clone()
            } else {
                grant.refresh_token
            },
            token_type: grant.token_type,
            scope: grant.scope,
            expires_in_seconds: grant.expires_in,
            issued_at: now,
            marketplace_user_id: if grant.user_id == 0 {
                self.marketplace_user_id
            } else {
                grant.user_id
            },
            created_at: self.created_at,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        let lifetime =
            TimeDelta::try_seconds(self.expires_in_seconds).unwrap_or_else(TimeDelta::zero);
        self.issued_at
            .checked_add_signed(lifetime)
            .unwrap_or(self.issued_at)
    }

    pub fn refresh_due_at(&self) -> DateTime<Utc> {
        let margin = TimeDelta::try_seconds(REFRESH_MARGIN_SECS).unwrap_or_else(TimeDelta::zero);
        self.expires_at()
            .checked_sub_signed(margin)
            .unwrap_or(self.issued_at)
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now > self.refresh_due_at()
    }

    pub fn view(&self) -> CredentialView {
        CredentialView {
            id: self.id,
            owner_id: self.owner_id.clone(),
            shop_id: self.shop_id.clone(),
            token_type: self.token_type.clone(),
            scope: self.scope.clone(),
            expires_in_seconds: self.expires_in_seconds,
            issued_at: self.issued_at,
            expires_at: self.expires_at(),
            marketplace_user_id: self.marketplace_user_id,
            created_at: self.created_at,
            access_token: String::new(),
            refresh_token: String::new(),
        }
    }
}

/// Credential as shown to its owner; both tokens are blanked.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialView {
    pub id: Uuid,
    pub owner_id: String,
    pub shop_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub scope: String,
    pub expires_in_seconds: i64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub marketplace_user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    Deserialize(String),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_owner(&self, owner_id: &str) -> Result<Option<Credential>, StoreError>;

    async fn find_by_shop(&self, shop_id: &str) -> Result<Option<Credential>, StoreError>;

    async fn insert(&self, credential: &Credential) -> Result<(), StoreError>;

    /// Replaces the owner's record only if its `issued_at` still equals
    /// `expected_issued_at`. Returns `false` when another writer got there first.
    async fn replace(
        &self,
        credential: &Credential,
        expected_issued_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, owner_id: &str) -> Result<bool, StoreError>;
}

/// Talks to the marketplace token endpoint.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, MeliError>;

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, MeliError>;
}

/// Process-local store, used when no database is configured.
#[derive(Default)]
pub struct MemoryCredentialStore {
    records: RwLock<HashMap<String, Credential>>,
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_owner(&self, owner_id: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.records.read().await.get(owner_id).cloned())
    }

    async fn find_by_shop(&self, shop_id: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|credential| credential.shop_id == shop_id)
            .cloned())
    }

    async fn insert(&self, credential: &Credential) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(credential.owner_id.clone(), credential.clone());
        Ok(())
    }

    async fn replace(
        &self,
        credential: &Credential,
        expected_issued_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut guard = self.records.write().await;
        match guard.get_mut(&credential.owner_id) {
            Some(current) if current.issued_at == expected_issued_at => {
                *current = credential.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, owner_id: &str) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(owner_id).is_some())
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("owner {0} has not connected a marketplace account")]
    NotFound(String),
    #[error("credential store failed: {0}")]
    Store(#[from] StoreError),
    #[error("token refresh failed: {0}")]
    Refresh(#[source] MeliError),
    #[error("authorization code exchange failed: {0}")]
    Exchange(#[source] MeliError),
    #[error("shop {0} is already linked to another owner")]
    ShopLinked(String),
}

/// Hands out usable access tokens, refreshing them when they get close to
/// expiry. Refresh-and-persist runs under a per-owner lock and the store write
/// is conditional on the `issued_at` that was read, so concurrent callers for
/// one owner trigger a single refresh and the rest pick up its result.
#[derive(Clone)]
pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    gates: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn CredentialStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            store,
            refresher,
            gates: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn gate(&self, owner_id: &str) -> Arc<Mutex<()>> {
        let mut gates = self.gates.lock().await;
        gates
            .entry(owner_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load(&self, owner_id: &str) -> Result<Credential, CredentialError> {
        self.store
            .find_by_owner(owner_id)
            .await?
            .ok_or_else(|| CredentialError::NotFound(owner_id.to_string()))
    }

    pub async fn ensure_valid(&self, owner_id: &str) -> Result<Credential, CredentialError> {
        let current = self.load(owner_id).await?;
        if !current.is_stale(Utc::now()) {
            return Ok(current);
        }

        let gate = self.gate(owner_id).await;
        let _held = gate.lock().await;

        let current = self.load(owner_id).await?;
        if !current.is_stale(Utc::now()) {
            debug!(
                target = "catalog.credentials",
                owner_id, "credential refreshed by a concurrent caller"
            );
            return Ok(current);
        }

        let grant = self
            .refresher
            .refresh(&current.refresh_token)
            .await
            .map_err(|err| {
                warn!(
                    target = "catalog.credentials",
                    owner_id,
                    error = %err,
                    "token refresh failed"
                );
                CredentialError::Refresh(err)
            })?;
        let renewed = current.renewed(grant, issue_stamp());

        if self.store.replace(&renewed, current.issued_at).await? {
            info!(
                target = "catalog.credentials",
                owner_id,
                expires_at = %renewed.expires_at(),
                "credential refreshed"
            );
            return Ok(renewed);
        }

        // Another instance persisted first; prefer what it stored.
        let latest = self.load(owner_id).await?;
        if latest.is_stale(Utc::now()) {
            Ok(renewed)
        } else {
            Ok(latest)
        }
    }

    /// Exchanges an authorization code and stores the resulting tokens,
    /// replacing any previous grant for the owner.
    pub async fn connect(
        &self,
        owner_id: &str,
        shop_id: &str,
        code: &str,
    ) -> Result<Credential, CredentialError> {
        if let Some(linked) = self.store.find_by_shop(shop_id).await?
            && linked.owner_id != owner_id
        {
            warn!(
                target = "catalog.credentials",
                owner_id,
                shop_id,
                "shop already linked to another owner"
            );
            return Err(CredentialError::ShopLinked(shop_id.to_string()));
        }

        let grant = self
            .refresher
            .exchange_code(code)
            .await
            .map_err(CredentialError::Exchange)?;

        let gate = self.gate(owner_id).await;
        let _held = gate.lock().await;
        let now = issue_stamp();

        match self.store.find_by_owner(owner_id).await? {
            Some(existing) => {
                let mut replacement = existing.renewed(grant, now);
                replacement.shop_id = shop_id.to_string();
                if !self.store.replace(&replacement, existing.issued_at).await? {
                    // Changed between read and write; the new grant wins.
                    self.store.insert(&replacement).await?;
                }
                info!(target = "catalog.credentials", owner_id, shop_id, "credential replaced");
                Ok(replacement)
            }
            None => {
                let credential = Credential::from_grant(owner_id, shop_id, grant, now);
                self.store.insert(&credential).await?;
                info!(target = "catalog.credentials", owner_id, shop_id, "credential created");
                Ok(credential)
            }
        }
    }

    pub async fn disconnect(&self, owner_id: &str) -> Result<(), CredentialError> {
        if self.store.delete(owner_id).await? {
            info!(target = "catalog.credentials", owner_id, "credential deleted");
            Ok(())
        } else {
            Err(CredentialError::NotFound(owner_id.to_string()))
        }
    }
}
