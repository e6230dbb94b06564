use crate::catalog::transform::{
    decode_listing, listing_identity, size_chart_reference, transform,
};
use crate::catalog::{CanonicalItem, TransformContext, TransformError};
use crate::credentials::{Credential, CredentialError, CredentialManager};
use crate::host::{CatalogSink, HostError, ShopDirectory};
use crate::meli::fetcher::{self, FetchError, PagePlan};
use crate::meli::models::SizeChart;
use crate::meli::{MarketplaceCatalog, MeliError};
use crate::models::{ItemIdsResponse, StageReport};
use crate::security::OwnerContext;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{collections::HashMap, env, future::Future, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    pub page_size: usize,
    pub max_pages: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_pages: 500,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |key: &str, fallback: usize| {
            env::var(key)
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(fallback)
        };
        Self {
            page_size: read("SYNC_PAGE_SIZE", defaults.page_size),
            max_pages: read("SYNC_MAX_PAGES", defaults.max_pages),
        }
    }

    fn plan(&self) -> PagePlan {
        PagePlan {
            page_size: self.page_size,
            max_pages: self.max_pages,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Transform,
    Load,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedItem {
    pub external_id: String,
    pub title: String,
    pub stage: FailureStage,
    pub error_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub batch_id: String,
    pub total_items: usize,
    pub created_count: usize,
    pub updated_count: usize,
    pub failure_count: usize,
    pub failed_items: Vec<FailedItem>,
}

impl SyncResult {
    pub fn loaded(&self) -> usize {
        self.created_count + self.updated_count
    }

    /// A run fails as a whole only when nothing landed and something broke.
    pub fn is_total_failure(&self) -> bool {
        self.loaded() == 0 && self.failure_count > 0
    }
}

/// Result of one run plus the per-stage transcript.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRun {
    #[serde(flatten)]
    pub result: SyncResult,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
    partial: Option<Box<SyncRun>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    BadRequest,
    NotFound,
    BadGateway,
    Internal,
    EtlFailed,
}

impl PipelineErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineErrorKind::BadRequest => "bad_request",
            PipelineErrorKind::NotFound => "not_found",
            PipelineErrorKind::BadGateway => "bad_gateway",
            PipelineErrorKind::Internal => "internal_server_error",
            PipelineErrorKind::EtlFailed => "etl_failed",
        }
    }
}

impl PipelineError {
    fn new(stage: &'static str, message: impl Into<String>, kind: PipelineErrorKind) -> Self {
        Self {
            stage,
            message: message.into(),
            kind,
            partial: None,
        }
    }

    pub fn bad_request(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::BadRequest)
    }

    pub fn not_found(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::NotFound)
    }

    pub fn bad_gateway(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::BadGateway)
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::Internal)
    }

    pub fn etl_failed(run: SyncRun) -> Self {
        let message = format!(
            "all {} items failed to synchronize",
            run.result.failure_count
        );
        Self {
            stage: "load",
            message,
            kind: PipelineErrorKind::EtlFailed,
            partial: Some(Box::new(run)),
        }
    }

    pub fn from_meli(stage: &'static str, err: MeliError) -> Self {
        let kind = match &err {
            MeliError::InvalidInput(_) => PipelineErrorKind::BadRequest,
            MeliError::Transport { .. } | MeliError::Upstream { .. } => {
                PipelineErrorKind::BadGateway
            }
            MeliError::MissingCredentials | MeliError::Decode { .. } => {
                PipelineErrorKind::Internal
            }
        };
        Self::new(stage, err.to_string(), kind)
    }

    pub fn from_credentials(stage: &'static str, err: CredentialError) -> Self {
        match err {
            CredentialError::NotFound(_) => Self::not_found(stage, err.to_string()),
            CredentialError::ShopLinked(_) => Self::bad_request(stage, err.to_string()),
            CredentialError::Store(_) => Self::internal(stage, err.to_string()),
            CredentialError::Refresh(inner) | CredentialError::Exchange(inner) => {
                Self::from_meli(stage, inner)
            }
        }
    }

    pub fn from_host(stage: &'static str, err: HostError) -> Self {
        let kind = match &err {
            HostError::NotFound(_) => PipelineErrorKind::NotFound,
            HostError::Transport(_) | HostError::Upstream(_) => PipelineErrorKind::BadGateway,
            HostError::Decode(_) | HostError::NotConfigured(_) => PipelineErrorKind::Internal,
        };
        Self::new(stage, err.to_string(), kind)
    }

    pub fn from_fetch(stage: &'static str, err: FetchError) -> Self {
        match err {
            FetchError::Marketplace(inner) => Self::from_meli(stage, inner),
            FetchError::InvalidPageSize => Self::internal(stage, err.to_string()),
            FetchError::PageLimitExceeded(_) => Self::bad_gateway(stage, err.to_string()),
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }

    pub fn partial(&self) -> Option<&SyncRun> {
        self.partial.as_deref()
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

struct Transformed {
    items: Vec<CanonicalItem>,
    failed: Vec<FailedItem>,
    charts_fetched: usize,
}

struct Loaded {
    created: usize,
    updated: usize,
    failed: Vec<FailedItem>,
}

/// One synchronization run: resolve shop, ensure a valid token, extract,
/// transform item by item, then bulk load.
#[derive(Clone)]
pub struct SyncPipeline {
    credentials: CredentialManager,
    marketplace: Arc<dyn MarketplaceCatalog>,
    sink: Arc<dyn CatalogSink>,
    shops: Arc<dyn ShopDirectory>,
    config: SyncConfig,
}

impl SyncPipeline {
    pub fn new(
        credentials: CredentialManager,
        marketplace: Arc<dyn MarketplaceCatalog>,
        sink: Arc<dyn CatalogSink>,
        shops: Arc<dyn ShopDirectory>,
        config: SyncConfig,
    ) -> Self {
        Self {
            credentials,
            marketplace,
            sink,
            shops,
            config,
        }
    }

    pub async fn run(&self, owner: &OwnerContext) -> Result<SyncRun, PipelineError> {
        let started = Instant::now();
        let mut stages = Vec::new();
        let batch_id = format!("meli-{}", Uuid::new_v4().simple());

        let shop = self
            .capture_stage("resolve_shop", &mut stages, async {
                let shop = self
                    .shops
                    .shop_for_owner(owner)
                    .await
                    .map_err(|err| PipelineError::from_host("resolve_shop", err))?;
                let output = json!({ "shop_id": shop.id });
                Ok::<_, PipelineError>(StageOutcome::new(shop, output))
            })
            .await?;

        let credential = self
            .capture_stage("credentials", &mut stages, async {
                let credential = self.valid_credential(&owner.owner_id).await?;
                let output = json!({
                    "marketplace_user_id": credential.marketplace_user_id,
                    "expires_at": credential.expires_at(),
                });
                Ok::<_, PipelineError>(StageOutcome::new(credential, output))
            })
            .await?;

        let bodies = self
            .capture_stage("extract", &mut stages, async {
                let bodies = fetcher::fetch_all_items(
                    self.marketplace.as_ref(),
                    credential.marketplace_user_id,
                    &credential.access_token,
                    self.config.plan(),
                )
                .await
                .map_err(|err| PipelineError::from_fetch("extract", err))?;
                if bodies.is_empty() {
                    return Err(PipelineError::not_found(
                        "extract",
                        "no items found for seller",
                    ));
                }
                let output = json!({ "items": bodies.len() });
                Ok::<_, PipelineError>(StageOutcome::new(bodies, output))
            })
            .await?;
        let total_items = bodies.len();

        let ctx = TransformContext {
            shop_id: shop.id.clone(),
            owner_id: owner.owner_id.clone(),
            batch_id: batch_id.clone(),
            imported_at: Utc::now(),
        };
        let transformed = self
            .capture_stage("transform", &mut stages, async {
                let transformed = self
                    .transform_all(&bodies, &ctx, &credential.access_token)
                    .await;
                let output = json!({
                    "transformed": transformed.items.len(),
                    "failed": transformed.failed.len(),
                    "size_charts_fetched": transformed.charts_fetched,
                });
                Ok::<_, PipelineError>(StageOutcome::new(transformed, output))
            })
            .await?;
        let Transformed {
            items,
            failed: mut failed_items,
            ..
        } = transformed;

        let loaded = self
            .capture_stage("load", &mut stages, async {
                let loaded = self.load(items).await;
                let output = json!({
                    "created": loaded.created,
                    "updated": loaded.updated,
                    "failed": loaded.failed.len(),
                });
                Ok::<_, PipelineError>(StageOutcome::new(loaded, output))
            })
            .await?;
        failed_items.extend(loaded.failed);

        let result = SyncResult {
            batch_id,
            total_items,
            created_count: loaded.created,
            updated_count: loaded.updated,
            failure_count: failed_items.len(),
            failed_items,
        };
        crate::metrics::sync_outcome(&owner.owner_id, result.loaded(), result.failure_count);
        info!(
            target = "catalog.sync",
            owner_id = %owner.owner_id,
            batch_id = %result.batch_id,
            total = result.total_items,
            created = result.created_count,
            updated = result.updated_count,
            failed = result.failure_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sync finished"
        );

        let failed_run = result.is_total_failure();
        let run = SyncRun { result, stages };
        if failed_run {
            return Err(PipelineError::etl_failed(run));
        }
        Ok(run)
    }

    async fn valid_credential(&self, owner_id: &str) -> Result<Credential, PipelineError> {
        let credential = self
            .credentials
            .ensure_valid(owner_id)
            .await
            .map_err(|err| PipelineError::from_credentials("credentials", err))?;
        if credential.marketplace_user_id <= 0 {
            return Err(PipelineError::bad_request(
                "credentials",
                "seller id not found in credentials",
            ));
        }
        Ok(credential)
    }

    async fn transform_all(
        &self,
        bodies: &[Value],
        ctx: &TransformContext,
        access_token: &str,
    ) -> Transformed {
        let mut items = Vec::with_capacity(bodies.len());
        let mut failed = Vec::new();
        let mut charts: HashMap<String, Option<SizeChart>> = HashMap::new();

        for body in bodies {
            let (external_id, title) = listing_identity(body);
            let item = match decode_listing(body) {
                Ok(item) => item,
                Err(err) => {
                    failed.push(transform_failure(external_id, title, &err));
                    continue;
                }
            };

            let chart = match size_chart_reference(&item) {
                Some(chart_id) => {
                    if !charts.contains_key(&chart_id) {
                        let fetched = match self
                            .marketplace
                            .size_chart(&chart_id, access_token)
                            .await
                        {
                            Ok(chart) => Some(chart),
                            Err(err) => {
                                warn!(
                                    target = "catalog.sync",
                                    chart_id = %chart_id,
                                    error = %err,
                                    "size chart unavailable; items continue without a guide"
                                );
                                None
                            }
                        };
                        charts.insert(chart_id.clone(), fetched);
                    }
                    charts.get(&chart_id).and_then(Option::as_ref)
                }
                None => None,
            };

            items.push(transform(&item, ctx, chart));
        }

        if !failed.is_empty() {
            warn!(
                target = "catalog.sync",
                batch_id = %ctx.batch_id,
                failed = failed.len(),
                "some listings failed to transform"
            );
        }
        Transformed {
            items,
            failed,
            charts_fetched: charts.len(),
        }
    }

    /// Bulk-loads the batch. When the call fails every item is reported as a
    /// load failure and nothing counts as loaded.
    async fn load(&self, items: Vec<CanonicalItem>) -> Loaded {
        if items.is_empty() {
            return Loaded {
                created: 0,
                updated: 0,
                failed: Vec::new(),
            };
        }
        match self.sink.bulk_upsert(&items).await {
            Ok(summary) => Loaded {
                created: summary.created_count,
                updated: summary.updated_count,
                failed: Vec::new(),
            },
            Err(err) => {
                warn!(
                    target = "catalog.sync",
                    items = items.len(),
                    error = %err,
                    "bulk load failed"
                );
                let message = err.to_string();
                Loaded {
                    created: 0,
                    updated: 0,
                    failed: items
                        .into_iter()
                        .map(|item| FailedItem {
                            external_id: item.source.external_id,
                            title: item.name,
                            stage: FailureStage::Load,
                            error_message: message.clone(),
                        })
                        .collect(),
                }
            }
        }
    }

    pub async fn item_ids(&self, owner_id: &str) -> Result<ItemIdsResponse, PipelineError> {
        let credential = self.valid_credential(owner_id).await?;
        let items = fetcher::fetch_item_ids(
            self.marketplace.as_ref(),
            credential.marketplace_user_id,
            &credential.access_token,
            self.config.plan(),
        )
        .await
        .map_err(|err| PipelineError::from_fetch("extract", err))?;
        Ok(ItemIdsResponse {
            seller_id: credential.marketplace_user_id,
            total: items.len(),
            items,
        })
    }

    pub async fn item(&self, owner_id: &str, item_id: &str) -> Result<Value, PipelineError> {
        if item_id.trim().is_empty() {
            return Err(PipelineError::bad_request("get_item", "item id is required"));
        }
        let credential = self
            .credentials
            .ensure_valid(owner_id)
            .await
            .map_err(|err| PipelineError::from_credentials("credentials", err))?;
        self.marketplace
            .get_item(item_id, &credential.access_token)
            .await
            .map_err(|err| PipelineError::from_meli("get_item", err))
    }

    pub async fn delete_batch(&self, batch_id: &str) -> Result<(), PipelineError> {
        let batch_id = batch_id.trim();
        if batch_id.is_empty() {
            return Err(PipelineError::bad_request("delete_batch", "batch id is required"));
        }
        self.sink
            .delete_batch(batch_id)
            .await
            .map_err(|err| PipelineError::from_host("delete_batch", err))?;
        info!(target = "catalog.sync", batch_id, "batch deleted");
        Ok(())
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}

fn transform_failure(external_id: String, title: String, err: &TransformError) -> FailedItem {
    FailedItem {
        external_id,
        title,
        stage: FailureStage::Transform,
        error_message: err.to_string(),
    }
}
