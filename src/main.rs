mod catalog;
mod credentials;
mod host;
mod http;
mod meli;
mod metrics;
mod models;
mod pipeline;
mod security;
mod supabase;

use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use credentials::{CredentialManager, CredentialStore, CredentialView, MemoryCredentialStore};
use eyre::WrapErr;
use host::{HostClient, HostConfig, ShopDirectory};
use meli::{MeliAuthClient, MeliClient, MeliConfig};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, AuthorizationCodeRequest, AuthorizationUrlResponse, ItemIdsResponse};
use pipeline::{PipelineError, PipelineErrorKind, SyncConfig, SyncPipeline, SyncRun};
use security::{AuthState, OwnerContext, require_owner};
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc};
use supabase::SupabaseCredentialStore;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    if let Err(err) = run().await {
        error!(target = "catalog.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    init_tracing();

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .wrap_err("installing prometheus recorder")?;

    let store: Arc<dyn CredentialStore> = match SupabaseCredentialStore::from_env() {
        Some(store) => {
            info!(target = "catalog.api", "credentials stored in supabase");
            Arc::new(store)
        }
        None => {
            warn!(
                target = "catalog.api",
                "SUPABASE_URL not set; credentials are kept in memory"
            );
            Arc::new(MemoryCredentialStore::default())
        }
    };

    let meli_config = MeliConfig::from_env();
    if !meli_config.has_app_credentials() {
        warn!(
            target = "catalog.api",
            "MELI_CLIENT_ID/MELI_CLIENT_SECRET missing; token exchange will fail"
        );
    }
    let oauth = MeliAuthClient::new(meli_config.clone());
    let host = Arc::new(HostClient::new(HostConfig::from_env()));
    let credentials = CredentialManager::new(store, Arc::new(oauth.clone()));
    let pipeline = SyncPipeline::new(
        credentials.clone(),
        Arc::new(MeliClient::new(&meli_config)),
        host.clone(),
        host.clone(),
        SyncConfig::from_env(),
    );

    let state = AppState {
        pipeline,
        credentials,
        oauth,
        shops: host,
        prometheus_handle,
    };
    let app = build_router(state, AuthState::from_env());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "catalog.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("binding {addr}"))?;
    axum::serve(listener, app.into_make_service())
        .await
        .wrap_err("serving http")?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: SyncPipeline,
    credentials: CredentialManager,
    oauth: MeliAuthClient,
    shops: Arc<dyn ShopDirectory>,
    prometheus_handle: PrometheusHandle,
}

fn build_router(state: AppState, auth_state: AuthState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let protected = Router::new()
        .route(
            "/marketplace/oauth",
            get(authorization_url).post(connect_marketplace),
        )
        .route(
            "/marketplace/credentials",
            get(get_credentials).delete(disconnect_marketplace),
        )
        .route("/marketplace/items", get(list_item_ids))
        .route("/marketplace/items/{item_id}", get(get_item))
        .route("/sync/marketplace", post(sync_marketplace))
        .route("/sync/batches/{batch_id}", delete(delete_batch))
        .route_layer(middleware::from_fn_with_state(auth_state, require_owner));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()))
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
/// - Auth: none
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "catalog-sync-rs",
    }))
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(256 * 1024)
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    (
        [("Content-Type", "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

/// Marketplace consent URL for the authenticated owner.
///
/// - Method: `GET`
/// - Path: `/marketplace/oauth`
async fn authorization_url(
    State(state): State<AppState>,
) -> Result<Json<AuthorizationUrlResponse>, AppError> {
    crate::metrics::inc_requests("/marketplace/oauth");
    let url = state
        .oauth
        .authorization_url()
        .map_err(|err| PipelineError::from_meli("authorization_url", err))?;
    Ok(Json(AuthorizationUrlResponse { url }))
}

/// Exchanges the authorization code returned by the marketplace and stores
/// the credential against the owner's shop.
///
/// - Method: `POST`
/// - Path: `/marketplace/oauth`
/// - Body: `{ "code": "..." }`
/// - Response: `204 No Content`
async fn connect_marketplace(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
    Json(payload): Json<AuthorizationCodeRequest>,
) -> Result<StatusCode, AppError> {
    crate::metrics::inc_requests("/marketplace/oauth");
    let code = payload.code.trim();
    if code.is_empty() {
        return Err(PipelineError::bad_request("connect", "authorization code is required").into());
    }
    let shop = state
        .shops
        .shop_for_owner(&owner)
        .await
        .map_err(|err| PipelineError::from_host("resolve_shop", err))?;
    state
        .credentials
        .connect(&owner.owner_id, &shop.id, code)
        .await
        .map_err(|err| PipelineError::from_credentials("connect", err))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Current credential of the owner, refreshed first when close to expiry.
/// Tokens come back blanked.
async fn get_credentials(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
) -> Result<Json<CredentialView>, AppError> {
    crate::metrics::inc_requests("/marketplace/credentials");
    let credential = state
        .credentials
        .ensure_valid(&owner.owner_id)
        .await
        .map_err(|err| PipelineError::from_credentials("credentials", err))?;
    Ok(Json(credential.view()))
}

async fn disconnect_marketplace(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
) -> Result<StatusCode, AppError> {
    crate::metrics::inc_requests("/marketplace/credentials");
    state
        .credentials
        .disconnect(&owner.owner_id)
        .await
        .map_err(|err| PipelineError::from_credentials("disconnect", err))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_item_ids(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
) -> Result<Json<ItemIdsResponse>, AppError> {
    crate::metrics::inc_requests("/marketplace/items");
    Ok(Json(state.pipeline.item_ids(&owner.owner_id).await?))
}

async fn get_item(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
    Path(item_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    crate::metrics::inc_requests("/marketplace/items/{item_id}");
    Ok(Json(state.pipeline.item(&owner.owner_id, &item_id).await?))
}

/// Runs a full catalog synchronization for the authenticated owner.
///
/// - Method: `POST`
/// - Path: `/sync/marketplace`
/// - Response: `SyncRun` (counts, failed items, per-stage transcript). When
///   every item failed the same body is returned under `result` with a 500.
async fn sync_marketplace(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
) -> Result<Json<SyncRun>, AppError> {
    crate::metrics::inc_requests("/sync/marketplace");
    info!(
        target = "catalog.api",
        owner_id = %owner.owner_id,
        "catalog sync invoked",
    );
    let run = state.pipeline.run(&owner).await?;
    Ok(Json(run))
}

async fn delete_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> Result<StatusCode, AppError> {
    crate::metrics::inc_requests("/sync/batches/{batch_id}");
    state.pipeline.delete_batch(&batch_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        AppError::Pipeline(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Pipeline(err) => {
                let status = match err.kind() {
                    PipelineErrorKind::BadRequest => StatusCode::BAD_REQUEST,
                    PipelineErrorKind::NotFound => StatusCode::NOT_FOUND,
                    PipelineErrorKind::BadGateway => StatusCode::BAD_GATEWAY,
                    PipelineErrorKind::Internal | PipelineErrorKind::EtlFailed => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                if status.is_server_error() {
                    error!(target = "catalog.api", stage = err.stage(), "{err}");
                }
                let payload = ApiError {
                    error: err.kind().code().to_string(),
                    stage: Some(err.stage().to_string()),
                    detail: Some(err.detail().to_string()),
                    result: err
                        .partial()
                        .and_then(|run| serde_json::to_value(run).ok()),
                };
                (status, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::tests::{FakeRefresher, credential};
    use crate::meli::fetcher::tests::FakeCatalog;
    use crate::pipeline::tests::{FakeShops, FakeSink, listing};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn app(
        catalog: FakeCatalog,
        sink: FakeSink,
        stored: Option<credentials::Credential>,
    ) -> Router {
        let store = Arc::new(MemoryCredentialStore::default());
        if let Some(stored) = stored {
            store.insert(&stored).await.unwrap();
        }
        let credentials = CredentialManager::new(store, Arc::new(FakeRefresher::new()));
        let shops: Arc<dyn ShopDirectory> = Arc::new(FakeShops);
        let pipeline = SyncPipeline::new(
            credentials.clone(),
            Arc::new(catalog),
            Arc::new(sink),
            shops.clone(),
            SyncConfig::default(),
        );
        let state = AppState {
            pipeline,
            credentials,
            oauth: MeliAuthClient::new(MeliConfig {
                api_root: "http://127.0.0.1:9".into(),
                auth_url: "https://auth.example/authorization".into(),
                client_id: "app".into(),
                client_secret: "secret".into(),
                redirect_uri: "https://shop.example/callback".into(),
            }),
            shops,
            prometheus_handle: PrometheusBuilder::new().build_recorder().handle(),
        };
        build_router(state, AuthState::from_pairs("seller:tok-seller,nobody:tok-nobody"))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn authed(method: &str, uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let app = app(FakeCatalog::with_total(0), FakeSink::default(), None).await;
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn protected_routes_reject_unknown_tokens() {
        let app = app(FakeCatalog::with_total(0), FakeSink::default(), None).await;
        let response = app
            .clone()
            .oneshot(Request::post("/sync/marketplace").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"], "unauthorized");

        let response = app
            .oneshot(authed("POST", "/sync/marketplace", "forged"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn sync_returns_counts_and_stages() {
        let app = app(
            FakeCatalog::with_items((1..=5).map(listing).collect()),
            FakeSink::default(),
            Some(credential("seller", 60, 21_600)),
        )
        .await;
        let response = app
            .oneshot(authed("POST", "/sync/marketplace", "tok-seller"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total_items"], 5);
        assert_eq!(body["created_count"], 5);
        assert_eq!(body["failure_count"], 0);
        assert_eq!(body["stages"].as_array().map(Vec::len), Some(5));
    }

    #[tokio::test]
    async fn total_failure_carries_the_partial_result() {
        let sink = FakeSink {
            fail: true,
            ..FakeSink::default()
        };
        let app = app(
            FakeCatalog::with_items((1..=2).map(listing).collect()),
            sink,
            Some(credential("seller", 60, 21_600)),
        )
        .await;
        let response = app
            .oneshot(authed("POST", "/sync/marketplace", "tok-seller"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "etl_failed");
        assert_eq!(body["result"]["failure_count"], 2);
        assert_eq!(body["result"]["failed_items"][0]["stage"], "load");
    }

    #[tokio::test]
    async fn missing_credential_maps_to_not_found() {
        let app = app(FakeCatalog::with_total(1), FakeSink::default(), None).await;
        let response = app
            .oneshot(authed("GET", "/marketplace/credentials", "tok-nobody"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["stage"], "credentials");
    }

    #[tokio::test]
    async fn credential_view_omits_tokens() {
        let app = app(
            FakeCatalog::with_total(1),
            FakeSink::default(),
            Some(credential("seller", 60, 21_600)),
        )
        .await;
        let response = app
            .oneshot(authed("GET", "/marketplace/credentials", "tok-seller"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["marketplace_user_id"], 777);
        assert_eq!(body["access_token"], "");
        assert_eq!(body["refresh_token"], "");
    }

    #[tokio::test]
    async fn connect_stores_credential_for_owner_shop() {
        let app = app(FakeCatalog::with_total(0), FakeSink::default(), None).await;
        let request = Request::post("/marketplace/oauth")
            .header("Authorization", "Bearer tok-seller")
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"code":"TG-123"}"#))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(authed("GET", "/marketplace/credentials", "tok-seller"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["shop_id"], "shop-seller");
    }

    #[tokio::test]
    async fn connect_rejects_shop_owned_by_someone_else() {
        let mut stored = credential("other", 60, 21_600);
        stored.shop_id = "shop-seller".into();
        let app = app(FakeCatalog::with_total(0), FakeSink::default(), Some(stored)).await;
        let request = Request::post("/marketplace/oauth")
            .header("Authorization", "Bearer tok-seller")
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"code":"TG-123"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["stage"], "connect");
    }

    #[tokio::test]
    async fn authorization_url_points_at_consent_page() {
        let app = app(FakeCatalog::with_total(0), FakeSink::default(), None).await;
        let response = app
            .oneshot(authed("GET", "/marketplace/oauth", "tok-seller"))
            .await
            .unwrap();
        let body = body_json(response).await;
        let url = body["url"].as_str().unwrap();
        assert!(url.starts_with("https://auth.example/authorization?response_type=code"));
        assert!(url.contains("client_id=app"));
    }

    #[tokio::test]
    async fn unknown_item_is_bad_gateway() {
        let app = app(
            FakeCatalog::with_total(1),
            FakeSink::default(),
            Some(credential("seller", 60, 21_600)),
        )
        .await;
        let response = app
            .oneshot(authed("GET", "/marketplace/items/MLA404", "tok-seller"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
