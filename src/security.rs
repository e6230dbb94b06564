use crate::models::ApiError;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{self, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, convert::Infallible, env, sync::Arc};
use tracing::{info, warn};

#[derive(Clone)]
pub struct AuthState {
    owners: Arc<HashMap<String, String>>,
}

/// The authenticated seller a request acts for. `authorization` is the
/// header as presented, forwarded to host services that authenticate the
/// owner themselves.
#[derive(Clone, Debug)]
pub struct OwnerContext {
    pub owner_id: String,
    pub authorization: String,
}

impl AuthState {
    pub fn from_env() -> Self {
        let raw = env::var("AUTH_TOKENS").unwrap_or_default();
        Self::from_pairs(&raw)
    }

    /// Parses `owner:token,owner:token`.
    pub fn from_pairs(raw: &str) -> Self {
        let mut owners = HashMap::new();
        for entry in raw.split(',') {
            let trimmed = entry.trim();
            if trimmed.is_empty() {
                continue;
            }
            match trimmed.split_once(':') {
                Some((owner, token)) if !owner.trim().is_empty() && !token.trim().is_empty() => {
                    owners.insert(token.trim().to_string(), owner.trim().to_string());
                }
                _ => warn!(
                    target = "catalog.api",
                    "ignored malformed AUTH_TOKENS entry"
                ),
            }
        }
        if owners.is_empty() {
            warn!(
                target = "catalog.api",
                "AUTH_TOKENS produced no owners; every protected route will reject"
            );
        } else {
            info!(
                target = "catalog.api",
                owner_count = owners.len(),
                "loaded owner tokens from env"
            );
        }
        Self {
            owners: Arc::new(owners),
        }
    }

    fn authenticate(&self, presented: &str, authorization: String) -> Option<OwnerContext> {
        self.owners.get(presented).map(|owner_id| OwnerContext {
            owner_id: owner_id.clone(),
            authorization,
        })
    }
}

pub async fn require_owner(
    State(state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Infallible> {
    let Some(presented) = extract_token(request.headers()) else {
        return Ok(unauthorized_response(
            "Provide a Bearer token or X-Owner-Token",
        ));
    };

    let authorization = format!("Bearer {presented}");
    let Some(context) = state.authenticate(&presented, authorization) else {
        return Ok(unauthorized_response("Token not recognized"));
    };

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

fn extract_token(headers: &http::HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(http::header::AUTHORIZATION)
        && let Ok(raw) = value.to_str()
        && raw.len() >= 7
        && raw[..6].eq_ignore_ascii_case("bearer")
    {
        return Some(raw[6..].trim().to_string()).filter(|token| !token.is_empty());
    }
    headers
        .get("X-Owner-Token")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn unauthorized_response(message: &str) -> Response {
    let payload = ApiError {
        error: "unauthorized".to_string(),
        stage: None,
        detail: Some(message.to_string()),
        result: None,
    };
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}
