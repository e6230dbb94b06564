use crate::credentials::TokenRefresher;
use crate::http::build_client;
use crate::meli::{MeliConfig, MeliError};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

const TOKEN_ENDPOINT: &str = "oauth_token";

/// Token pair issued by the marketplace token endpoint, for both the
/// authorization-code and refresh-token grants.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub user_id: i64,
}

#[derive(Debug, Clone)]
pub struct MeliAuthClient {
    config: MeliConfig,
    http: Client,
}

impl MeliAuthClient {
    pub fn new(config: MeliConfig) -> Self {
        Self {
            config,
            http: build_client(),
        }
    }

    /// Redirect URL the seller follows to grant access to the app.
    pub fn authorization_url(&self) -> Result<String, MeliError> {
        if self.config.client_id.trim().is_empty() {
            return Err(MeliError::MissingCredentials);
        }
        if self.config.redirect_uri.trim().is_empty() {
            return Err(MeliError::InvalidInput("redirect uri is not configured"));
        }
        let url = Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ],
        )
        .map_err(|_| MeliError::InvalidInput("authorization url is malformed"))?;
        Ok(url.into())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, MeliError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(MeliError::InvalidInput("authorization code is required"));
        }
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        self.request_token(&params).await
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, MeliError> {
        if refresh_token.trim().is_empty() {
            return Err(MeliError::InvalidInput("refresh token is required"));
        }
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.request_token(&params).await
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenGrant, MeliError> {
        if !self.config.has_app_credentials() {
            return Err(MeliError::MissingCredentials);
        }
        let response = self
            .http
            .post(self.config.token_url())
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|err| MeliError::transport(TOKEN_ENDPOINT, err))?;

        if !response.status().is_success() {
            return Err(MeliError::Upstream {
                endpoint: TOKEN_ENDPOINT,
                status: response.status().as_u16(),
            });
        }

        let grant: TokenGrant = response
            .json()
            .await
            .map_err(|err| MeliError::decode(TOKEN_ENDPOINT, err))?;
        debug!(
            target = "catalog.meli",
            expires_in = grant.expires_in,
            marketplace_user = grant.user_id,
            "token grant received"
        );
        Ok(grant)
    }
}

#[async_trait]
impl TokenRefresher for MeliAuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, MeliError> {
        self.refresh_token(refresh_token).await
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, MeliError> {
        MeliAuthClient::exchange_code(self, code).await
    }
}
