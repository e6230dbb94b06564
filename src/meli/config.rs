use once_cell::sync::Lazy;
use std::env;

pub static API_ROOT: Lazy<String> = Lazy::new(|| {
    env::var("MELI_API_ROOT")
        .map(|v| v.trim_end_matches('/').to_string())
        .unwrap_or_else(|_| "https://api.mercadolibre.com".to_string())
});

pub static AUTH_URL: Lazy<String> = Lazy::new(|| {
    env::var("MELI_AUTH_URL")
        .unwrap_or_else(|_| "https://auth.mercadolibre.com.ar/authorization".to_string())
});

pub static CLIENT_ID: Lazy<String> = Lazy::new(|| env::var("MELI_CLIENT_ID").unwrap_or_default());

pub static CLIENT_SECRET: Lazy<String> =
    Lazy::new(|| env::var("MELI_CLIENT_SECRET").unwrap_or_default());

pub static REDIRECT_URI: Lazy<String> =
    Lazy::new(|| env::var("MELI_REDIRECT_URI").unwrap_or_default());

#[derive(Debug, Clone)]
pub struct MeliConfig {
    pub api_root: String,
    pub auth_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl MeliConfig {
    pub fn from_env() -> Self {
        Self {
            api_root: API_ROOT.clone(),
            auth_url: AUTH_URL.clone(),
            client_id: CLIENT_ID.clone(),
            client_secret: CLIENT_SECRET.clone(),
            redirect_uri: REDIRECT_URI.clone(),
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.api_root)
    }

    pub fn has_app_credentials(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}
