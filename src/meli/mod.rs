pub mod auth;
pub mod config;
pub mod fetcher;
pub mod items;
pub mod models;

use thiserror::Error;

pub use auth::{MeliAuthClient, TokenGrant};
pub use config::MeliConfig;
pub use items::{MarketplaceCatalog, MeliClient};

#[derive(Debug, Error)]
pub enum MeliError {
    #[error("missing marketplace app credentials in env")]
    MissingCredentials,
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("request to {endpoint} failed: {message}")]
    Transport {
        endpoint: &'static str,
        message: String,
    },
    #[error("{endpoint} responded with HTTP {status}")]
    Upstream { endpoint: &'static str, status: u16 },
    #[error("could not decode {endpoint} response: {message}")]
    Decode {
        endpoint: &'static str,
        message: String,
    },
}

impl MeliError {
    pub(crate) fn transport(endpoint: &'static str, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("timed out: {err}")
        } else {
            err.to_string()
        };
        Self::Transport { endpoint, message }
    }

    pub(crate) fn decode(endpoint: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            endpoint,
            message: err.to_string(),
        }
    }
}
