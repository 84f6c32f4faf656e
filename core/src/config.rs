use std::env;

use tracing::{info, warn};

pub const DEFAULT_BASE_URL: &str = "https://v2.api.noroff.dev";

pub const BASE_URL_VAR: &str = "SOCIAL_API_BASE_URL";
pub const API_KEY_VAR: &str = "SOCIAL_API_KEY";

/// Where the backend lives and the key sent with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_env() -> Self {
        let base_url = env::var(BASE_URL_VAR).unwrap_or_else(|_| {
            info!("{BASE_URL_VAR} not set, using default: {DEFAULT_BASE_URL}");
            DEFAULT_BASE_URL.to_string()
        });
        let api_key = env::var(API_KEY_VAR).unwrap_or_else(|_| {
            warn!("{API_KEY_VAR} not set, requests will be sent with an empty api key");
            String::new()
        });
        Self { base_url, api_key }
    }
}
