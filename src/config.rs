use rocket::figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dashboard::RESPONSE_CACHE_CAPACITY;

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_IDENTITY_BASE_URL: &str = "http://localhost:4433";

/// Upstream service locations and cache sizing, read from `Rocket.toml` or
/// `ROCKET_*` variables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub identity_base_url: String,
    /// Raw-response panels kept in memory before the oldest is evicted
    pub response_cache_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            identity_base_url: DEFAULT_IDENTITY_BASE_URL.to_string(),
            response_cache_size: RESPONSE_CACHE_CAPACITY,
        }
    }
}

impl AppConfig {
    pub fn from_figment(figment: &Figment) -> Self {
        let config = figment.extract::<AppConfig>().unwrap_or_else(|e| {
            warn!(error = %e, "Invalid app configuration, using defaults");
            AppConfig::default()
        });
        info!(
            api_base_url = %config.api_base_url,
            identity_base_url = %config.identity_base_url,
            response_cache_size = config.response_cache_size,
            "Loaded app configuration"
        );
        config
    }
}
