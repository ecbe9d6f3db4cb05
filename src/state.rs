use std::sync::Arc;

use crate::api::{HttpReportApi, ReportApi};
use crate::auth::{AuthGateway, SelfServiceGateway};
use crate::config::AppConfig;
use crate::dashboard::ResponseCache;

/// Shared handles managed by Rocket
pub struct Services {
    pub api: Arc<dyn ReportApi>,
    pub auth: Arc<dyn AuthGateway>,
    pub responses: ResponseCache,
}

impl Services {
    pub fn new(api: Arc<dyn ReportApi>, auth: Arc<dyn AuthGateway>) -> Self {
        Self {
            api,
            auth,
            responses: ResponseCache::default(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            responses: ResponseCache::new(config.response_cache_size),
            ..Self::new(
                Arc::new(HttpReportApi::new(&config.api_base_url)),
                Arc::new(SelfServiceGateway::new(&config.identity_base_url)),
            )
        }
    }
}
