//! Application state for the sync service.

use std::sync::Arc;

use common::config::AppConfig;

use crate::service::SyncService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: Arc<SyncService>,
}

impl AppState {
    pub fn new(config: AppConfig, service: SyncService) -> Self {
        Self {
            config: Arc::new(config),
            service: Arc::new(service),
        }
    }
}
