use std::sync::Arc;

use application::BroadcastHub;
use config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(hub: Arc<BroadcastHub>, config: AppConfig) -> Self {
        Self { hub, config }
    }
}
