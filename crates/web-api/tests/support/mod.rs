use std::sync::Arc;

use application::BroadcastHub;
use axum::Router;
use config::AppConfig;
use web_api::{router as build_router_fn, AppState};

pub fn build_router() -> Router {
    let config = AppConfig::default();
    let hub = Arc::new(BroadcastHub::new(&config.hub));
    let state = AppState::new(hub, config);
    build_router_fn(state)
}
