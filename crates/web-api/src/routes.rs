use axum::{
    extract::{rejection::JsonRejection, State, WebSocketUpgrade},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

use application::HubStats;
use domain::OutboundMessage;

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/messages", post(publish_message))
        .route("/stats", get(hub_stats))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// 消息发布入口。
///
/// 载荷在到达这里之前已经整形完毕（敏感字段已剥离），
/// 这里原样交给广播中心。单个客户端投递失败不影响响应。
async fn publish_message(
    State(state): State<AppState>,
    payload: Result<Json<OutboundMessage>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(message) = payload?;
    state.hub.broadcast(&message).await;
    Ok(StatusCode::ACCEPTED)
}

async fn hub_stats(State(state): State<AppState>) -> Json<HubStats> {
    Json(state.hub.stats().await)
}

async fn websocket_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| WebSocketConnection::new(socket, state).run())
}
