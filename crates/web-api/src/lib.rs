//! Web API 层。
//!
//! 提供 Axum 路由，把 HTTP / WebSocket 请求委托给广播中心：
//! 接入层负责连接升级和断开检测，消息发布接口把整形好的载荷
//! 交给广播中心扇出。

mod error;
mod routes;
mod state;
mod ws_connection;

pub use routes::router;
pub use state::AppState;
