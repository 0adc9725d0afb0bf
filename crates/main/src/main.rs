//! 主应用程序入口
//!
//! 启动 Axum Web API 服务和进程级广播中心。

use std::sync::Arc;

use application::BroadcastHub;
use config::AppConfig;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 读取环境变量配置
    let config = AppConfig::from_env();
    config.validate()?;

    // 广播中心：进程启动时构造一次，以引用传给接入层和发布流程
    let hub = Arc::new(BroadcastHub::new(&config.hub));
    let state = AppState::new(hub, config.clone());

    // 启动 Web 服务器
    let app = router(state);
    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;

    tracing::info!(
        "广播中心服务启动在 http://{}:{}",
        config.server.host,
        config.server.port
    );
    axum::serve(listener, app).await?;

    Ok(())
}
