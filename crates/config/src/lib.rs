//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 服务监听地址
//! - 广播中心的发送超时和出站队列容量

use serde::{Deserialize, Serialize};
use std::env;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务配置
    pub server: ServerConfig,
    /// 广播中心配置
    pub hub: HubConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 广播中心配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// 单连接发送超时（毫秒），一个卡住的客户端最多拖慢广播这么久
    pub send_timeout_ms: u64,
    /// 每条连接的出站队列容量
    pub outbound_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: 5_000,
            outbound_queue_capacity: 32,
        }
    }
}

impl AppConfig {
    /// 从环境变量加载配置，缺省值适用于开发环境
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8080),
            },
            hub: HubConfig {
                send_timeout_ms: env::var("HUB_SEND_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5_000),
                outbound_queue_capacity: env::var("HUB_QUEUE_CAPACITY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(32),
            },
        }
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.is_empty() {
            return Err(ConfigError::InvalidServerConfig(
                "Server host cannot be empty".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "Server port must be greater than 0".to_string(),
            ));
        }

        if self.hub.send_timeout_ms == 0 {
            return Err(ConfigError::InvalidHubConfig(
                "Send timeout must be greater than 0".to_string(),
            ));
        }

        if self.hub.outbound_queue_capacity == 0 {
            return Err(ConfigError::InvalidHubConfig(
                "Outbound queue capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
    #[error("Invalid hub configuration: {0}")]
    InvalidHubConfig(String),
    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] std::env::VarError),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            hub: HubConfig::default(),
        }
    }
}
