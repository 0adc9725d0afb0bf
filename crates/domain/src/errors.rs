//! 领域错误类型

use thiserror::Error;

/// 单个连接上的发送失败。
///
/// 这些错误不会离开广播中心，调用方永远不会因为某个客户端
/// 掉线而收到错误。
#[derive(Debug, Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,

    #[error("outbound queue full")]
    Backpressure,

    #[error("transport error: {0}")]
    Transport(String),
}

impl SendError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}
