//! 广播中心核心领域模型
//!
//! 包含对外消息载荷、连接句柄抽象，以及相关的错误类型。

pub mod connection;
pub mod errors;
pub mod message;

// 重新导出常用类型
pub use connection::*;
pub use errors::*;
pub use message::*;
