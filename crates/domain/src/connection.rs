//! 连接句柄抽象
//!
//! 广播中心只持有连接的发送能力和可写状态，连接的生命周期
//! （升级、关闭检测）由上游接入层负责。

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::SendError;

/// 连接唯一标识。
///
/// 只用于注册表的成员判定，同一个用户开多个标签页会得到多个标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ConnectionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<ConnectionId> for Uuid {
    fn from(value: ConnectionId) -> Self {
        value.0
    }
}

/// 一条活跃客户端连接的发送能力。
///
/// 任何传输（真实 WebSocket、测试用的内存实现）都可以实现该接口。
/// `is_open` 为 false 时广播会直接跳过该连接，不报错。
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ClientConnection: Send + Sync {
    /// 注册表成员判定用的标识。
    fn id(&self) -> ConnectionId;

    /// 连接当前是否可写。连接中和关闭中一律视为不可写。
    fn is_open(&self) -> bool;

    /// 发送一个文本帧。失败只影响本连接。
    async fn send_text(&self, frame: &str) -> Result<(), SendError>;
}
