//! 对外广播的消息载荷
//!
//! 载荷由上游的消息发布流程整形完毕后交给广播中心；
//! 这里只负责定义字段形状和统一的线上编码。

use serde::{Deserialize, Serialize};

/// 发送者的公开字段，完整的用户对象不允许上线。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderRef {
    pub username: String,
}

/// 会话的公开字段。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRef {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

/// 已整形的对外消息记录。
///
/// 字段顺序即线上 JSON 的键顺序，广播中心不修改任何字段。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: i64,
    pub content: String,
    pub deleted: bool,
    pub sender: SenderRef,
    pub chat: ChatRef,
}

impl OutboundMessage {
    /// 编码为发给每个客户端的文本帧。
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
