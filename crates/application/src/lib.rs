//! 应用层实现。
//!
//! 这里提供广播中心：进程级的连接注册表和消息扇出。
//! 上游接入层在连接建立/断开时调用注册和移除，消息发布流程
//! 在落库后调用广播。

pub mod hub;

pub use hub::{BroadcastHub, HubStats};
