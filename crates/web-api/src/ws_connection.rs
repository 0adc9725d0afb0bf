use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ClientConnection, ConnectionId, SendError};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::state::AppState;

/// WebSocket 写操作命令
///
/// 所有对 WebSocket sender 的写操作统一走命令队列
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Vec<u8>),
}

/// 注册到广播中心的连接句柄。
///
/// 只暴露发送能力和可写状态；真正的 socket 写入由本连接的
/// 发送任务完成，队列顺序保证同一连接上广播顺序不变。
struct WsClientConnection {
    id: ConnectionId,
    open: Arc<AtomicBool>,
    commands: mpsc::Sender<WsCommand>,
}

#[async_trait]
impl ClientConnection for WsClientConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send_text(&self, frame: &str) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        // 入队不阻塞，队列满视为该连接的一次瞬时投递失败
        self.commands
            .try_send(WsCommand::SendText(frame.to_owned()))
            .map_err(|err| match err {
                TrySendError::Full(_) => SendError::Backpressure,
                TrySendError::Closed(_) => SendError::Closed,
            })
    }
}

/// WebSocket 连接管理器
///
/// 封装单个 WebSocket 连接的生命周期：
/// - 升级成功后注册到广播中心
/// - 消息发送和心跳
/// - 断开时从广播中心移除
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState) -> Self {
        Self { socket, state }
    }

    /// 运行 WebSocket 连接的主循环
    pub async fn run(self) {
        let Self { socket, state } = self;
        let (mut sender, mut incoming) = socket.split();

        let capacity = state.config.hub.outbound_queue_capacity;
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(capacity);
        let open = Arc::new(AtomicBool::new(true));

        let connection_id = ConnectionId::generate();
        let connection = Arc::new(WsClientConnection {
            id: connection_id,
            open: open.clone(),
            commands: cmd_tx.clone(),
        });
        state.hub.register(connection).await;
        tracing::info!(connection_id = %connection_id, "WebSocket 连接已建立");

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let send_open = open.clone();
        let send_task = tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    WsCommand::SendText(text) => {
                        if sender.send(WsMessage::Text(text.into())).await.is_err() {
                            tracing::warn!("failed to send text frame");
                            break;
                        }
                    }
                    WsCommand::SendPong(data) => {
                        if sender.send(WsMessage::Pong(data.into())).await.is_err() {
                            tracing::warn!("failed to send pong frame");
                            break;
                        }
                    }
                }
            }
            // 写端失效后连接不再可写，后续广播直接跳过
            send_open.store(false, Ordering::SeqCst);
        });

        // 接收任务：处理来自客户端的消息
        let recv_task = tokio::spawn(async move {
            while let Some(Ok(message)) = incoming.next().await {
                if Self::handle_incoming(message, &cmd_tx).await.is_err() {
                    break;
                }
            }
        });

        // 等待任意一个任务完成（连接断开）
        tokio::select! {
            _ = send_task => {}
            _ = recv_task => {}
        }

        open.store(false, Ordering::SeqCst);
        state.hub.remove(connection_id).await;
        tracing::info!(connection_id = %connection_id, "WebSocket 连接已断开");
    }

    /// 处理来自客户端的消息
    ///
    /// 关闭消息结束连接，Ping 回 Pong，其余暂不处理。
    async fn handle_incoming(
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ()> {
        match message {
            WsMessage::Close(_) => {
                tracing::debug!("WebSocket 收到关闭消息");
                return Err(());
            }
            WsMessage::Ping(data) => {
                if cmd_tx
                    .send(WsCommand::SendPong(data.to_vec()))
                    .await
                    .is_err()
                {
                    return Err(());
                }
            }
            WsMessage::Pong(_) => {
                tracing::debug!("收到 pong 消息");
            }
            WsMessage::Text(_) | WsMessage::Binary(_) => {
                // 客户端入站消息走 REST 发布流程，这里不处理
                tracing::debug!("收到客户端消息");
            }
        }
        Ok(())
    }
}
