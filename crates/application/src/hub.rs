//! 广播中心
//!
//! 维护当前所有活跃连接的注册表，并把每条已整形的消息扇出到
//! 所有可写的连接。成员集合是唯一的共享可变状态，由读写锁保护；
//! 广播先在锁内拍快照，发送在锁外进行，慢客户端不会阻塞注册和移除。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use config::HubConfig;
use domain::{ClientConnection, ConnectionId, OutboundMessage};
use futures_util::future;
use serde::Serialize;
use tokio::sync::RwLock;

/// 注册表里的一条连接记录。
struct RegisteredConnection {
    handle: Arc<dyn ClientConnection>,
    registered_at: DateTime<Utc>,
}

/// 广播中心的投递统计。
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    /// 当前注册的连接数
    pub active_connections: usize,
    /// 峰值连接数
    pub peak_connections: usize,
    /// 累计注册过的连接数
    pub total_registered: u64,
    /// 广播调用次数
    pub broadcasts: u64,
    /// 成功投递的帧数
    pub frames_delivered: u64,
    /// 因连接不可写而跳过的帧数
    pub frames_skipped: u64,
    /// 发送失败或超时的帧数
    pub frames_failed: u64,
}

impl Default for HubStats {
    fn default() -> Self {
        Self {
            active_connections: 0,
            peak_connections: 0,
            total_registered: 0,
            broadcasts: 0,
            frames_delivered: 0,
            frames_skipped: 0,
            frames_failed: 0,
        }
    }
}

/// 进程级广播中心。
///
/// 启动时构造一次，以引用传给接入层和消息发布流程；
/// 每个测试各自构造实例即可隔离。
pub struct BroadcastHub {
    send_timeout: Duration,
    connections: RwLock<HashMap<ConnectionId, RegisteredConnection>>,
    stats: RwLock<HubStats>,
}

impl BroadcastHub {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            send_timeout: Duration::from_millis(config.send_timeout_ms),
            connections: RwLock::new(HashMap::new()),
            stats: RwLock::new(HubStats::default()),
        }
    }

    /// 注册一条连接。
    ///
    /// 之后开始的广播都能看到它。重复注册同一个标识等价于集合插入，
    /// 静默接受，不算错误。
    pub async fn register(&self, connection: Arc<dyn ClientConnection>) {
        let connection_id = connection.id();
        let (newly_added, active) = {
            let mut connections = self.connections.write().await;
            let newly_added = connections
                .insert(
                    connection_id,
                    RegisteredConnection {
                        handle: connection,
                        registered_at: Utc::now(),
                    },
                )
                .is_none();
            (newly_added, connections.len())
        };

        self.update_stats(|stats| {
            if newly_added {
                stats.total_registered += 1;
            }
            stats.active_connections = active;
            stats.peak_connections = stats.peak_connections.max(active);
        })
        .await;

        tracing::info!(connection_id = %connection_id, active, "connection registered");
    }

    /// 移除一条连接。幂等：移除不存在的连接是空操作。
    ///
    /// 正在迭代快照的广播可能仍会对它尝试一次发送，该发送会
    /// 无害地失败或被跳过。
    pub async fn remove(&self, connection_id: ConnectionId) {
        let (removed, active) = {
            let mut connections = self.connections.write().await;
            let removed = connections.remove(&connection_id);
            (removed, connections.len())
        };

        match removed {
            Some(entry) => {
                self.update_stats(|stats| stats.active_connections = active)
                    .await;
                let session_secs = (Utc::now() - entry.registered_at).num_seconds();
                tracing::info!(
                    connection_id = %connection_id,
                    active,
                    session_secs,
                    "connection removed"
                );
            }
            None => {
                tracing::debug!(connection_id = %connection_id, "remove for unknown connection ignored");
            }
        }
    }

    /// 把一条消息编码一次，投递给当前注册的所有可写连接。
    ///
    /// 投递是尽力而为：单个连接发送失败、超时或不可写都不影响
    /// 其他连接，也不向调用方抛错。
    pub async fn broadcast(&self, message: &OutboundMessage) {
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(error = %err, "failed to encode outbound message");
                return;
            }
        };

        // 锁内快照，锁外发送
        let targets: Vec<Arc<dyn ClientConnection>> = {
            let connections = self.connections.read().await;
            connections
                .values()
                .map(|entry| entry.handle.clone())
                .collect()
        };

        let mut writable = Vec::with_capacity(targets.len());
        let mut skipped = 0usize;
        for handle in targets {
            if handle.is_open() {
                writable.push(handle);
            } else {
                skipped += 1;
            }
        }

        let results = future::join_all(
            writable
                .iter()
                .map(|handle| self.send_frame(handle.as_ref(), &frame)),
        )
        .await;

        let delivered = results.iter().filter(|delivered| **delivered).count();
        let failed = results.len() - delivered;

        self.update_stats(|stats| {
            stats.broadcasts += 1;
            stats.frames_delivered += delivered as u64;
            stats.frames_skipped += skipped as u64;
            stats.frames_failed += failed as u64;
        })
        .await;

        tracing::debug!(delivered, skipped, failed, "broadcast complete");
    }

    /// 当前注册的连接数。
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// 投递统计快照。
    pub async fn stats(&self) -> HubStats {
        self.stats.read().await.clone()
    }

    /// 单连接发送，带超时上限。返回是否投递成功。
    async fn send_frame(&self, handle: &dyn ClientConnection, frame: &str) -> bool {
        match tokio::time::timeout(self.send_timeout, handle.send_text(frame)).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                tracing::warn!(connection_id = %handle.id(), error = %err, "failed to deliver frame");
                false
            }
            Err(_) => {
                tracing::warn!(
                    connection_id = %handle.id(),
                    timeout_ms = self.send_timeout.as_millis() as u64,
                    "frame delivery timed out"
                );
                false
            }
        }
    }

    async fn update_stats(&self, f: impl FnOnce(&mut HubStats)) {
        let mut stats = self.stats.write().await;
        f(&mut stats);
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(&HubConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use domain::{ChatRef, MockClientConnection, SendError, SenderRef};

    struct FakeConnection {
        id: ConnectionId,
        open: AtomicBool,
        fail_sends: bool,
        frames: Mutex<Vec<String>>,
    }

    impl FakeConnection {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: ConnectionId::generate(),
                open: AtomicBool::new(true),
                fail_sends: false,
                frames: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                id: ConnectionId::generate(),
                open: AtomicBool::new(true),
                fail_sends: true,
                frames: Mutex::new(Vec::new()),
            })
        }

        fn frames(&self) -> Vec<String> {
            self.frames.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ClientConnection for FakeConnection {
        fn id(&self) -> ConnectionId {
            self.id
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        async fn send_text(&self, frame: &str) -> Result<(), SendError> {
            if self.fail_sends {
                return Err(SendError::transport("simulated transport failure"));
            }
            self.frames.lock().unwrap().push(frame.to_string());
            Ok(())
        }
    }

    /// 发送时长时间挂起的连接，用来验证超时和快照策略。
    struct StalledConnection {
        id: ConnectionId,
    }

    #[async_trait]
    impl ClientConnection for StalledConnection {
        fn id(&self) -> ConnectionId {
            self.id
        }

        fn is_open(&self) -> bool {
            true
        }

        async fn send_text(&self, _frame: &str) -> Result<(), SendError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn payload(id: i64, content: &str) -> OutboundMessage {
        OutboundMessage {
            id,
            content: content.to_string(),
            deleted: false,
            sender: SenderRef {
                username: "A".to_string(),
            },
            chat: ChatRef {
                id: 1,
                kind: "public".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_registered_connection() {
        let hub = BroadcastHub::default();
        let c1 = FakeConnection::new();
        let c2 = FakeConnection::new();
        let c3 = FakeConnection::new();

        hub.register(c1.clone()).await;
        hub.register(c2.clone()).await;
        hub.register(c3.clone()).await;

        hub.broadcast(&payload(1, "hi")).await;

        let expected = r#"{"id":1,"content":"hi","deleted":false,"sender":{"username":"A"},"chat":{"id":1,"type":"public"}}"#;
        for connection in [&c1, &c2, &c3] {
            assert_eq!(connection.frames(), vec![expected.to_string()]);
        }
    }

    #[tokio::test]
    async fn removed_connection_receives_nothing_afterwards() {
        let hub = BroadcastHub::default();
        let c1 = FakeConnection::new();
        let c2 = FakeConnection::new();
        let c3 = FakeConnection::new();

        hub.register(c1.clone()).await;
        hub.register(c2.clone()).await;
        hub.register(c3.clone()).await;

        hub.broadcast(&payload(1, "first")).await;
        hub.remove(c2.id()).await;
        hub.broadcast(&payload(2, "second")).await;

        assert_eq!(c1.frames().len(), 2);
        assert_eq!(c2.frames().len(), 1);
        assert_eq!(c3.frames().len(), 2);
    }

    #[tokio::test]
    async fn failing_connection_does_not_affect_the_rest() {
        let hub = BroadcastHub::default();
        let broken = FakeConnection::failing();
        let healthy = FakeConnection::new();

        hub.register(broken.clone()).await;
        hub.register(healthy.clone()).await;

        hub.broadcast(&payload(1, "hi")).await;

        assert_eq!(healthy.frames().len(), 1);
        assert!(broken.frames().is_empty());

        let stats = hub.stats().await;
        assert_eq!(stats.frames_delivered, 1);
        assert_eq!(stats.frames_failed, 1);
    }

    #[tokio::test]
    async fn duplicate_registration_delivers_once() {
        let hub = BroadcastHub::default();
        let connection = FakeConnection::new();

        hub.register(connection.clone()).await;
        hub.register(connection.clone()).await;
        assert_eq!(hub.connection_count().await, 1);

        hub.broadcast(&payload(1, "hi")).await;
        assert_eq!(connection.frames().len(), 1);
    }

    #[tokio::test]
    async fn sequential_broadcasts_arrive_in_order() {
        let hub = BroadcastHub::default();
        let connection = FakeConnection::new();
        hub.register(connection.clone()).await;

        hub.broadcast(&payload(1, "first")).await;
        hub.broadcast(&payload(2, "second")).await;

        let frames = connection.frames();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].contains(r#""content":"first""#));
        assert!(frames[1].contains(r#""content":"second""#));
    }

    #[tokio::test]
    async fn closed_connection_is_skipped_without_sending() {
        let hub = BroadcastHub::default();

        let mut closed = MockClientConnection::new();
        let closed_id = ConnectionId::generate();
        closed.expect_id().return_const(closed_id);
        closed.expect_is_open().return_const(false);
        closed.expect_send_text().never();

        let healthy = FakeConnection::new();
        hub.register(Arc::new(closed)).await;
        hub.register(healthy.clone()).await;

        hub.broadcast(&payload(1, "hi")).await;

        assert_eq!(healthy.frames().len(), 1);
        let stats = hub.stats().await;
        assert_eq!(stats.frames_skipped, 1);
        assert_eq!(stats.frames_delivered, 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let hub = BroadcastHub::default();
        let connection = FakeConnection::new();
        let unknown = ConnectionId::generate();

        hub.register(connection.clone()).await;
        hub.remove(connection.id()).await;
        hub.remove(connection.id()).await;
        hub.remove(unknown).await;

        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn stalled_peer_is_bounded_by_send_timeout() {
        let hub = BroadcastHub::new(&HubConfig {
            send_timeout_ms: 50,
            ..HubConfig::default()
        });
        let stalled = Arc::new(StalledConnection {
            id: ConnectionId::generate(),
        });
        let healthy = FakeConnection::new();

        hub.register(stalled).await;
        hub.register(healthy.clone()).await;

        let started = std::time::Instant::now();
        hub.broadcast(&payload(1, "hi")).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(healthy.frames().len(), 1);
        assert_eq!(hub.stats().await.frames_failed, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn registration_is_not_blocked_by_inflight_broadcast() {
        let hub = Arc::new(BroadcastHub::new(&HubConfig {
            send_timeout_ms: 1_000,
            ..HubConfig::default()
        }));
        let stalled = Arc::new(StalledConnection {
            id: ConnectionId::generate(),
        });
        hub.register(stalled).await;

        let broadcasting = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.broadcast(&payload(1, "hi")).await })
        };

        // 等广播进入发送阶段
        tokio::time::sleep(Duration::from_millis(20)).await;

        let late = FakeConnection::new();
        tokio::time::timeout(Duration::from_millis(100), hub.register(late.clone()))
            .await
            .expect("register must not wait for the stalled send");
        tokio::time::timeout(Duration::from_millis(100), hub.remove(late.id()))
            .await
            .expect("remove must not wait for the stalled send");

        broadcasting.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_churn_keeps_registry_consistent() {
        let hub = Arc::new(BroadcastHub::default());

        let keepers: Vec<Arc<FakeConnection>> = (0..16).map(|_| FakeConnection::new()).collect();
        let leavers: Vec<Arc<FakeConnection>> = (0..16).map(|_| FakeConnection::new()).collect();

        let mut tasks = Vec::new();
        for connection in keepers.iter().cloned() {
            let hub = hub.clone();
            tasks.push(tokio::spawn(async move {
                hub.register(connection).await;
            }));
        }
        for connection in leavers.iter().cloned() {
            let hub = hub.clone();
            tasks.push(tokio::spawn(async move {
                let id = connection.id();
                hub.register(connection).await;
                hub.remove(id).await;
            }));
        }
        for sequence in 0..8 {
            let hub = hub.clone();
            tasks.push(tokio::spawn(async move {
                hub.broadcast(&payload(sequence, "churn")).await;
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(hub.connection_count().await, keepers.len());

        hub.broadcast(&payload(100, "final")).await;
        for connection in &keepers {
            assert!(connection
                .frames()
                .iter()
                .any(|frame| frame.contains(r#""content":"final""#)));
        }
        for connection in &leavers {
            assert!(!connection
                .frames()
                .iter()
                .any(|frame| frame.contains(r#""content":"final""#)));
        }
    }
}
