//! 连接句柄。
//!
//! 每条 WebSocket 连接在服务端表现为一个 [`ConnectionHandle`]（可克隆，按 id 判等）
//! 和一个 [`OutboundReceiver`]（由 socket 写协程独占）。所有发送都是向有界队列
//! `try_send`：队列满即视为“不可写”，调用方跳过而不是等待，因此持锁发送不会阻塞在
//! socket I/O 上。
//!
//! 关闭有两种方式：
//! - [`ConnectionHandle::close`]：把关闭帧排入队列，写协程发出后结束；只有第一次调用生效。
//! - [`ConnectionHandle::terminate`]：不发关闭帧，直接通过 watch 信号让 socket 协程退出。

use api_contract::AgentCommand;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};
use tracing::warn;

/// 正常关闭。
pub const CLOSE_NORMAL: u16 = 1000;
/// 策略关闭（被新连接替换）。
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// 进程内唯一的连接标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// 发往对端的消息。
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Binary(Bytes),
    Ping,
    Close { code: u16, reason: String },
}

/// 来自对端的消息（Ping 由 WebSocket 层自动应答，不上送）。
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Text(String),
    Binary(Bytes),
    Pong,
}

/// 会话消息处理（设备端与运维端各自实现）。
#[async_trait]
pub trait SessionHandler: Send + Sync {
    async fn on_message(&self, message: Inbound);
}

struct Inner {
    id: ConnectionId,
    peer: String,
    tx: mpsc::Sender<Outbound>,
    alive: AtomicBool,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Inner>,
}

impl ConnectionHandle {
    /// 创建句柄与对应的发送队列接收端。
    pub fn channel(peer: impl Into<String>, capacity: usize) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = Self {
            inner: Arc::new(Inner {
                id: ConnectionId::next(),
                peer: peer.into(),
                tx,
                alive: AtomicBool::new(true),
                closed: AtomicBool::new(false),
                shutdown,
            }),
        };
        (
            handle,
            OutboundReceiver {
                rx,
                shutdown: shutdown_rx,
            },
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// 未关闭且队列仍有空位。
    pub fn is_writable(&self) -> bool {
        !self.is_closed() && !self.inner.tx.is_closed() && self.inner.tx.capacity() > 0
    }

    pub fn send_text(&self, text: String) -> bool {
        self.enqueue(Outbound::Text(text))
    }

    pub fn send_json<T: Serialize>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(text) => self.send_text(text),
            Err(err) => {
                warn!(target: "cyclops.realtime", connection_id = %self.id(), error = %err, "encode_failed");
                false
            }
        }
    }

    pub fn send_command(&self, command: &AgentCommand) -> bool {
        match command.to_message() {
            Ok(text) => self.send_text(text),
            Err(err) => {
                warn!(target: "cyclops.realtime", connection_id = %self.id(), error = %err, "encode_failed");
                false
            }
        }
    }

    /// 转发二进制帧；`Bytes` 克隆只增加引用计数。
    pub fn send_binary(&self, frame: Bytes) -> bool {
        self.enqueue(Outbound::Binary(frame))
    }

    /// 等待队列空位后发送；用于不允许丢失的事件流。
    pub async fn send_text_wait(&self, text: String) -> bool {
        if self.is_closed() {
            return false;
        }
        self.inner.tx.send(Outbound::Text(text)).await.is_ok()
    }

    pub fn ping(&self) -> bool {
        self.enqueue(Outbound::Ping)
    }

    /// 发送关闭帧。返回 true 表示本次调用触发了关闭。
    pub fn close(&self, code: u16, reason: &str) -> bool {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let frame = Outbound::Close {
            code,
            reason: reason.to_string(),
        };
        if self.inner.tx.try_send(frame).is_err() {
            // 队列已满或写端已退出，直接终止
            self.inner.shutdown.send_replace(true);
        }
        true
    }

    /// 不经握手直接终止连接。
    pub fn terminate(&self) -> bool {
        let first = !self.inner.closed.swap(true, Ordering::AcqRel);
        self.inner.shutdown.send_replace(true);
        first
    }

    pub fn mark_alive(&self) {
        self.inner.alive.store(true, Ordering::Release);
    }

    /// 读取并清除存活标记。
    pub fn take_alive(&self) -> bool {
        self.inner.alive.swap(false, Ordering::AcqRel)
    }

    fn enqueue(&self, message: Outbound) -> bool {
        if self.is_closed() {
            return false;
        }
        self.inner.tx.try_send(message).is_ok()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ConnectionHandle {}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("peer", &self.inner.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// 发送队列接收端，由 socket 写协程持有。
pub struct OutboundReceiver {
    rx: mpsc::Receiver<Outbound>,
    shutdown: watch::Receiver<bool>,
}

impl OutboundReceiver {
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.rx.try_recv().ok()
    }

    /// 取出当前已排队的全部消息。
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut items = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            items.push(item);
        }
        items
    }

    pub fn is_terminated(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn into_parts(self) -> (mpsc::Receiver<Outbound>, ShutdownSignal) {
        (self.rx, ShutdownSignal(self.shutdown))
    }
}

/// terminate 信号。
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    /// 等待终止；句柄全部释放时同样返回。
    pub async fn wait(&mut self) {
        let _ = self.0.wait_for(|terminated| *terminated).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_is_idempotent() {
        let (handle, mut rx) = ConnectionHandle::channel("peer", 4);
        assert!(handle.close(CLOSE_POLICY_VIOLATION, "Replaced by new connection"));
        assert!(!handle.close(CLOSE_NORMAL, "again"));
        assert!(!handle.send_text("late".to_string()));

        assert_eq!(
            rx.drain(),
            vec![Outbound::Close {
                code: CLOSE_POLICY_VIOLATION,
                reason: "Replaced by new connection".to_string(),
            }]
        );
        assert!(!rx.is_terminated());
    }

    #[test]
    fn full_queue_is_not_writable() {
        let (handle, mut rx) = ConnectionHandle::channel("peer", 1);
        assert!(handle.is_writable());
        assert!(handle.send_binary(Bytes::from_static(b"a")));
        assert!(!handle.is_writable());
        assert!(!handle.send_binary(Bytes::from_static(b"b")));

        assert_eq!(rx.try_recv(), Some(Outbound::Binary(Bytes::from_static(b"a"))));
        assert!(handle.is_writable());
    }

    #[test]
    fn close_on_full_queue_terminates() {
        let (handle, rx) = ConnectionHandle::channel("peer", 1);
        assert!(handle.send_text("x".to_string()));
        assert!(handle.close(CLOSE_NORMAL, "bye"));
        assert!(rx.is_terminated());
    }

    #[test]
    fn alive_flag_is_taken() {
        let (handle, _rx) = ConnectionHandle::channel("peer", 1);
        assert!(handle.take_alive());
        assert!(!handle.take_alive());
        handle.mark_alive();
        assert!(handle.take_alive());
    }

    #[tokio::test]
    async fn terminate_wakes_shutdown_signal() {
        let (handle, rx) = ConnectionHandle::channel("peer", 1);
        let (_rx, mut signal) = rx.into_parts();
        assert!(handle.terminate());
        assert!(!handle.terminate());
        signal.wait().await;
    }
}
