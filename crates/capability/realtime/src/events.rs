//! 设备生命周期事件总线。
//!
//! 基于 `tokio::sync::broadcast`：每个订阅者独立缓冲，落后的订阅者丢弃最旧事件
//! 后继续接收，不影响其他订阅者，也不阻塞发布方。

use domain::AgentRecord;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum AgentEvent {
    /// 首次连接，或完全断开后重新连接。
    Connected { agent: AgentRecord },
    /// 新连接替换了仍在线的旧连接。
    Replaced { location_id: String },
    Upsert { agent: AgentRecord },
    Heartbeat { location_id: String, at_ms: i64 },
    Disconnected {
        location_id: String,
        at_ms: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl AgentEvent {
    pub fn location_id(&self) -> &str {
        match self {
            Self::Connected { agent } | Self::Upsert { agent } => &agent.location_id,
            Self::Replaced { location_id }
            | Self::Heartbeat { location_id, .. }
            | Self::Disconnected { location_id, .. } => location_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Replaced { .. } => "replaced",
            Self::Upsert { .. } => "upsert",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Disconnected { .. } => "disconnected",
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Arc<AgentEvent>>,
}

impl EventBus {
    /// `capacity` 为每个订阅者的缓冲上限。
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// 发布事件；没有订阅者时直接丢弃。
    pub fn publish(&self, event: AgentEvent) {
        let _ = self.tx.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
        }
    }
}

/// 单个订阅。drop 即退订。
pub struct EventSubscription {
    rx: broadcast::Receiver<Arc<AgentEvent>>,
}

impl EventSubscription {
    /// 等待下一条事件；总线关闭时返回 None。
    pub async fn next(&mut self) -> Option<Arc<AgentEvent>> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => record_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// 非阻塞读取。
    pub fn try_next(&mut self) -> Option<Arc<AgentEvent>> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => record_lag(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

fn record_lag(skipped: u64) {
    warn!(target: "cyclops.realtime", skipped, "event_subscriber_lagged");
    cyclops_telemetry::record_events_lagged(skipped);
}
