//! 追踪、请求 ID 与进程级计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub agents_connected: u64,
    pub agents_replaced: u64,
    pub agents_disconnected: u64,
    pub agents_terminated: u64,
    pub upgrades_rejected: u64,
    pub frames_received: u64,
    pub frames_delivered: u64,
    pub frames_dropped: u64,
    pub frame_deliveries_skipped: u64,
    pub commands_sent: u64,
    pub commands_undelivered: u64,
    pub events_lagged: u64,
    pub job_update_failures: u64,
    pub messages_ignored: u64,
}

/// 连接层计数器。
pub struct TelemetryMetrics {
    agents_connected: AtomicU64,
    agents_replaced: AtomicU64,
    agents_disconnected: AtomicU64,
    agents_terminated: AtomicU64,
    upgrades_rejected: AtomicU64,
    frames_received: AtomicU64,
    frames_delivered: AtomicU64,
    frames_dropped: AtomicU64,
    frame_deliveries_skipped: AtomicU64,
    commands_sent: AtomicU64,
    commands_undelivered: AtomicU64,
    events_lagged: AtomicU64,
    job_update_failures: AtomicU64,
    messages_ignored: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            agents_connected: AtomicU64::new(0),
            agents_replaced: AtomicU64::new(0),
            agents_disconnected: AtomicU64::new(0),
            agents_terminated: AtomicU64::new(0),
            upgrades_rejected: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_delivered: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            frame_deliveries_skipped: AtomicU64::new(0),
            commands_sent: AtomicU64::new(0),
            commands_undelivered: AtomicU64::new(0),
            events_lagged: AtomicU64::new(0),
            job_update_failures: AtomicU64::new(0),
            messages_ignored: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            agents_connected: self.agents_connected.load(Ordering::Relaxed),
            agents_replaced: self.agents_replaced.load(Ordering::Relaxed),
            agents_disconnected: self.agents_disconnected.load(Ordering::Relaxed),
            agents_terminated: self.agents_terminated.load(Ordering::Relaxed),
            upgrades_rejected: self.upgrades_rejected.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frame_deliveries_skipped: self.frame_deliveries_skipped.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            commands_undelivered: self.commands_undelivered.load(Ordering::Relaxed),
            events_lagged: self.events_lagged.load(Ordering::Relaxed),
            job_update_failures: self.job_update_failures.load(Ordering::Relaxed),
            messages_ignored: self.messages_ignored.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 设备首次上线（非替换）。
pub fn record_agent_connected() {
    metrics().agents_connected.fetch_add(1, Ordering::Relaxed);
}

/// 设备新连接替换旧连接。
pub fn record_agent_replaced() {
    metrics().agents_replaced.fetch_add(1, Ordering::Relaxed);
}

pub fn record_agent_disconnected() {
    metrics().agents_disconnected.fetch_add(1, Ordering::Relaxed);
}

/// 心跳扫描判定失活并强制断开。
pub fn record_agent_terminated() {
    metrics().agents_terminated.fetch_add(1, Ordering::Relaxed);
}

/// 升级请求被拒绝（401/403/404/500）。
pub fn record_upgrade_rejected() {
    metrics().upgrades_rejected.fetch_add(1, Ordering::Relaxed);
}

pub fn record_frame_received() {
    metrics().frames_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录单帧成功投递的观看者数量。
pub fn record_frames_delivered(count: u64) {
    metrics().frames_delivered.fetch_add(count, Ordering::Relaxed);
}

/// 无观看者，帧被丢弃。
pub fn record_frame_dropped() {
    metrics().frames_dropped.fetch_add(1, Ordering::Relaxed);
}

/// 观看者不可写，跳过一次投递。
pub fn record_frame_delivery_skipped() {
    metrics()
        .frame_deliveries_skipped
        .fetch_add(1, Ordering::Relaxed);
}

pub fn record_command_sent() {
    metrics().commands_sent.fetch_add(1, Ordering::Relaxed);
}

/// 设备离线或队列已满，命令未投递。
pub fn record_command_undelivered() {
    metrics().commands_undelivered.fetch_add(1, Ordering::Relaxed);
}

/// 事件订阅者落后，跳过的事件数。
pub fn record_events_lagged(skipped: u64) {
    metrics().events_lagged.fetch_add(skipped, Ordering::Relaxed);
}

pub fn record_job_update_failure() {
    metrics().job_update_failures.fetch_add(1, Ordering::Relaxed);
}

/// 无法解析或未知类型的文本消息。
pub fn record_message_ignored() {
    metrics().messages_ignored.fetch_add(1, Ordering::Relaxed);
}
