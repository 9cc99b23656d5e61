//! 实时连接层。
//!
//! - [`registry`]：location → 设备记录与当前连接，变更时发布 [`events`]。
//! - [`gateway`]：设备端升级鉴权、消息处理、心跳扫描。
//! - [`hub`]：运维端快照 + 事件流、预览订阅、录制请求。
//! - [`relay`]：预览观看者集合与帧扇出。
//!
//! 本 crate 不依赖具体 WebSocket 实现，socket 读写由上层通过 [`connection`] 的队列对接。

pub mod connection;
pub mod error;
pub mod events;
pub mod gateway;
pub mod hub;
pub mod recording;
pub mod registry;
pub mod relay;

pub use connection::{
    CLOSE_NORMAL, CLOSE_POLICY_VIOLATION, ConnectionHandle, ConnectionId, Inbound, Outbound,
    OutboundReceiver, SessionHandler, ShutdownSignal,
};
pub use error::{GatewayError, RecordingError};
pub use events::{AgentEvent, EventBus, EventSubscription};
pub use gateway::{AgentCredentials, AgentGateway, AgentSession, LivenessMonitor, SweepReport};
pub use hub::{AdminHub, AdminSession, forward_events};
pub use recording::{RecordingRequest, RecordingService, RecordingStarted};
pub use registry::AgentRegistry;
pub use relay::{PreviewDefaults, PreviewOptions, PreviewRelay};

pub(crate) fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}
