//! 稳定的 DTO 与线协议契约。
//!
//! - [`agent`]：设备端（agent）文本消息与下行命令
//! - [`admin`]：运维端（admin）文本消息与回执
//! - [`frame`]：设备上行二进制帧的 16 字节帧头
//! - 本模块：REST 接口的响应封装与请求/响应体

pub mod admin;
pub mod agent;
pub mod frame;

use serde::{Deserialize, Serialize};

pub use admin::{AckStatus, AdminReply, AdminRequest};
pub use agent::{AgentCommand, AgentMessage, HeartbeatMetrics, HeartbeatPayload, HeartbeatTelemetry};
pub use frame::{FRAME_HEADER_LEN, FrameError, FrameHeader, MJPEG_MAGIC};

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 启动录制请求体（REST）。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRecordingRequest {
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub recording_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// 启动录制响应体（REST）。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRecordingResponse {
    pub recording_id: String,
    pub location_id: String,
    pub duration_minutes: u32,
}

/// 运行指标快照。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
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
