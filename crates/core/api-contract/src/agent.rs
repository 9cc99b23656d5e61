//! 设备端文本消息。
//!
//! 上行：`{"type": "hello" | "heartbeat" | "recording-done" | "recording-error", ...}`，
//! 未知 `type` 解析为 [`AgentMessage::Other`] 并被忽略。
//! 下行：`{"type": "command", "cmd": "...", ...}`。

use domain::{CameraInfo, CpuUsage, UsageStats};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 设备上行消息。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum AgentMessage {
    Hello {
        #[serde(default)]
        agent_id: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },
    Heartbeat(HeartbeatPayload),
    RecordingDone {
        #[serde(default)]
        recording_id: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
    RecordingError {
        #[serde(default)]
        recording_id: Option<String>,
        #[serde(default)]
        line: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl AgentMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// 心跳负载。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub metrics: Option<HeartbeatMetrics>,
    #[serde(default)]
    pub telemetry: Option<HeartbeatTelemetry>,
}

/// 设备进程状态。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatMetrics {
    #[serde(default)]
    pub recording: bool,
    #[serde(default)]
    pub recording_id: Option<String>,
    #[serde(default)]
    pub preview: bool,
    #[serde(default)]
    pub uptime_sec: Option<f64>,
}

/// 主机遥测。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatTelemetry {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub uptime_sec: Option<f64>,
    #[serde(default)]
    pub cpu: Option<CpuUsage>,
    #[serde(default)]
    pub memory: Option<UsageStats>,
    #[serde(default)]
    pub disk: Option<UsageStats>,
    #[serde(default)]
    pub camera: Option<CameraInfo>,
}

/// 下行命令。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cmd", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AgentCommand {
    StartPreview {
        fps: u32,
        quality: u32,
    },
    StopPreview,
    StartRecording {
        recording_id: String,
        location_id: String,
        duration_minutes: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    StopRecording,
}

impl AgentCommand {
    /// 命令名（用于日志）。
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartPreview { .. } => "startPreview",
            Self::StopPreview => "stopPreview",
            Self::StartRecording { .. } => "startRecording",
            Self::StopRecording => "stopRecording",
        }
    }

    /// 编码为带 `"type": "command"` 外层字段的文本帧。
    pub fn to_message(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert("type".to_string(), Value::String("command".to_string()));
        }
        serde_json::to_string(&value)
    }
}
