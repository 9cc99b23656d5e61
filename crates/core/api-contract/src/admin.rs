//! 运维端文本消息。

use domain::AgentRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 运维端上行请求。未知 `type` 解析为 [`AdminRequest::Other`]。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum AdminRequest {
    #[serde(rename = "preview-start")]
    PreviewStart {
        location_id: String,
        #[serde(default)]
        fps: Option<u32>,
        #[serde(default)]
        quality: Option<u32>,
    },
    #[serde(rename = "preview-stop")]
    PreviewStop { location_id: String },
    #[serde(rename = "start_recording")]
    StartRecording {
        location_id: String,
        #[serde(default)]
        duration_sec: Option<f64>,
        #[serde(default)]
        recording_id: Option<String>,
        #[serde(default)]
        metadata: Option<Value>,
    },
    #[serde(rename = "stop_recording")]
    StopRecording { location_id: String },
    #[serde(other)]
    Other,
}

impl AdminRequest {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Ok,
    Error,
}

/// 仅发给单个运维连接的消息（快照与回执）。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AdminReply {
    Snapshot {
        agents: Vec<AgentRecord>,
    },
    StartRecordingAck {
        status: AckStatus,
        location_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        recording_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        duration_minutes: u32,
    },
    StopRecordingAck {
        status: AckStatus,
        location_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}
