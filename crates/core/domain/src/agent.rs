//! 设备（agent）记录。
//!
//! 每个场地（location）对应一条 `AgentRecord`，以 `location_id` 为键。
//! 记录只会从 CONNECTED 迁移到 DISCONNECTED，不会被删除；断开后保留历史字段，
//! 便于运维端继续展示最后一次遥测。

use serde::{Deserialize, Serialize};

/// 连接状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Connected,
    Disconnected,
}

/// 设备当前活动（由心跳推导）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentActivity {
    #[default]
    Idle,
    Recording,
}

/// 连接建立时采集的对端信息。
///
/// `api_key` 仅用于服务端内部，永不序列化给运维端。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerMetadata {
    #[serde(default)]
    pub remote_address: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
}

/// 摄像头可达性。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reachable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_percent: Option<f64>,
}

/// 内存/磁盘用量（字节）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_percent: Option<f64>,
}

/// 最近一次心跳携带的主机遥测，整体覆盖（last-write-wins）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<UsageStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<UsageStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// 单个场地的设备记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub location_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_ms: Option<i64>,
    #[serde(flatten)]
    pub peer: PeerMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<TelemetrySnapshot>,
    #[serde(default)]
    pub activity: AgentActivity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_job_id: Option<String>,
    #[serde(default)]
    pub preview_active: bool,
}

impl AgentRecord {
    /// 尚未连接过的占位记录。
    pub fn stub(location_id: impl Into<String>) -> Self {
        Self {
            location_id: location_id.into(),
            agent_id: None,
            status: AgentStatus::Disconnected,
            connected_at_ms: None,
            last_seen_ms: None,
            peer: PeerMetadata::default(),
            camera: None,
            telemetry: None,
            activity: AgentActivity::Idle,
            active_job_id: None,
            preview_active: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == AgentStatus::Connected
    }

    pub fn is_recording(&self) -> bool {
        self.activity == AgentActivity::Recording
    }
}

/// 部分字段更新。`None` 表示保持原值。
///
/// `active_job_id` 为双层 Option：外层 `None` 不修改，`Some(None)` 清空。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentPatch {
    pub agent_id: Option<String>,
    pub camera: Option<CameraInfo>,
    pub telemetry: Option<TelemetrySnapshot>,
    pub activity: Option<AgentActivity>,
    pub active_job_id: Option<Option<String>>,
    pub preview_active: Option<bool>,
}

impl AgentPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// 合并到记录上。身份与连接字段不受影响。
    pub fn apply(self, record: &mut AgentRecord) {
        if let Some(agent_id) = self.agent_id {
            record.agent_id = Some(agent_id);
        }
        if let Some(camera) = self.camera {
            record.camera = Some(camera);
        }
        if let Some(telemetry) = self.telemetry {
            record.telemetry = Some(telemetry);
        }
        if let Some(activity) = self.activity {
            record.activity = activity;
        }
        if let Some(active_job_id) = self.active_job_id {
            record.active_job_id = active_job_id;
        }
        if let Some(preview_active) = self.preview_active {
            record.preview_active = preview_active;
        }
    }
}
