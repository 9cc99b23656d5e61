//! 数据模型
//!
//! - 场地：LocationRecord
//! - 录制任务：RecordingJobRecord, RecordingJobStatus

use std::fmt;
use std::str::FromStr;

/// 场地记录（设备以 location_id 作为身份接入）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRecord {
    pub location_id: String,
    pub tenant_id: String,
    pub name: String,
    /// 设备共享密钥。
    pub api_key: String,
}

/// 录制任务状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingJobStatus {
    Pending,
    Recording,
    Completed,
    Failed,
    Cancelled,
}

impl RecordingJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Recording => "RECORDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// 终态不再接受状态更新。
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for RecordingJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordingJobStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "RECORDING" => Ok(Self::Recording),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("unknown recording status: {other}")),
        }
    }
}

/// 录制任务记录。
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingJobRecord {
    pub recording_id: String,
    pub tenant_id: String,
    pub location_id: String,
    pub requested_by: Option<String>,
    pub duration_minutes: u32,
    pub status: RecordingJobStatus,
    /// JSON 文本。
    pub metadata: Option<String>,
    pub started_at_ms: i64,
}
