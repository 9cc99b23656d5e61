//! 录制控制。

use crate::error::RecordingError;
use crate::now_epoch_ms;
use crate::registry::AgentRegistry;
use api_contract::AgentCommand;
use cyclops_storage::{RecordingJobRecord, RecordingJobStatus, RecordingJobStore};
use cyclops_telemetry::{record_command_sent, record_command_undelivered, record_job_update_failure};
use domain::{AgentActivity, AgentPatch};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// 启动录制请求。
#[derive(Debug, Clone, Default)]
pub struct RecordingRequest {
    pub location_id: String,
    pub duration_minutes: Option<u32>,
    pub recording_id: Option<String>,
    pub tenant_id: Option<String>,
    pub requested_by: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingStarted {
    pub recording_id: String,
    pub location_id: String,
    pub duration_minutes: u32,
}

#[derive(Clone)]
pub struct RecordingService {
    registry: Arc<AgentRegistry>,
    jobs: Arc<dyn RecordingJobStore>,
    default_duration_minutes: u32,
}

impl RecordingService {
    pub fn new(
        registry: Arc<AgentRegistry>,
        jobs: Arc<dyn RecordingJobStore>,
        default_duration_minutes: u32,
    ) -> Self {
        Self {
            registry,
            jobs,
            default_duration_minutes: default_duration_minutes.max(1),
        }
    }

    pub fn default_duration_minutes(&self) -> u32 {
        self.default_duration_minutes
    }

    /// 秒数换算为分钟（向下取整，至少 1 分钟）；缺省时使用默认时长。
    pub fn minutes_from_seconds(&self, duration_sec: Option<f64>) -> u32 {
        match duration_sec {
            Some(seconds) if seconds.is_finite() && seconds > 0.0 => {
                ((seconds / 60.0).floor() as u32).max(1)
            }
            _ => self.default_duration_minutes,
        }
    }

    /// 启动录制：占用设备 → 写任务 → 下发命令。
    ///
    /// 写任务失败只记录日志；命令无法投递时撤销占用并把任务置为 FAILED。
    pub async fn start(&self, request: RecordingRequest) -> Result<RecordingStarted, RecordingError> {
        let location_id = request.location_id;
        let duration_minutes = request
            .duration_minutes
            .unwrap_or(self.default_duration_minutes)
            .max(1);
        let started_at_ms = now_epoch_ms();
        let recording_id = request
            .recording_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("rec_{location_id}_{started_at_ms}"));

        let connection = self.registry.begin_recording(&location_id, &recording_id)?;

        let job = RecordingJobRecord {
            recording_id: recording_id.clone(),
            tenant_id: request.tenant_id.unwrap_or_default(),
            location_id: location_id.clone(),
            requested_by: request.requested_by,
            duration_minutes,
            status: RecordingJobStatus::Recording,
            metadata: request.metadata.as_ref().map(Value::to_string),
            started_at_ms,
        };
        if let Err(err) = self.jobs.create_job(job).await {
            record_job_update_failure();
            warn!(
                target: "cyclops.realtime",
                location_id = %location_id,
                recording_id = %recording_id,
                error = %err,
                "job_create_failed"
            );
        }

        let command = AgentCommand::StartRecording {
            recording_id: recording_id.clone(),
            location_id: location_id.clone(),
            duration_minutes,
            metadata: request.metadata,
        };
        if !connection.send_command(&command) {
            record_command_undelivered();
            self.registry.upsert(
                &location_id,
                AgentPatch {
                    activity: Some(AgentActivity::Idle),
                    active_job_id: Some(None),
                    ..AgentPatch::default()
                },
            );
            if let Err(err) = self
                .jobs
                .update_job_status(&recording_id, RecordingJobStatus::Failed)
                .await
            {
                record_job_update_failure();
                warn!(target: "cyclops.realtime", recording_id = %recording_id, error = %err, "job_status_update_failed");
            }
            return Err(RecordingError::Undelivered);
        }
        record_command_sent();
        info!(
            target: "cyclops.realtime",
            location_id = %location_id,
            recording_id = %recording_id,
            duration_minutes,
            "recording_requested"
        );

        Ok(RecordingStarted {
            recording_id,
            location_id,
            duration_minutes,
        })
    }

    pub fn stop(&self, location_id: &str) -> Result<(), RecordingError> {
        if !self.registry.is_connected(location_id) {
            return Err(RecordingError::AgentOffline);
        }
        if !self
            .registry
            .send_command(location_id, &AgentCommand::StopRecording)
        {
            return Err(RecordingError::Undelivered);
        }
        info!(target: "cyclops.realtime", location_id, "recording_stop_requested");
        Ok(())
    }
}
