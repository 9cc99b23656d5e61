//! 设备网关：升级鉴权、连接绑定、上行消息处理与心跳扫描。

use crate::connection::{CLOSE_POLICY_VIOLATION, ConnectionHandle, Inbound, SessionHandler};
use crate::error::GatewayError;
use crate::hub::AdminHub;
use crate::registry::AgentRegistry;
use crate::relay::PreviewRelay;
use api_contract::frame::has_header;
use api_contract::{AgentMessage, HeartbeatPayload};
use async_trait::async_trait;
use bytes::Bytes;
use cyclops_auth::verify_device_secret;
use cyclops_storage::{LocationDirectory, RecordingJobStatus, RecordingJobStore};
use cyclops_telemetry::{
    record_agent_connected, record_agent_disconnected, record_agent_replaced,
    record_agent_terminated, record_frame_received, record_job_update_failure,
    record_message_ignored,
};
use domain::{AgentActivity, AgentPatch, PeerMetadata, TelemetrySnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// 鉴权通过的设备身份。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCredentials {
    pub location_id: String,
    pub tenant_id: String,
    pub api_key: String,
}

#[derive(Clone)]
pub struct AgentGateway {
    registry: Arc<AgentRegistry>,
    relay: Arc<PreviewRelay>,
    directory: Arc<dyn LocationDirectory>,
    jobs: Arc<dyn RecordingJobStore>,
    verify_secret: bool,
}

impl AgentGateway {
    pub fn new(
        registry: Arc<AgentRegistry>,
        relay: Arc<PreviewRelay>,
        directory: Arc<dyn LocationDirectory>,
        jobs: Arc<dyn RecordingJobStore>,
    ) -> Self {
        Self {
            registry,
            relay,
            directory,
            jobs,
            verify_secret: true,
        }
    }

    /// 是否比较设备密钥（关闭时只要求 location 存在）。
    pub fn with_secret_check(mut self, enabled: bool) -> Self {
        self.verify_secret = enabled;
        self
    }

    /// 升级前鉴权：缺字段 401，未知 location 404，密钥不符 403，目录故障 500。
    pub async fn authorize(
        &self,
        location_id: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<AgentCredentials, GatewayError> {
        let location_id = location_id.map(str::trim).filter(|value| !value.is_empty());
        let api_key = api_key.map(str::trim).filter(|value| !value.is_empty());
        let (Some(location_id), Some(api_key)) = (location_id, api_key) else {
            return Err(GatewayError::MissingCredentials);
        };

        let location = self
            .directory
            .find_location(location_id)
            .await
            .map_err(|err| {
                warn!(target: "cyclops.realtime", location_id, error = %err, "location_lookup_failed");
                GatewayError::Directory(err.to_string())
            })?
            .ok_or(GatewayError::UnknownLocation)?;
        if self.verify_secret && !verify_device_secret(&location.api_key, api_key) {
            return Err(GatewayError::Forbidden);
        }

        Ok(AgentCredentials {
            location_id: location.location_id,
            tenant_id: location.tenant_id,
            api_key: api_key.to_string(),
        })
    }

    /// 绑定已升级的连接；若替换了旧连接则以 1008 关闭旧连接。
    pub fn attach(
        &self,
        credentials: AgentCredentials,
        handle: ConnectionHandle,
        peer: PeerMetadata,
    ) -> AgentSession {
        let location_id = credentials.location_id;
        let previous = self.relay.bind_agent(&location_id, handle.clone(), peer);
        match previous {
            Some(previous) if previous.id() != handle.id() => {
                previous.close(CLOSE_POLICY_VIOLATION, "Replaced by new connection");
                record_agent_replaced();
                info!(
                    target: "cyclops.realtime",
                    location_id = %location_id,
                    connection_id = %handle.id(),
                    replaced = %previous.id(),
                    "agent_replaced"
                );
            }
            _ => {
                record_agent_connected();
                info!(
                    target: "cyclops.realtime",
                    location_id = %location_id,
                    connection_id = %handle.id(),
                    peer = handle.peer(),
                    "agent_connected"
                );
            }
        }

        AgentSession {
            gateway: self.clone(),
            location_id,
            tenant_id: credentials.tenant_id,
            handle,
        }
    }

    fn spawn_job_update(&self, recording_id: String, status: RecordingJobStatus) {
        let jobs = self.jobs.clone();
        tokio::spawn(async move {
            match jobs.update_job_status(&recording_id, status).await {
                Ok(true) => {
                    info!(target: "cyclops.realtime", recording_id = %recording_id, status = %status, "job_status_updated");
                }
                Ok(false) => {
                    debug!(target: "cyclops.realtime", recording_id = %recording_id, status = %status, "job_status_unchanged");
                }
                Err(err) => {
                    record_job_update_failure();
                    warn!(
                        target: "cyclops.realtime",
                        recording_id = %recording_id,
                        status = %status,
                        error = %err,
                        "job_status_update_failed"
                    );
                }
            }
        });
    }
}

/// 单条设备连接的会话。
pub struct AgentSession {
    gateway: AgentGateway,
    location_id: String,
    tenant_id: String,
    handle: ConnectionHandle,
}

impl AgentSession {
    pub fn location_id(&self) -> &str {
        &self.location_id
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// 处理文本消息；无法解析或未知类型的消息被忽略。
    pub fn handle_text(&self, text: &str) {
        // 已被替换或终止的连接不再写入注册表
        if self.handle.is_closed() {
            return;
        }
        let message = match AgentMessage::parse(text) {
            Ok(message) => message,
            Err(err) => {
                record_message_ignored();
                debug!(target: "cyclops.realtime", location_id = %self.location_id, error = %err, "agent_message_ignored");
                return;
            }
        };
        let registry = &self.gateway.registry;
        match message {
            AgentMessage::Hello { agent_id, version } => {
                info!(
                    target: "cyclops.realtime",
                    location_id = %self.location_id,
                    agent_id = agent_id.as_deref().unwrap_or(""),
                    version = version.as_deref().unwrap_or(""),
                    "agent_hello"
                );
                if agent_id.is_some() {
                    registry.upsert(
                        &self.location_id,
                        AgentPatch {
                            agent_id,
                            ..AgentPatch::default()
                        },
                    );
                }
            }
            AgentMessage::Heartbeat(payload) => {
                let patch = heartbeat_patch(&payload);
                if !patch.is_empty() {
                    registry.upsert(&self.location_id, patch);
                }
                registry.heartbeat(&self.location_id);
            }
            AgentMessage::RecordingDone {
                recording_id,
                reason,
            } => {
                info!(
                    target: "cyclops.realtime",
                    location_id = %self.location_id,
                    recording_id = recording_id.as_deref().unwrap_or(""),
                    reason = reason.as_deref().unwrap_or(""),
                    "recording_done"
                );
                self.finish_recording(recording_id, RecordingJobStatus::Completed);
            }
            AgentMessage::RecordingError { recording_id, line } => {
                warn!(
                    target: "cyclops.realtime",
                    location_id = %self.location_id,
                    recording_id = recording_id.as_deref().unwrap_or(""),
                    line = line.as_deref().unwrap_or(""),
                    "recording_error"
                );
                self.finish_recording(recording_id, RecordingJobStatus::Failed);
            }
            AgentMessage::Other => record_message_ignored(),
        }
    }

    fn finish_recording(&self, recording_id: Option<String>, status: RecordingJobStatus) {
        let Some(recording_id) = recording_id.filter(|id| !id.is_empty()) else {
            return;
        };
        self.gateway.registry.upsert(
            &self.location_id,
            AgentPatch {
                activity: Some(AgentActivity::Idle),
                active_job_id: Some(None),
                ..AgentPatch::default()
            },
        );
        self.gateway.spawn_job_update(recording_id, status);
    }

    /// 转发二进制帧，返回投递的观看者数。
    pub fn handle_frame(&self, frame: Bytes) -> usize {
        if self.handle.is_closed() {
            return 0;
        }
        record_frame_received();
        if !has_header(&frame) {
            debug!(target: "cyclops.realtime", location_id = %self.location_id, len = frame.len(), "frame_too_short");
            return 0;
        }
        self.gateway.relay.forward_frame(&self.location_id, frame)
    }

    /// 连接结束；只有仍是当前连接时才会标记断开。
    pub fn finish(&self, reason: &str) -> bool {
        let released = self.gateway.registry.release(
            &self.location_id,
            self.handle.id(),
            Some(reason),
        );
        if released {
            record_agent_disconnected();
            info!(
                target: "cyclops.realtime",
                location_id = %self.location_id,
                tenant_id = %self.tenant_id,
                connection_id = %self.handle.id(),
                reason,
                "agent_disconnected"
            );
        }
        released
    }
}

#[async_trait]
impl SessionHandler for AgentSession {
    async fn on_message(&self, message: Inbound) {
        match message {
            Inbound::Text(text) => self.handle_text(&text),
            Inbound::Binary(frame) => {
                self.handle_frame(frame);
            }
            Inbound::Pong => self.handle.mark_alive(),
        }
    }
}

/// 从心跳中提取活动状态、摄像头与主机遥测。
pub fn heartbeat_patch(payload: &HeartbeatPayload) -> AgentPatch {
    let mut patch = AgentPatch::default();
    if let Some(metrics) = &payload.metrics {
        if metrics.recording {
            patch.activity = Some(AgentActivity::Recording);
            patch.active_job_id = Some(metrics.recording_id.clone());
        } else {
            patch.activity = Some(AgentActivity::Idle);
            patch.active_job_id = Some(None);
        }
        patch.preview_active = Some(metrics.preview);
    }
    if let Some(telemetry) = &payload.telemetry {
        patch.camera = telemetry.camera.clone();
        patch.telemetry = Some(TelemetrySnapshot {
            cpu: telemetry.cpu.clone(),
            memory: telemetry.memory.clone(),
            disk: telemetry.disk.clone(),
            uptime_sec: telemetry
                .uptime_sec
                .or_else(|| payload.metrics.as_ref().and_then(|metrics| metrics.uptime_sec)),
            timestamp: telemetry.timestamp.clone().or_else(|| payload.ts.clone()),
        });
    }
    patch
}

/// 心跳扫描结果。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub pinged: usize,
    pub terminated: usize,
}

/// 周期性 ping 所有在线设备与运维连接；上一轮之后没有回 pong 的连接被终止。
///
/// 被终止的运维连接由其 socket 协程退出后调用 [`crate::AdminSession::finish`] 退出预览集合。
pub struct LivenessMonitor {
    registry: Arc<AgentRegistry>,
    operators: Option<AdminHub>,
    interval: Duration,
}

impl LivenessMonitor {
    pub fn new(registry: Arc<AgentRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            operators: None,
            interval,
        }
    }

    /// 同时扫描运维连接。
    pub fn with_operators(mut self, hub: AdminHub) -> Self {
        self.operators = Some(hub);
        self
    }

    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for (location_id, connection) in self.registry.live_connections() {
            if connection.take_alive() {
                connection.ping();
                report.pinged += 1;
                continue;
            }
            connection.terminate();
            record_agent_terminated();
            warn!(
                target: "cyclops.realtime",
                location_id = %location_id,
                connection_id = %connection.id(),
                "agent_liveness_timeout"
            );
            if self
                .registry
                .release(&location_id, connection.id(), Some("liveness timeout"))
            {
                record_agent_disconnected();
            }
            report.terminated += 1;
        }

        let operators = self
            .operators
            .as_ref()
            .map(AdminHub::live_connections)
            .unwrap_or_default();
        for connection in operators {
            if connection.take_alive() {
                connection.ping();
                report.pinged += 1;
                continue;
            }
            if connection.terminate() {
                warn!(
                    target: "cyclops.realtime",
                    connection_id = %connection.id(),
                    peer = connection.peer(),
                    "admin_liveness_timeout"
                );
                report.terminated += 1;
            }
        }
        report
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval 的第一次 tick 立即返回
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = self.sweep();
                if report.terminated > 0 || report.pinged > 0 {
                    debug!(
                        target: "cyclops.realtime",
                        pinged = report.pinged,
                        terminated = report.terminated,
                        "liveness_sweep"
                    );
                }
            }
        })
    }
}
