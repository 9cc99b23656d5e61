//! 运维端 Hub。
//!
//! 连接建立后先发送完整快照，再持续推送生命周期事件；同时处理预览订阅与录制请求。

use crate::connection::{ConnectionHandle, ConnectionId, Inbound, SessionHandler};
use crate::events::EventSubscription;
use crate::recording::{RecordingRequest, RecordingService};
use crate::registry::AgentRegistry;
use crate::relay::{PreviewOptions, PreviewRelay};
use api_contract::{AckStatus, AdminReply, AdminRequest};
use async_trait::async_trait;
use cyclops_telemetry::record_message_ignored;
use domain::TenantContext;
use domain::permissions::{AGENT_PREVIEW, AGENT_RECORD};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct AdminHub {
    registry: Arc<AgentRegistry>,
    relay: Arc<PreviewRelay>,
    recordings: RecordingService,
    /// 在线的运维连接，供心跳扫描使用。
    sessions: Arc<Mutex<HashMap<ConnectionId, ConnectionHandle>>>,
}

impl AdminHub {
    pub fn new(
        registry: Arc<AgentRegistry>,
        relay: Arc<PreviewRelay>,
        recordings: RecordingService,
    ) -> Self {
        Self {
            registry,
            relay,
            recordings,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<ConnectionId, ConnectionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 当前在线的运维连接（按连接 id 排序）。
    pub fn live_connections(&self) -> Vec<ConnectionHandle> {
        let mut handles: Vec<ConnectionHandle> = self.sessions().values().cloned().collect();
        handles.sort_by_key(ConnectionHandle::id);
        handles
    }

    /// 发送快照并返回会话与事件订阅。
    ///
    /// 快照在订阅之后、任何事件之前排入队列；调用方应把订阅交给 [`forward_events`]。
    /// `operator` 为 None 表示未启用运维端鉴权。
    pub fn connect(
        &self,
        handle: ConnectionHandle,
        operator: Option<TenantContext>,
    ) -> (AdminSession, EventSubscription) {
        let (agents, events) = self.registry.snapshot_and_subscribe();
        let count = agents.len();
        handle.send_json(&AdminReply::Snapshot { agents });
        self.sessions().insert(handle.id(), handle.clone());
        info!(
            target: "cyclops.realtime",
            connection_id = %handle.id(),
            peer = handle.peer(),
            user_id = operator.as_ref().map_or("", |ctx| ctx.user_id.as_str()),
            agents = count,
            "admin_connected"
        );
        (
            AdminSession {
                hub: self.clone(),
                handle,
                operator,
            },
            events,
        )
    }
}

/// 把事件逐条推送给运维连接，直到订阅关闭或连接不可写。
///
/// 这里等待队列空位而不是丢弃：慢连接只会让自己的订阅落后（丢最旧事件），不影响其他人。
pub async fn forward_events(handle: ConnectionHandle, mut events: EventSubscription) {
    while let Some(event) = events.next().await {
        let text = match serde_json::to_string(event.as_ref()) {
            Ok(text) => text,
            Err(err) => {
                warn!(target: "cyclops.realtime", kind = event.kind(), error = %err, "event_encode_failed");
                continue;
            }
        };
        if !handle.send_text_wait(text).await {
            break;
        }
    }
    debug!(target: "cyclops.realtime", connection_id = %handle.id(), "admin_event_stream_ended");
}

/// 单条运维连接的会话。
pub struct AdminSession {
    hub: AdminHub,
    handle: ConnectionHandle,
    operator: Option<TenantContext>,
}

impl AdminSession {
    pub fn connection(&self) -> &ConnectionHandle {
        &self.handle
    }

    fn permitted(&self, permission: &str) -> bool {
        self.operator
            .as_ref()
            .is_none_or(|ctx| ctx.allows(permission))
    }

    pub async fn handle_text(&self, text: &str) {
        let request = match AdminRequest::parse(text) {
            Ok(request) => request,
            Err(err) => {
                record_message_ignored();
                debug!(target: "cyclops.realtime", connection_id = %self.handle.id(), error = %err, "admin_message_ignored");
                return;
            }
        };
        match request {
            AdminRequest::PreviewStart {
                location_id,
                fps,
                quality,
            } => {
                let Some(location_id) = non_empty(&location_id) else {
                    record_message_ignored();
                    return;
                };
                if !self.permitted(AGENT_PREVIEW) {
                    warn!(target: "cyclops.realtime", connection_id = %self.handle.id(), location_id, "preview_forbidden");
                    return;
                }
                self.hub
                    .relay
                    .subscribe(location_id, &self.handle, PreviewOptions { fps, quality });
            }
            AdminRequest::PreviewStop { location_id } => {
                if let Some(location_id) = non_empty(&location_id) {
                    self.hub.relay.unsubscribe(location_id, self.handle.id());
                }
            }
            AdminRequest::StartRecording {
                location_id,
                duration_sec,
                recording_id,
                metadata,
            } => {
                let Some(location_id) = non_empty(&location_id) else {
                    record_message_ignored();
                    return;
                };
                self.start_recording(location_id, duration_sec, recording_id, metadata)
                    .await;
            }
            AdminRequest::StopRecording { location_id } => {
                let Some(location_id) = non_empty(&location_id) else {
                    record_message_ignored();
                    return;
                };
                let result = if self.permitted(AGENT_RECORD) {
                    self.hub.recordings.stop(location_id).map_err(|err| err.to_string())
                } else {
                    Err("forbidden".to_string())
                };
                let (status, error) = match result {
                    Ok(()) => (AckStatus::Ok, None),
                    Err(error) => (AckStatus::Error, Some(error)),
                };
                self.handle.send_json(&AdminReply::StopRecordingAck {
                    status,
                    location_id: location_id.to_string(),
                    error,
                });
            }
            AdminRequest::Other => record_message_ignored(),
        }
    }

    async fn start_recording(
        &self,
        location_id: &str,
        duration_sec: Option<f64>,
        recording_id: Option<String>,
        metadata: Option<serde_json::Value>,
    ) {
        let recordings = &self.hub.recordings;
        let duration_minutes = recordings.minutes_from_seconds(duration_sec);
        let reply = if !self.permitted(AGENT_RECORD) {
            error_ack(location_id, duration_minutes, "forbidden".to_string())
        } else {
            let request = RecordingRequest {
                location_id: location_id.to_string(),
                duration_minutes: Some(duration_minutes),
                recording_id,
                tenant_id: self.operator.as_ref().map(|ctx| ctx.tenant_id.clone()),
                requested_by: self.operator.as_ref().map(|ctx| ctx.user_id.clone()),
                metadata,
            };
            match recordings.start(request).await {
                Ok(started) => AdminReply::StartRecordingAck {
                    status: AckStatus::Ok,
                    location_id: started.location_id,
                    recording_id: Some(started.recording_id),
                    error: None,
                    duration_minutes: started.duration_minutes,
                },
                Err(err) => error_ack(location_id, duration_minutes, err.to_string()),
            }
        };
        self.handle.send_json(&reply);
    }

    /// 连接结束：退出所有预览集合。事件订阅随转发任务一同释放。
    pub fn finish(&self) {
        self.hub.sessions().remove(&self.handle.id());
        let stopped = self.hub.relay.remove_watcher_everywhere(self.handle.id());
        info!(
            target: "cyclops.realtime",
            connection_id = %self.handle.id(),
            previews_stopped = stopped.len(),
            "admin_disconnected"
        );
    }
}

#[async_trait]
impl SessionHandler for AdminSession {
    async fn on_message(&self, message: Inbound) {
        match message {
            Inbound::Text(text) => self.handle_text(&text).await,
            Inbound::Pong => self.handle.mark_alive(),
            Inbound::Binary(_) => record_message_ignored(),
        }
    }
}

fn error_ack(location_id: &str, duration_minutes: u32, error: String) -> AdminReply {
    AdminReply::StartRecordingAck {
        status: AckStatus::Error,
        location_id: location_id.to_string(),
        recording_id: None,
        error: Some(error),
        duration_minutes,
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}
