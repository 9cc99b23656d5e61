//! 运维端接口
//!
//! - GET /admin（WebSocket：快照 + 事件流 + 预览/录制请求）
//! - GET /api/admin/agents
//! - GET /api/admin/agents/{location_id}
//! - POST /api/admin/agents/{location_id}/start-recording

use crate::AppState;
use crate::middleware::{authorize_upgrade, require_operator};
use crate::utils::response::{not_found_error, recording_error};
use crate::ws;
use api_contract::{ApiResponse, StartRecordingRequest, StartRecordingResponse};
use axum::{
    Json,
    extract::{
        ConnectInfo, Path, Query, State,
        ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use cyclops_realtime::{ConnectionHandle, RecordingRequest, forward_events};
use cyclops_telemetry::record_upgrade_rejected;
use domain::permissions;
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Default, Deserialize)]
pub struct AdminQuery {
    #[serde(default)]
    pub token: Option<String>,
}

pub async fn admin_socket(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<AdminQuery>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let operator = match authorize_upgrade(
        &state,
        &headers,
        query.token.as_deref(),
        permissions::AGENT_MONITOR,
    ) {
        Ok(operator) => operator,
        Err(response) => {
            record_upgrade_rejected();
            return response;
        }
    };
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let queue = state.config.outbound_queue;
    upgrade.on_upgrade(move |socket| async move {
        let (handle, outbound) = ConnectionHandle::channel(addr.to_string(), queue);
        let (session, events) = state.hub.connect(handle.clone(), operator);
        let forwarder = tokio::spawn(forward_events(handle, events));
        ws::pump(socket, outbound, &session).await;
        forwarder.abort();
        session.finish();
    })
}

#[derive(Deserialize)]
pub struct AgentPath {
    pub(crate) location_id: String,
}

pub async fn list_agents(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = require_operator(&state, &headers, permissions::AGENT_MONITOR) {
        return response;
    }
    let agents = state.registry.list();
    (StatusCode::OK, Json(ApiResponse::success(agents))).into_response()
}

pub async fn get_agent(
    State(state): State<AppState>,
    Path(path): Path<AgentPath>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = require_operator(&state, &headers, permissions::AGENT_MONITOR) {
        return response;
    }
    match state.registry.get(&path.location_id) {
        Some(agent) => (StatusCode::OK, Json(ApiResponse::success(agent))).into_response(),
        None => not_found_error(),
    }
}

pub async fn start_recording(
    State(state): State<AppState>,
    Path(path): Path<AgentPath>,
    headers: HeaderMap,
    body: Option<Json<StartRecordingRequest>>,
) -> Response {
    let operator = match require_operator(&state, &headers, permissions::AGENT_RECORD) {
        Ok(operator) => operator,
        Err(response) => return response,
    };
    let Json(body) = body.unwrap_or_default();
    let request = RecordingRequest {
        location_id: path.location_id,
        duration_minutes: body.duration_minutes,
        recording_id: body.recording_id,
        tenant_id: operator.as_ref().map(|ctx| ctx.tenant_id.clone()),
        requested_by: operator.as_ref().map(|ctx| ctx.user_id.clone()),
        metadata: body.metadata,
    };
    match state.recordings.start(request).await {
        Ok(started) => (
            StatusCode::OK,
            Json(ApiResponse::success(StartRecordingResponse {
                recording_id: started.recording_id,
                location_id: started.location_id,
                duration_minutes: started.duration_minutes,
            })),
        )
            .into_response(),
        Err(err) => recording_error(err),
    }
}
