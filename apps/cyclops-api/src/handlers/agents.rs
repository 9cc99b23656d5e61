//! 设备端 WebSocket 接入
//!
//! - GET /agents（升级请求需携带 `x-location-id` 与 `x-api-key`）

use crate::AppState;
use crate::utils::response::reject_upgrade;
use crate::ws;
use axum::{
    extract::{
        ConnectInfo, State,
        ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use cyclops_realtime::ConnectionHandle;
use cyclops_telemetry::record_upgrade_rejected;
use domain::PeerMetadata;
use std::net::SocketAddr;
use tracing::warn;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// 先鉴权再升级：鉴权失败不会创建任何连接状态。
pub async fn agent_socket(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let location_id = header_str(&headers, "x-location-id");
    let api_key = header_str(&headers, "x-api-key");
    let credentials = match state.gateway.authorize(location_id, api_key).await {
        Ok(credentials) => credentials,
        Err(err) => {
            record_upgrade_rejected();
            warn!(
                target: "cyclops.api",
                location_id = location_id.unwrap_or(""),
                peer = %addr,
                status = err.status_code(),
                "agent_upgrade_rejected"
            );
            let status =
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return reject_upgrade(status, &err.to_string());
        }
    };
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let peer = PeerMetadata {
        remote_address: addr.ip().to_string(),
        user_agent: header_str(&headers, header::USER_AGENT.as_str())
            .unwrap_or_default()
            .to_string(),
        api_key: Some(credentials.api_key.clone()),
    };
    let queue = state.config.outbound_queue;
    upgrade.on_upgrade(move |socket| async move {
        let (handle, outbound) = ConnectionHandle::channel(addr.to_string(), queue);
        let session = state.gateway.attach(credentials, handle, peer);
        let reason = ws::pump(socket, outbound, &session).await;
        session.finish(&reason);
    })
}
