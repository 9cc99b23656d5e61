//! 连接层计数器快照。
//!
//! - GET /api/metrics

use api_contract::{ApiResponse, MetricsSnapshotDto};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use cyclops_telemetry::metrics;
use domain::permissions;

use crate::{AppState, middleware::require_operator};

pub async fn get_metrics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = require_operator(&state, &headers, permissions::SYSTEM_METRICS_READ) {
        return response;
    }

    let snapshot = metrics().snapshot();
    (
        StatusCode::OK,
        Json(ApiResponse::success(MetricsSnapshotDto {
            agents_connected: snapshot.agents_connected,
            agents_replaced: snapshot.agents_replaced,
            agents_disconnected: snapshot.agents_disconnected,
            agents_terminated: snapshot.agents_terminated,
            upgrades_rejected: snapshot.upgrades_rejected,
            frames_received: snapshot.frames_received,
            frames_delivered: snapshot.frames_delivered,
            frames_dropped: snapshot.frames_dropped,
            frame_deliveries_skipped: snapshot.frame_deliveries_skipped,
            commands_sent: snapshot.commands_sent,
            commands_undelivered: snapshot.commands_undelivered,
            events_lagged: snapshot.events_lagged,
            job_update_failures: snapshot.job_update_failures,
            messages_ignored: snapshot.messages_ignored,
        })),
    )
        .into_response()
}
