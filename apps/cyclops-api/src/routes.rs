//! 路由定义
//!
//! 一个监听端口上同时承载：
//! - 健康检查：/health
//! - 设备端 WebSocket：/agents
//! - 运维端 WebSocket：/admin
//! - 管理接口：/api/admin/agents/*、/api/metrics
//!
//! 其他路径返回纯文本 404 并关闭连接。

use super::AppState;
use super::handlers::*;
use crate::middleware::request_context;
use crate::utils::response::reject_upgrade;
use axum::{
    Router,
    http::StatusCode,
    middleware,
    response::Response,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

async fn not_found() -> Response {
    reject_upgrade(StatusCode::NOT_FOUND, "Not found")
}

/// 创建完整路由
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/agents", get(agent_socket))
        .route("/admin", get(admin_socket))
        .route("/api/admin/agents", get(list_agents))
        .route("/api/admin/agents/{location_id}", get(get_agent))
        .route(
            "/api/admin/agents/{location_id}/start-recording",
            post(start_recording),
        )
        .route("/api/metrics", get(get_metrics))
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // 注入 request_id/trace_id
        .layer(middleware::from_fn(request_context))
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::build_state;
    use axum::{
        Router,
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::{Request, StatusCode, header},
    };
    use cyclops_config::AppConfig;
    use cyclops_storage::{InMemoryLocationDirectory, InMemoryRecordingJobStore, LocationRecord};
    use domain::TenantContext;
    use domain::permissions::{AGENT_MONITOR, ROLE_ADMIN};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_config(admin_auth_required: bool) -> AppConfig {
        AppConfig {
            http_addr: "127.0.0.1:0".to_string(),
            database_url: None,
            seed_locations: Vec::new(),
            jwt_secret: "test-secret".to_string(),
            jwt_access_ttl_seconds: 3600,
            admin_auth_required,
            verify_agent_secret: true,
            ping_interval_seconds: 30,
            event_buffer: 64,
            outbound_queue: 16,
            preview_fps: 10,
            preview_quality: 6,
            default_recording_minutes: 2,
        }
    }

    struct TestApp {
        router: Router,
        state: crate::AppState,
    }

    fn app(admin_auth_required: bool) -> TestApp {
        let directory = Arc::new(InMemoryLocationDirectory::with_locations(vec![LocationRecord {
            location_id: "loc-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            name: "court 1".to_string(),
            api_key: "key-1".to_string(),
        }]));
        let jobs = Arc::new(InMemoryRecordingJobStore::new());
        let state = build_state(test_config(admin_auth_required), directory, jobs);
        let router = create_router(state.clone())
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
        TestApp { router, state }
    }

    fn token(state: &crate::AppState, roles: &[&str], permissions: &[&str]) -> String {
        let ctx = TenantContext::new(
            "tenant-1",
            "user-1",
            roles.iter().map(|role| role.to_string()).collect(),
            permissions.iter().map(|perm| perm.to_string()).collect(),
        );
        state.jwt.issue_access_token(&ctx).expect("token")
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, String, Option<String>) {
        let response = router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let connection = response
            .headers()
            .get(header::CONNECTION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned(), connection)
    }

    fn get(uri: &str) -> axum::http::request::Builder {
        Request::builder().method("GET").uri(uri)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = app(true);
        let (status, body, _) = send(&app.router, get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).expect("json");
        assert_eq!(json["ok"], true);
    }

    #[tokio::test]
    async fn agent_upgrade_rejections_are_plain_text() {
        let app = app(true);

        let (status, body, connection) =
            send(&app.router, get("/agents").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "Missing auth");
        assert_eq!(connection.as_deref(), Some("close"));

        let request = get("/agents")
            .header("x-location-id", "loc-9")
            .header("x-api-key", "key-1")
            .body(Body::empty())
            .unwrap();
        let (status, body, _) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Location not found");

        let request = get("/agents")
            .header("x-location-id", "loc-1")
            .header("x-api-key", "wrong")
            .body(Body::empty())
            .unwrap();
        let (status, body, _) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "Forbidden");
        assert!(!app.state.registry.is_connected("loc-1"));
    }

    #[tokio::test]
    async fn authorized_agent_still_needs_upgrade_request() {
        let app = app(true);
        let request = get("/agents")
            .header("x-location-id", "loc-1")
            .header("x-api-key", "key-1")
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&app.router, request).await;
        assert!(status.is_client_error());
        assert_ne!(status, StatusCode::UNAUTHORIZED);
        assert_ne!(status, StatusCode::NOT_FOUND);
        assert!(app.state.registry.get("loc-1").is_none());
    }

    #[tokio::test]
    async fn unknown_path_is_plain_404() {
        let app = app(true);
        let (status, body, connection) =
            send(&app.router, get("/nope").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Not found");
        assert_eq!(connection.as_deref(), Some("close"));
    }

    #[tokio::test]
    async fn admin_upgrade_requires_token() {
        let app = app(true);
        let (status, body, _) = send(&app.router, get("/admin").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "Unauthorized");

        let (status, _, _) = send(
            &app.router,
            get("/admin?token=garbage").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let weak = token(&app.state, &[], &[]);
        let (status, body, _) = send(
            &app.router,
            get(&format!("/admin?token={weak}")).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "Forbidden");
    }

    #[tokio::test]
    async fn rest_agents_require_operator_token() {
        let app = app(true);
        let (status, _, _) =
            send(&app.router, get("/api/admin/agents").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        app.state.registry.upsert("loc-1", domain::AgentPatch::default());
        let bearer = format!("Bearer {}", token(&app.state, &[], &[AGENT_MONITOR]));
        let request = get("/api/admin/agents")
            .header(header::AUTHORIZATION, &bearer)
            .body(Body::empty())
            .unwrap();
        let (status, body, _) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).expect("json");
        assert_eq!(json["success"], true);
        assert_eq!(json["data"][0]["locationId"], "loc-1");
        assert_eq!(json["data"][0]["status"], "disconnected");

        let request = get("/api/admin/agents/loc-9")
            .header(header::AUTHORIZATION, &bearer)
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn start_recording_for_offline_agent_is_bad_request() {
        let app = app(true);
        let bearer = format!("Bearer {}", token(&app.state, &[ROLE_ADMIN], &[]));
        let request = Request::builder()
            .method("POST")
            .uri("/api/admin/agents/loc-1/start-recording")
            .header(header::AUTHORIZATION, bearer)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"durationMinutes":5}"#))
            .unwrap();
        let (status, body, _) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: Value = serde_json::from_str(&body).expect("json");
        assert_eq!(json["error"]["code"], "AGENT.OFFLINE");
    }

    #[tokio::test]
    async fn metrics_and_agents_open_when_admin_auth_disabled() {
        let app = app(false);
        let (status, body, _) =
            send(&app.router, get("/api/metrics").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).expect("json");
        assert!(json["data"]["framesReceived"].is_u64());

        let (status, _, _) =
            send(&app.router, get("/api/admin/agents").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn responses_carry_request_ids() {
        let app = app(true);
        let response = app
            .router
            .clone()
            .oneshot(get("/health").body(Body::empty()).unwrap())
            .await
            .expect("response");
        assert!(response.headers().contains_key("x-request-id"));
        assert!(response.headers().contains_key("x-trace-id"));
    }
}
