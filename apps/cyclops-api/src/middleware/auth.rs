//! 认证和授权中间件
//!
//! - request_context：请求上下文中间件，注入 request_id/trace_id
//! - bearer_token：从 Authorization 头提取 Bearer token
//! - require_operator：校验运维端 token 并要求指定权限（REST 接口）
//! - authorize_upgrade：运维端 WebSocket 升级前的鉴权（token 可放在 `?token=`）

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::Response,
};
use cyclops_auth::{AuthError, authorize_operator};
use cyclops_telemetry::new_request_ids;
use domain::TenantContext;
use tracing::{Instrument, info_span, warn};

use crate::AppState;
use crate::utils::response::{auth_error, forbidden_error, internal_auth_error, reject_upgrade};

/// 请求上下文中间件：注入 request_id/trace_id
pub async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    let ids = new_request_ids();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(ids.clone());

    let span = info_span!(
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path
    );

    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&ids.request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response.headers_mut().insert(
        "x-trace-id",
        HeaderValue::from_str(&ids.trace_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}

/// 从请求头中提取 Bearer token
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header_value = headers.get(header::AUTHORIZATION)?;
    let auth_str = header_value.to_str().ok()?;
    auth_str.strip_prefix("Bearer ")
}

/// REST 接口鉴权；关闭运维端鉴权时返回 None。
pub fn require_operator(
    state: &AppState,
    headers: &HeaderMap,
    permission: &str,
) -> Result<Option<TenantContext>, Response> {
    if !state.config.admin_auth_required {
        return Ok(None);
    }
    match authorize_operator(&state.jwt, bearer_token(headers), permission) {
        Ok(ctx) => Ok(Some(ctx)),
        Err(AuthError::Forbidden) => Err(forbidden_error()),
        Err(AuthError::Internal(message)) => Err(internal_auth_error(message)),
        Err(_) => Err(auth_error(StatusCode::UNAUTHORIZED)),
    }
}

/// 运维端升级鉴权，失败时返回纯文本拒绝响应。
pub fn authorize_upgrade(
    state: &AppState,
    headers: &HeaderMap,
    query_token: Option<&str>,
    permission: &str,
) -> Result<Option<TenantContext>, Response> {
    if !state.config.admin_auth_required {
        return Ok(None);
    }
    let token = bearer_token(headers).or(query_token);
    authorize_operator(&state.jwt, token, permission)
        .map(Some)
        .map_err(|err| {
            warn!(target: "cyclops.api", error = %err, "admin_upgrade_rejected");
            match err {
                AuthError::Forbidden => reject_upgrade(StatusCode::FORBIDDEN, "Forbidden"),
                AuthError::Internal(_) => {
                    reject_upgrade(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
                }
                _ => reject_upgrade(StatusCode::UNAUTHORIZED, "Unauthorized"),
            }
        })
}
