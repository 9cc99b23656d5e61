//! HTTP 响应辅助函数
//!
//! - REST 接口统一返回 ApiResponse 格式，HTTP 状态码与错误码对应
//! - WebSocket 升级被拒绝时返回纯文本并要求关闭连接

use api_contract::ApiResponse;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use cyclops_realtime::RecordingError;

/// 认证错误响应
pub fn auth_error(status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()>::error(
            "AUTH.UNAUTHORIZED",
            "unauthorized",
        )),
    )
        .into_response()
}

/// 禁止访问错误响应
pub fn forbidden_error() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(ApiResponse::<()>::error("AUTH.FORBIDDEN", "forbidden")),
    )
        .into_response()
}

/// 资源未找到错误响应
pub fn not_found_error() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error("RESOURCE.NOT_FOUND", "not found")),
    )
        .into_response()
}

/// 认证内部错误响应
pub fn internal_auth_error(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error("INTERNAL.ERROR", message)),
    )
        .into_response()
}

/// 录制请求失败：离线 400，忙碌与不可达 503
pub fn recording_error(err: RecordingError) -> Response {
    let status = match err {
        RecordingError::AgentOffline => StatusCode::BAD_REQUEST,
        RecordingError::AgentBusy | RecordingError::Undelivered => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        status,
        Json(ApiResponse::<()>::error(err.code(), err.to_string())),
    )
        .into_response()
}

/// WebSocket 升级拒绝：纯文本 + `Connection: close`
pub fn reject_upgrade(status: StatusCode, message: &str) -> Response {
    let mut response = (status, message.to_string()).into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
