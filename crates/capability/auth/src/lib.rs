//! 认证能力：运维端 access_token 校验与设备共享密钥比较。
//!
//! 运维端 token 由外部账号服务签发（HS256），本服务只做校验与权限判断。
//! 设备端通过 `x-location-id` + `x-api-key` 升级连接，密钥比较走常量时间。

mod jwt;
mod secret;

use domain::TenantContext;

pub use jwt::JwtManager;
pub use secret::verify_device_secret;

/// 认证相关错误。
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,
    #[error("token expired")]
    TokenExpired,
    #[error("token invalid")]
    TokenInvalid,
    #[error("forbidden")]
    Forbidden,
    #[error("internal error: {0}")]
    Internal(String),
}

/// 校验 token 并要求指定权限。
pub fn authorize_operator(
    jwt: &JwtManager,
    token: Option<&str>,
    permission: &str,
) -> Result<TenantContext, AuthError> {
    let token = token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)?;
    let ctx = jwt.decode_access(token)?;
    if !ctx.allows(permission) {
        return Err(AuthError::Forbidden);
    }
    Ok(ctx)
}
