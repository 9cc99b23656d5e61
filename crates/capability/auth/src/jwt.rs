//! 运维端 access token（HS256）。

use crate::AuthError;
use domain::TenantContext;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// 只接受 access 类型的 token，refresh token 不能用于连接运维端。
const ACCESS_TOKEN_TYPE: &str = "access";
/// 允许的时钟偏差（秒）。
const CLOCK_LEEWAY_SECONDS: u64 = 30;

#[derive(Debug, Serialize, Deserialize)]
struct OperatorClaims {
    sub: String,
    tenant_id: String,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    permissions: Vec<String>,
    iat: u64,
    exp: u64,
    token_type: String,
}

impl OperatorClaims {
    fn into_context(self) -> TenantContext {
        TenantContext::new(self.tenant_id, self.sub, self.roles, self.permissions)
    }
}

pub struct JwtManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl_seconds: u64,
}

impl JwtManager {
    pub fn new(secret: String, access_ttl_seconds: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_LEEWAY_SECONDS;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl_seconds,
        }
    }

    /// 签发 access token。生产环境由账号服务签发，这里供本地调试与测试使用。
    pub fn issue_access_token(&self, ctx: &TenantContext) -> Result<String, AuthError> {
        let iat = epoch_seconds();
        let claims = OperatorClaims {
            sub: ctx.user_id.clone(),
            tenant_id: ctx.tenant_id.clone(),
            roles: ctx.roles.clone(),
            permissions: ctx.permissions.clone(),
            iat,
            exp: iat + self.access_ttl_seconds,
            token_type: ACCESS_TOKEN_TYPE.to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| AuthError::Internal(err.to_string()))
    }

    pub fn decode_access(&self, token: &str) -> Result<TenantContext, AuthError> {
        let claims = jsonwebtoken::decode::<OperatorClaims>(token, &self.decoding, &self.validation)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            })?
            .claims;
        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AuthError::TokenInvalid);
        }
        Ok(claims.into_context())
    }
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
