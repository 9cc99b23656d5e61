//! 领域模型：运维身份上下文与设备（agent）记录。

pub mod agent;
pub mod permissions;

pub use agent::{
    AgentActivity, AgentPatch, AgentRecord, AgentStatus, CameraInfo, CpuUsage, PeerMetadata,
    TelemetrySnapshot, UsageStats,
};

/// 运维身份上下文：由 access_token 解析得到。
#[derive(Debug, Clone, Default)]
pub struct TenantContext {
    pub tenant_id: String,
    pub user_id: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl TenantContext {
    /// 构造显式身份与权限的上下文。
    pub fn new(
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        roles: Vec<String>,
        permissions: Vec<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            roles,
            permissions,
        }
    }

    /// 是否具备指定权限（admin 角色视为拥有全部权限）。
    pub fn allows(&self, permission: &str) -> bool {
        permissions::has_permission(self, permission)
    }
}
