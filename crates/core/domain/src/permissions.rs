//! 权限常量。

use crate::TenantContext;

/// 拥有全部权限的角色。
pub const ROLE_ADMIN: &str = "admin";

/// 订阅设备快照与生命周期事件。
pub const AGENT_MONITOR: &str = "AGENT.MONITOR";
/// 观看实时预览。
pub const AGENT_PREVIEW: &str = "AGENT.PREVIEW";
/// 启动/停止录制。
pub const AGENT_RECORD: &str = "AGENT.RECORD";
/// 读取运行指标。
pub const SYSTEM_METRICS_READ: &str = "SYSTEM.METRICS.READ";

pub fn has_permission(ctx: &TenantContext, permission: &str) -> bool {
    ctx.roles.iter().any(|role| role == ROLE_ADMIN)
        || ctx.permissions.iter().any(|item| item == permission)
}
