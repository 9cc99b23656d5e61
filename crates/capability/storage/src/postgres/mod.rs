//! # PostgreSQL 存储实现模块
//!
//! ## 数据库模式要求
//!
//! - `locations`：场地表（location_id, tenant_id, name, api_key）
//! - `recording_jobs`：录制任务表（recording_id, tenant_id, location_id, requested_by,
//!   duration_minutes, status, metadata jsonb, started_at, updated_at）
//!
//! 所有查询使用参数绑定；时间戳以 epoch 毫秒与 `timestamptz` 互转。

pub mod location;
pub mod recording_job;

pub use location::*;
pub use recording_job::*;
