//! 存储接口 Trait 定义
//!
//! - LocationDirectory：场地目录（设备鉴权）
//! - RecordingJobStore：录制任务

use crate::error::StorageError;
use crate::models::{LocationRecord, RecordingJobRecord, RecordingJobStatus};
use async_trait::async_trait;

/// 场地目录接口
#[async_trait]
pub trait LocationDirectory: Send + Sync {
    /// 根据 location_id 查找场地
    async fn find_location(&self, location_id: &str)
    -> Result<Option<LocationRecord>, StorageError>;
}

/// 录制任务存储接口
#[async_trait]
pub trait RecordingJobStore: Send + Sync {
    /// 创建录制任务（recording_id 已存在时返回错误）
    async fn create_job(&self, record: RecordingJobRecord)
    -> Result<RecordingJobRecord, StorageError>;

    /// 更新任务状态；任务不存在或已处于终态时返回 false
    async fn update_job_status(
        &self,
        recording_id: &str,
        status: RecordingJobStatus,
    ) -> Result<bool, StorageError>;

    async fn find_job(&self, recording_id: &str)
    -> Result<Option<RecordingJobRecord>, StorageError>;
}
