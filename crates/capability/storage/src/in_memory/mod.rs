//! 内存存储实现模块
//!
//! 用于测试以及未配置数据库时的本地运行。
//!
//! - LocationDirectory: InMemoryLocationDirectory
//! - RecordingJobStore: InMemoryRecordingJobStore

pub mod location;
pub mod recording_job;

pub use location::*;
pub use recording_job::*;
