//! 录制任务内存实现

use crate::error::StorageError;
use crate::models::{RecordingJobRecord, RecordingJobStatus};
use crate::traits::RecordingJobStore;
use std::collections::HashMap;
use std::sync::RwLock;

pub struct InMemoryRecordingJobStore {
    jobs: RwLock<HashMap<String, RecordingJobRecord>>,
}

impl InMemoryRecordingJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRecordingJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RecordingJobStore for InMemoryRecordingJobStore {
    async fn create_job(
        &self,
        record: RecordingJobRecord,
    ) -> Result<RecordingJobRecord, StorageError> {
        let mut map = self
            .jobs
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if map.contains_key(&record.recording_id) {
            return Err(StorageError::new("recording exists"));
        }
        map.insert(record.recording_id.clone(), record.clone());
        Ok(record)
    }

    async fn update_job_status(
        &self,
        recording_id: &str,
        status: RecordingJobStatus,
    ) -> Result<bool, StorageError> {
        let mut map = self
            .jobs
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        match map.get_mut(recording_id) {
            Some(job) if !job.status.is_terminal() => {
                job.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_job(
        &self,
        recording_id: &str,
    ) -> Result<Option<RecordingJobRecord>, StorageError> {
        let item = self
            .jobs
            .read()
            .ok()
            .and_then(|map| map.get(recording_id).cloned());
        Ok(item)
    }
}
