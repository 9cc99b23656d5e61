//! Postgres 录制任务实现

use crate::error::StorageError;
use crate::models::{RecordingJobRecord, RecordingJobStatus};
use crate::traits::RecordingJobStore;
use sqlx::{PgPool, Row};

pub struct PgRecordingJobStore {
    pub pool: PgPool,
}

impl PgRecordingJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RecordingJobStore for PgRecordingJobStore {
    async fn create_job(
        &self,
        record: RecordingJobRecord,
    ) -> Result<RecordingJobRecord, StorageError> {
        sqlx::query(
            "insert into recording_jobs \
             (recording_id, tenant_id, location_id, requested_by, duration_minutes, status, \
             metadata, started_at, updated_at) \
             values ($1, $2, $3, $4, $5, $6, $7::jsonb, to_timestamp($8 / 1000.0), now())",
        )
        .bind(&record.recording_id)
        .bind(&record.tenant_id)
        .bind(&record.location_id)
        .bind(&record.requested_by)
        .bind(record.duration_minutes as i32)
        .bind(record.status.as_str())
        .bind(&record.metadata)
        .bind(record.started_at_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn update_job_status(
        &self,
        recording_id: &str,
        status: RecordingJobStatus,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "update recording_jobs set status = $1, updated_at = now() \
             where recording_id = $2 and status not in ('COMPLETED', 'FAILED', 'CANCELLED')",
        )
        .bind(status.as_str())
        .bind(recording_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_job(
        &self,
        recording_id: &str,
    ) -> Result<Option<RecordingJobRecord>, StorageError> {
        let row = sqlx::query(
            "select recording_id, tenant_id, location_id, requested_by, duration_minutes, status, \
             metadata::text as metadata, \
             (extract(epoch from started_at) * 1000)::bigint as started_at_ms \
             from recording_jobs where recording_id = $1",
        )
        .bind(recording_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row.try_get("status")?;
        let duration_minutes: i32 = row.try_get("duration_minutes")?;
        Ok(Some(RecordingJobRecord {
            recording_id: row.try_get("recording_id")?,
            tenant_id: row.try_get("tenant_id")?,
            location_id: row.try_get("location_id")?,
            requested_by: row.try_get("requested_by")?,
            duration_minutes: duration_minutes.max(0) as u32,
            status: status.parse().map_err(StorageError::new)?,
            metadata: row.try_get("metadata")?,
            started_at_ms: row.try_get("started_at_ms")?,
        }))
    }
}
