//! Postgres 场地目录实现

use crate::error::StorageError;
use crate::models::LocationRecord;
use crate::traits::LocationDirectory;
use sqlx::{PgPool, Row};

pub struct PgLocationDirectory {
    pub pool: PgPool,
}

impl PgLocationDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LocationDirectory for PgLocationDirectory {
    async fn find_location(
        &self,
        location_id: &str,
    ) -> Result<Option<LocationRecord>, StorageError> {
        let row = sqlx::query(
            "select location_id, tenant_id, name, api_key from locations where location_id = $1",
        )
        .bind(location_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(LocationRecord {
            location_id: row.try_get("location_id")?,
            tenant_id: row.try_get("tenant_id")?,
            name: row.try_get("name")?,
            api_key: row.try_get("api_key")?,
        }))
    }
}
