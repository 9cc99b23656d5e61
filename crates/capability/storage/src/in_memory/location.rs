//! 场地目录内存实现

use crate::error::StorageError;
use crate::models::LocationRecord;
use crate::traits::LocationDirectory;
use std::collections::HashMap;
use std::sync::RwLock;

/// 场地目录内存存储
pub struct InMemoryLocationDirectory {
    locations: RwLock<HashMap<String, LocationRecord>>,
}

impl InMemoryLocationDirectory {
    pub fn new() -> Self {
        Self {
            locations: RwLock::new(HashMap::new()),
        }
    }

    /// 使用预置场地创建目录
    pub fn with_locations(records: impl IntoIterator<Item = LocationRecord>) -> Self {
        let locations = records
            .into_iter()
            .map(|record| (record.location_id.clone(), record))
            .collect();
        Self {
            locations: RwLock::new(locations),
        }
    }

    /// 新增或覆盖场地
    pub fn insert(&self, record: LocationRecord) -> Result<(), StorageError> {
        let mut map = self
            .locations
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.insert(record.location_id.clone(), record);
        Ok(())
    }
}

impl Default for InMemoryLocationDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LocationDirectory for InMemoryLocationDirectory {
    async fn find_location(
        &self,
        location_id: &str,
    ) -> Result<Option<LocationRecord>, StorageError> {
        let map = self
            .locations
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.get(location_id).cloned())
    }
}
