//! In-memory entity store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use chainflow_core::error::StoreError;
use chainflow_core::store::{Entity, EntityStore};

type Table = BTreeMap<String, Entity>;

/// In-memory [`EntityStore`]. Rows are kept per table, ordered by id.
#[derive(Default)]
pub struct InMemoryEntityStore {
    tables: Mutex<HashMap<String, Table>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, HashMap<String, Table>> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of one table, ordered by id.
    pub fn table(&self, table: &str) -> Vec<(String, Entity)> {
        self.tables()
            .get(table)
            .map(|rows| rows.iter().map(|(id, e)| (id.clone(), e.clone())).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, table: &str) -> usize {
        self.tables().get(table).map_or(0, BTreeMap::len)
    }

    /// Drop every table.
    pub fn clear(&self) {
        self.tables().clear();
    }
}

fn merge(target: &mut Entity, data: Entity) {
    for (key, value) in data {
        target.insert(key, value);
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn find_unique(&self, table: &str, id: &str) -> Result<Option<Entity>, StoreError> {
        Ok(self.tables().get(table).and_then(|rows| rows.get(id)).cloned())
    }

    async fn create(&self, table: &str, id: &str, data: Entity) -> Result<Entity, StoreError> {
        let mut tables = self.tables();
        let rows = tables.entry(table.to_string()).or_default();
        if rows.contains_key(id) {
            return Err(StoreError::AlreadyExists {
                table: table.to_string(),
                id: id.to_string(),
            });
        }
        rows.insert(id.to_string(), data.clone());
        Ok(data)
    }

    async fn update(&self, table: &str, id: &str, data: Entity) -> Result<Entity, StoreError> {
        let mut tables = self.tables();
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;
        merge(row, data);
        Ok(row.clone())
    }

    async fn upsert(&self, table: &str, id: &str, create: Entity, update: Entity) -> Result<Entity, StoreError> {
        let mut tables = self.tables();
        let rows = tables.entry(table.to_string()).or_default();
        match rows.get_mut(id) {
            Some(row) => {
                merge(row, update);
                Ok(row.clone())
            }
            None => {
                rows.insert(id.to_string(), create.clone());
                Ok(create)
            }
        }
    }

    async fn delete(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        Ok(self
            .tables()
            .get_mut(table)
            .map(|rows| rows.remove(id).is_some())
            .unwrap_or(false))
    }
}
