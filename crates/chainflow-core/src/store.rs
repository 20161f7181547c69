//! Entity store interface used by handlers.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreError;

/// An application entity: a JSON object.
pub type Entity = Map<String, Value>;

/// CRUD access to application tables. Implementations live outside the engine.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn find_unique(&self, table: &str, id: &str) -> Result<Option<Entity>, StoreError>;

    /// Fails with [`StoreError::AlreadyExists`] if the row exists.
    async fn create(&self, table: &str, id: &str, data: Entity) -> Result<Entity, StoreError>;

    /// Merges `data` into the existing row; fails with [`StoreError::NotFound`] if absent.
    async fn update(&self, table: &str, id: &str, data: Entity) -> Result<Entity, StoreError>;

    /// Inserts `create` if the row is absent, otherwise merges `update`.
    async fn upsert(&self, table: &str, id: &str, create: Entity, update: Entity) -> Result<Entity, StoreError>;

    /// Returns `true` if a row was removed.
    async fn delete(&self, table: &str, id: &str) -> Result<bool, StoreError>;
}
