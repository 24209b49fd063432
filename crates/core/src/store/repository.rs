//! Typed access to one table through the local store.

use std::marker::PhantomData;
use std::sync::Arc;

use policydesk_domain::{changes_to_record, Entity, Result};
use serde_json::Value;

use super::local_store::LocalStore;

/// Entity-typed view of a [`LocalStore`] table.
pub struct Repository<E: Entity> {
    local: Arc<LocalStore>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self { local: Arc::clone(&self.local), _entity: PhantomData }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(local: Arc<LocalStore>) -> Self {
        Self { local, _entity: PhantomData }
    }

    pub async fn add(&self, entity: &E) -> Result<E> {
        let stored = self.local.insert(E::TABLE, entity.to_record()?).await?;
        E::from_record(stored)
    }

    pub async fn update(&self, id: &str, changes: &E::Changes) -> Result<E> {
        let merged = self.local.update(E::TABLE, id, changes_to_record(changes)?).await?;
        E::from_record(merged)
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.local.delete(E::TABLE, id).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<E>> {
        self.local.get(E::TABLE, id).await?.map(E::from_record).transpose()
    }

    pub async fn list(&self) -> Result<Vec<E>> {
        self.local.all(E::TABLE).await?.into_iter().map(E::from_record).collect()
    }

    pub async fn find_by(&self, field: &str, value: impl Into<Value> + Send) -> Result<Vec<E>> {
        let value = value.into();
        self.local.find_by(E::TABLE, field, &value).await?.into_iter().map(E::from_record).collect()
    }
}
