use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::location::{self, Entity as Location};
use crate::errors::ServiceError;

/// Lookup over the location tree. A transfer edge is legal only between a
/// location and its direct parent or direct child.
#[async_trait]
pub trait LocationHierarchy: Send + Sync {
    async fn is_direct_edge(&self, from: Uuid, to: Uuid) -> Result<bool, ServiceError>;
}

/// Production implementation backed by the `locations` table.
pub struct SeaOrmLocationHierarchy {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmLocationHierarchy {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn load(&self, id: Uuid) -> Result<location::Model, ServiceError> {
        Location::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Location {} not found", id)))
    }
}

#[async_trait]
impl LocationHierarchy for SeaOrmLocationHierarchy {
    async fn is_direct_edge(&self, from: Uuid, to: Uuid) -> Result<bool, ServiceError> {
        let source = self.load(from).await?;
        let destination = self.load(to).await?;

        if !source.active || !destination.active {
            return Ok(false);
        }

        Ok(source.parent_id == Some(destination.id) || destination.parent_id == Some(source.id))
    }
}

/// In-memory tree for tests: maps each child to its parent.
#[derive(Default)]
pub struct InMemoryHierarchy {
    parents: HashMap<Uuid, Uuid>,
}

impl InMemoryHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_child(&mut self, parent: Uuid, child: Uuid) {
        self.parents.insert(child, parent);
    }
}

#[async_trait]
impl LocationHierarchy for InMemoryHierarchy {
    async fn is_direct_edge(&self, from: Uuid, to: Uuid) -> Result<bool, ServiceError> {
        Ok(self.parents.get(&from) == Some(&to) || self.parents.get(&to) == Some(&from))
    }
}
