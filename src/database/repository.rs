use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::models::Hotspot;

/// Access to hotspot records owned by the CRUD layer. Orchestration reads
/// declared fields and may only write `is_active` and `current_task_id`.
#[async_trait]
pub trait HotspotStore: Send + Sync {
    async fn get(&self, id: i32) -> Result<Option<Hotspot>, DatabaseError>;

    async fn set_active(&self, id: i32, is_active: bool) -> Result<(), DatabaseError>;

    async fn set_current_task(&self, id: i32, task_id: Option<Uuid>) -> Result<(), DatabaseError>;
}

/// Postgres-backed store
pub struct PgHotspotStore {
    table_name: String,
    pool: PgPool,
}

impl PgHotspotStore {
    pub fn new(table_name: impl Into<String>, pool: PgPool) -> Result<Self, DatabaseError> {
        let table_name = table_name.into();
        if !DatabaseManager::is_valid_table_name(&table_name) {
            return Err(DatabaseError::InvalidTableName(table_name));
        }
        Ok(Self { table_name, pool })
    }

    fn not_found(id: i32) -> DatabaseError {
        DatabaseError::NotFound(format!("hotspot {}", id))
    }
}

#[async_trait]
impl HotspotStore for PgHotspotStore {
    async fn get(&self, id: i32) -> Result<Option<Hotspot>, DatabaseError> {
        let sql = format!(
            "SELECT id, owner_id, ssid, password, channel, bandwidth_limit, max_users, \
             is_active, current_task_id, created_at, updated_at \
             FROM \"{}\" WHERE id = $1",
            self.table_name
        );
        let hotspot = sqlx::query_as::<_, Hotspot>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(hotspot)
    }

    async fn set_active(&self, id: i32, is_active: bool) -> Result<(), DatabaseError> {
        let sql = format!(
            "UPDATE \"{}\" SET is_active = $2, updated_at = NOW() WHERE id = $1",
            self.table_name
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(is_active)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    async fn set_current_task(&self, id: i32, task_id: Option<Uuid>) -> Result<(), DatabaseError> {
        let sql = format!(
            "UPDATE \"{}\" SET current_task_id = $2, updated_at = NOW() WHERE id = $1",
            self.table_name
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Self::not_found(id));
        }
        Ok(())
    }
}

/// In-memory store for tests and local tooling
#[derive(Clone, Default)]
pub struct MemoryHotspotStore {
    rows: Arc<RwLock<HashMap<i32, Hotspot>>>,
}

impl MemoryHotspotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, hotspot: Hotspot) {
        self.rows.write().await.insert(hotspot.id, hotspot);
    }

    pub async fn remove(&self, id: i32) -> Option<Hotspot> {
        self.rows.write().await.remove(&id)
    }
}

#[async_trait]
impl HotspotStore for MemoryHotspotStore {
    async fn get(&self, id: i32) -> Result<Option<Hotspot>, DatabaseError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn set_active(&self, id: i32, is_active: bool) -> Result<(), DatabaseError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("hotspot {}", id)))?;
        row.is_active = is_active;
        row.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn set_current_task(&self, id: i32, task_id: Option<Uuid>) -> Result<(), DatabaseError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("hotspot {}", id)))?;
        row.current_task_id = task_id;
        row.updated_at = chrono::Utc::now();
        Ok(())
    }
}
