//! Storage handles. Callers receive a handle explicitly; there is no process-wide connection.
//!
//! [`Store`] covers record reads and lifecycle writes, [`SchemaOps`] the structural
//! operations used by bootstrap and migrations. Both are implemented by [`PgStore`] and
//! by the in-process [`MemoryStore`].

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{ensure_database_exists, PgStore};

use crate::error::AppError;
use crate::model::{EntityDef, FieldType};
use crate::record::{ListQuery, Record, Visibility};
use async_trait::async_trait;
use serde_json::{Map, Value};

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert domain fields; identity and timestamps are assigned by the store.
    async fn insert(&self, entity: &EntityDef, fields: Map<String, Value>) -> Result<Record, AppError>;

    async fn fetch(&self, entity: &EntityDef, id: i64, visibility: Visibility) -> Result<Option<Record>, AppError>;

    /// Rows ordered by id ascending.
    async fn list(&self, entity: &EntityDef, query: &ListQuery) -> Result<Vec<Record>, AppError>;

    /// Apply `changes` to an active row. `None` when no active row has this id.
    async fn update(&self, entity: &EntityDef, id: i64, changes: Map<String, Value>) -> Result<Option<Record>, AppError>;

    /// Archive an active row. `None` when no active row has this id.
    async fn mark_deleted(&self, entity: &EntityDef, id: i64, actor: Option<i64>) -> Result<Option<Record>, AppError>;

    /// Restore an archived row. `None` when no archived row has this id.
    async fn clear_deleted(&self, entity: &EntityDef, id: i64) -> Result<Option<Record>, AppError>;

    async fn ping(&self) -> Result<(), AppError>;
}

/// A column added by a migration.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub ty: FieldType,
    pub default: Option<Value>,
}

#[async_trait]
pub trait SchemaOps: Send + Sync {
    /// Create the schema (if any) and the applied-migrations ledger.
    async fn ensure_ledger(&self) -> Result<(), AppError>;
    /// Applied migration ids in application order.
    async fn applied_migrations(&self) -> Result<Vec<String>, AppError>;
    async fn record_migration(&self, id: &str) -> Result<(), AppError>;
    async fn forget_migration(&self, id: &str) -> Result<(), AppError>;

    async fn table_exists(&self, table: &str) -> Result<bool, AppError>;
    /// Create the entity's table with its base fields. No-op when it exists.
    async fn create_table(&self, entity: &EntityDef) -> Result<(), AppError>;

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool, AppError>;
    async fn add_column(&self, table: &str, column: &ColumnSpec) -> Result<(), AppError>;
    async fn drop_column(&self, table: &str, column: &str) -> Result<(), AppError>;

    /// Labels of an enum type in declaration order; `None` when the type does not exist.
    async fn enum_values(&self, type_name: &str) -> Result<Option<Vec<String>>, AppError>;
    async fn create_enum(&self, type_name: &str, values: &[String]) -> Result<(), AppError>;
    async fn drop_enum(&self, type_name: &str) -> Result<(), AppError>;
    async fn add_enum_value(&self, type_name: &str, value: &str) -> Result<(), AppError>;

    /// Set `column` to `to` wherever its trimmed lowercase value equals `from` and it is not
    /// already `to`. Archived rows included; `updated_at` is left alone. Returns rows changed.
    async fn rewrite_values(&self, table: &str, column: &str, from: &str, to: &str) -> Result<u64, AppError>;
}
