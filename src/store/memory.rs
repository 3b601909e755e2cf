//! In-process store with the same lifecycle and schema semantics as PostgreSQL.
//! Used by tests and for running the API without a database.

use crate::error::AppError;
use crate::model::{EntityDef, FieldType};
use crate::record::{Filter, ListQuery, Record, Visibility};
use crate::store::{ColumnSpec, SchemaOps, Store};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;

const SYSTEM: [&str; 5] = ["id", "created_at", "updated_at", "deleted_at", "deleted_by"];

#[derive(Debug, Default)]
struct Table {
    columns: BTreeSet<String>,
    unique: Vec<String>,
    rows: BTreeMap<i64, Record>,
    last_id: i64,
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, Table>,
    enums: HashMap<String, Vec<String>>,
    ledger: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

fn missing_relation(table: &str) -> AppError {
    AppError::Storage(sqlx::Error::Protocol(format!("relation \"{}\" does not exist", table)))
}

/// Current time at storage precision (microseconds).
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Next `updated_at`: strictly after the previous value.
fn advance(prev: DateTime<Utc>) -> DateTime<Utc> {
    now().max(prev + Duration::microseconds(1))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn matches(record: &Record, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(col, v) => record.get(col).is_some_and(|x| !x.is_null() && values_equal(x, v)),
        Filter::Contains(col, needle) => {
            let needle = needle.to_lowercase();
            match record.get(col) {
                Some(Value::String(s)) => s.to_lowercase().contains(&needle),
                _ => false,
            }
        }
    }
}

impl Table {
    fn check_columns<'a>(&self, keys: impl Iterator<Item = &'a String>) -> Result<(), AppError> {
        for k in keys {
            if !self.columns.contains(k) {
                return Err(AppError::Storage(sqlx::Error::ColumnNotFound(k.clone())));
            }
        }
        Ok(())
    }

    /// Unique constraints span archived rows too.
    fn check_unique(&self, fields: &Map<String, Value>, skip_id: Option<i64>) -> Result<(), AppError> {
        for col in &self.unique {
            let Some(v) = fields.get(col).filter(|v| !v.is_null()) else { continue };
            let clash = self
                .rows
                .values()
                .any(|r| Some(r.id) != skip_id && r.get(col).is_some_and(|x| values_equal(x, v)));
            if clash {
                return Err(AppError::Conflict(format!("duplicate {} '{}'", col, v.as_str().unwrap_or(&v.to_string()))));
            }
        }
        Ok(())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert(&self, entity: &EntityDef, fields: Map<String, Value>) -> Result<Record, AppError> {
        let mut inner = self.inner.write().await;
        let table = inner.tables.get_mut(entity.table()).ok_or_else(|| missing_relation(entity.table()))?;
        table.check_columns(fields.keys())?;
        table.check_unique(&fields, None)?;
        let ts = now();
        table.last_id += 1;
        let mut record = Record {
            id: table.last_id,
            fields: Map::new(),
            created_at: ts,
            updated_at: ts,
            deleted_at: None,
            deleted_by: None,
        };
        record.fields = fields.into_iter().filter(|(_, v)| !v.is_null()).collect();
        table.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn fetch(&self, entity: &EntityDef, id: i64, visibility: Visibility) -> Result<Option<Record>, AppError> {
        let inner = self.inner.read().await;
        let table = inner.tables.get(entity.table()).ok_or_else(|| missing_relation(entity.table()))?;
        Ok(table.rows.get(&id).filter(|r| visibility.admits(r)).cloned())
    }

    async fn list(&self, entity: &EntityDef, query: &ListQuery) -> Result<Vec<Record>, AppError> {
        let inner = self.inner.read().await;
        let table = inner.tables.get(entity.table()).ok_or_else(|| missing_relation(entity.table()))?;
        for f in &query.filters {
            if !table.columns.contains(f.column()) {
                return Err(AppError::Storage(sqlx::Error::ColumnNotFound(f.column().to_string())));
            }
        }
        Ok(table
            .rows
            .values()
            .filter(|r| query.visibility.admits(r))
            .filter(|r| query.filters.iter().all(|f| matches(r, f)))
            .skip(query.effective_offset() as usize)
            .take(query.effective_limit() as usize)
            .cloned()
            .collect())
    }

    async fn update(&self, entity: &EntityDef, id: i64, changes: Map<String, Value>) -> Result<Option<Record>, AppError> {
        let mut inner = self.inner.write().await;
        let table = inner.tables.get_mut(entity.table()).ok_or_else(|| missing_relation(entity.table()))?;
        table.check_columns(changes.keys())?;
        if !table.rows.get(&id).is_some_and(Record::is_active) {
            return Ok(None);
        }
        table.check_unique(&changes, Some(id))?;
        let Some(record) = table.rows.get_mut(&id) else { return Ok(None) };
        for (k, v) in changes {
            if v.is_null() {
                record.fields.remove(&k);
            } else {
                record.fields.insert(k, v);
            }
        }
        record.updated_at = advance(record.updated_at);
        Ok(Some(record.clone()))
    }

    async fn mark_deleted(&self, entity: &EntityDef, id: i64, actor: Option<i64>) -> Result<Option<Record>, AppError> {
        let mut inner = self.inner.write().await;
        let table = inner.tables.get_mut(entity.table()).ok_or_else(|| missing_relation(entity.table()))?;
        let Some(record) = table.rows.get_mut(&id).filter(|r| r.is_active()) else {
            return Ok(None);
        };
        record.updated_at = advance(record.updated_at);
        record.deleted_at = Some(record.updated_at);
        record.deleted_by = actor;
        Ok(Some(record.clone()))
    }

    async fn clear_deleted(&self, entity: &EntityDef, id: i64) -> Result<Option<Record>, AppError> {
        let mut inner = self.inner.write().await;
        let table = inner.tables.get_mut(entity.table()).ok_or_else(|| missing_relation(entity.table()))?;
        let Some(record) = table.rows.get_mut(&id).filter(|r| !r.is_active()) else {
            return Ok(None);
        };
        record.deleted_at = None;
        record.deleted_by = None;
        record.updated_at = advance(record.updated_at);
        Ok(Some(record.clone()))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
impl SchemaOps for MemoryStore {
    async fn ensure_ledger(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn applied_migrations(&self) -> Result<Vec<String>, AppError> {
        Ok(self.inner.read().await.ledger.clone())
    }

    async fn record_migration(&self, id: &str) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if inner.ledger.iter().any(|m| m == id) {
            return Err(AppError::Conflict(format!("migration {} already recorded", id)));
        }
        inner.ledger.push(id.to_string());
        Ok(())
    }

    async fn forget_migration(&self, id: &str) -> Result<(), AppError> {
        self.inner.write().await.ledger.retain(|m| m != id);
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, AppError> {
        Ok(self.inner.read().await.tables.contains_key(table))
    }

    async fn create_table(&self, entity: &EntityDef) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        for f in entity.base_fields() {
            if let FieldType::Enum { type_name, .. } = &f.ty {
                if !inner.enums.contains_key(type_name) {
                    return Err(AppError::Storage(sqlx::Error::TypeNotFound {
                        type_name: type_name.clone(),
                    }));
                }
            }
        }
        inner.tables.entry(entity.table().to_string()).or_insert_with(|| Table {
            columns: entity
                .base_fields()
                .map(|f| f.name.clone())
                .chain(SYSTEM.iter().map(|s| s.to_string()))
                .collect(),
            unique: entity.unique.clone(),
            ..Table::default()
        });
        Ok(())
    }

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.tables.get(table).is_some_and(|t| t.columns.contains(column)))
    }

    async fn add_column(&self, table: &str, column: &ColumnSpec) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if let FieldType::Enum { type_name, .. } = &column.ty {
            if !inner.enums.contains_key(type_name) {
                return Err(AppError::Storage(sqlx::Error::TypeNotFound {
                    type_name: type_name.clone(),
                }));
            }
        }
        let t = inner.tables.get_mut(table).ok_or_else(|| missing_relation(table))?;
        if !t.columns.insert(column.name.clone()) {
            return Ok(());
        }
        if let Some(default) = &column.default {
            for r in t.rows.values_mut() {
                r.fields.insert(column.name.clone(), default.clone());
            }
        }
        Ok(())
    }

    async fn drop_column(&self, table: &str, column: &str) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let t = inner.tables.get_mut(table).ok_or_else(|| missing_relation(table))?;
        if t.columns.remove(column) {
            for r in t.rows.values_mut() {
                r.fields.remove(column);
            }
            t.unique.retain(|u| u != column);
        }
        Ok(())
    }

    async fn enum_values(&self, type_name: &str) -> Result<Option<Vec<String>>, AppError> {
        Ok(self.inner.read().await.enums.get(type_name).cloned())
    }

    async fn create_enum(&self, type_name: &str, values: &[String]) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if inner.enums.contains_key(type_name) {
            return Err(AppError::Storage(sqlx::Error::Protocol(format!(
                "type \"{}\" already exists",
                type_name
            ))));
        }
        inner.enums.insert(type_name.to_string(), values.to_vec());
        Ok(())
    }

    async fn drop_enum(&self, type_name: &str) -> Result<(), AppError> {
        self.inner.write().await.enums.remove(type_name);
        Ok(())
    }

    async fn add_enum_value(&self, type_name: &str, value: &str) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let values = inner.enums.get_mut(type_name).ok_or_else(|| {
            AppError::Storage(sqlx::Error::TypeNotFound {
                type_name: type_name.to_string(),
            })
        })?;
        if !values.iter().any(|v| v == value) {
            values.push(value.to_string());
        }
        Ok(())
    }

    async fn rewrite_values(&self, table: &str, column: &str, from: &str, to: &str) -> Result<u64, AppError> {
        let mut inner = self.inner.write().await;
        let t = inner.tables.get_mut(table).ok_or_else(|| missing_relation(table))?;
        let mut changed = 0;
        for r in t.rows.values_mut() {
            let matches = r
                .get(column)
                .and_then(Value::as_str)
                .is_some_and(|v| v != to && v.trim().to_lowercase() == from);
            if matches {
                r.fields.insert(column.to_string(), Value::String(to.to_string()));
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Catalog, EntityKind};
    use serde_json::json;

    async fn store_with_units() -> (MemoryStore, EntityDef) {
        let catalog = Catalog::standard().unwrap();
        let unit = catalog.entity(EntityKind::Unit).unwrap().clone();
        let store = MemoryStore::new();
        store.create_table(&unit).await.unwrap();
        (store, unit)
    }

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn ids_are_sequential_and_never_reused() {
        let (store, unit) = store_with_units().await;
        let a = store.insert(&unit, fields(json!({ "project_id": 1, "unit_number": "A" }))).await.unwrap();
        let b = store.insert(&unit, fields(json!({ "project_id": 1, "unit_number": "B" }))).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(a.created_at, a.updated_at);
    }

    #[tokio::test]
    async fn insert_into_missing_column_fails() {
        let (store, unit) = store_with_units().await;
        let err = store
            .insert(&unit, fields(json!({ "project_id": 1, "unit_number": "A", "area_m2": 50.0 })))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(sqlx::Error::ColumnNotFound(_))));
    }

    #[tokio::test]
    async fn lifecycle_transitions_are_state_conditioned() {
        let (store, unit) = store_with_units().await;
        let rec = store.insert(&unit, fields(json!({ "project_id": 1, "unit_number": "A" }))).await.unwrap();
        let gone = store.mark_deleted(&unit, rec.id, Some(3)).await.unwrap().unwrap();
        assert_eq!(gone.deleted_by, Some(3));
        assert!(gone.updated_at > rec.updated_at);
        assert!(store.mark_deleted(&unit, rec.id, Some(3)).await.unwrap().is_none());
        assert!(store.update(&unit, rec.id, Map::new()).await.unwrap().is_none());
        let back = store.clear_deleted(&unit, rec.id).await.unwrap().unwrap();
        assert_eq!(back.deleted_at, None);
        assert_eq!(back.deleted_by, None);
        assert!(back.updated_at > gone.updated_at);
        assert!(store.clear_deleted(&unit, rec.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn filters_and_paging() {
        let (store, unit) = store_with_units().await;
        for (p, n) in [(7, "U-001"), (7, "U-002"), (8, "X-001")] {
            store.insert(&unit, fields(json!({ "project_id": p, "unit_number": n }))).await.unwrap();
        }
        let q = ListQuery::active().filter(Filter::Eq("project_id".into(), json!(7)));
        assert_eq!(store.list(&unit, &q).await.unwrap().len(), 2);
        let q = ListQuery::active().filter(Filter::Contains("unit_number".into(), "x-".into()));
        assert_eq!(store.list(&unit, &q).await.unwrap()[0].id, 3);
        let q = ListQuery {
            limit: Some(1),
            offset: Some(1),
            ..ListQuery::active()
        };
        let page = store.list(&unit, &q).await.unwrap();
        assert_eq!(page.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn add_column_backfills_default_once() {
        let (store, unit) = store_with_units().await;
        store.insert(&unit, fields(json!({ "project_id": 1, "unit_number": "A" }))).await.unwrap();
        let spec = ColumnSpec {
            name: "area_m2".into(),
            ty: FieldType::Decimal,
            default: Some(json!(0)),
        };
        store.add_column("units", &spec).await.unwrap();
        assert!(store.column_exists("units", "area_m2").await.unwrap());
        let rec = store.fetch(&unit, 1, Visibility::All).await.unwrap().unwrap();
        assert_eq!(rec.get("area_m2"), Some(&json!(0)));
    }
}
