//! Builds parameterized SELECT, INSERT, UPDATE and lifecycle statements from entity declarations.
//! Identifiers come from the catalog only; values are always parameters.

use crate::model::{EntityDef, FieldType};
use crate::record::{Filter, ListQuery, Visibility};
use crate::sql::params::{contains_pattern, SqlParam};
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, p: SqlParam) -> usize {
        self.params.push(p);
        self.params.len()
    }

    /// Placeholder for a domain value, cast to the column type.
    fn push_value(&mut self, ty: &FieldType, schema: &str, v: &Value) -> String {
        let n = self.push_param(SqlParam::from_json(v));
        format!("${}::{}", n, ty.pg_type(schema))
    }
}

/// SELECT list. Enums and numerics come back as text so decimals keep every digit.
fn select_column_list(entity: &EntityDef) -> String {
    let mut cols = vec![quoted("id")];
    for f in &entity.fields {
        let q = quoted(&f.name);
        cols.push(match f.ty {
            FieldType::Enum { .. } | FieldType::Decimal => format!("{}::text AS {}", q, q),
            _ => q,
        });
    }
    for c in ["created_at", "updated_at", "deleted_at", "deleted_by"] {
        cols.push(quoted(c));
    }
    cols.join(", ")
}

fn visibility_clause(v: Visibility) -> Option<String> {
    match v {
        Visibility::Active => Some(format!("{} IS NULL", quoted("deleted_at"))),
        Visibility::Archived => Some(format!("{} IS NOT NULL", quoted("deleted_at"))),
        Visibility::All => None,
    }
}

/// `updated_at` never moves backwards, even when two mutations share a transaction timestamp.
fn touch_updated_at() -> String {
    let col = quoted("updated_at");
    format!("{col} = GREATEST(NOW(), {col} + INTERVAL '1 microsecond')")
}

/// SELECT one row by id within the requested visibility.
pub fn select_by_id(entity: &EntityDef, schema: &str, id: i64, visibility: Visibility) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(SqlParam::BigInt(id));
    let mut where_parts = vec![format!("{} = ${}", quoted("id"), n)];
    where_parts.extend(visibility_clause(visibility));
    q.sql = format!(
        "SELECT {} FROM {} WHERE {}",
        select_column_list(entity),
        qualified_table(schema, entity.table()),
        where_parts.join(" AND ")
    );
    q
}

/// SELECT list: visibility clause, then filters in order, ORDER BY id, LIMIT/OFFSET.
/// Filters on undeclared columns are skipped; callers validate them first.
pub fn select_list(entity: &EntityDef, schema: &str, query: &ListQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut where_parts: Vec<String> = visibility_clause(query.visibility).into_iter().collect();
    for filter in &query.filters {
        let Some(f) = entity.field(filter.column()) else { continue };
        match filter {
            Filter::Eq(col, v) => {
                let ph = q.push_value(&f.ty, schema, v);
                where_parts.push(format!("{} = {}", quoted(col), ph));
            }
            Filter::Contains(col, needle) => {
                let n = q.push_param(SqlParam::Text(Some(contains_pattern(needle))));
                where_parts.push(format!("{}::text ILIKE ${}", quoted(col), n));
            }
        }
    }
    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT {} OFFSET {}",
        select_column_list(entity),
        qualified_table(schema, entity.table()),
        where_clause,
        quoted("id"),
        query.effective_limit(),
        query.effective_offset()
    );
    q
}

/// INSERT the provided domain fields; id and timestamps come from column defaults.
pub fn insert(entity: &EntityDef, schema: &str, fields: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(schema, entity.table());
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for f in &entity.fields {
        let Some(v) = fields.get(&f.name) else { continue };
        placeholders.push(q.push_value(&f.ty, schema, v));
        cols.push(quoted(&f.name));
    }
    let returning = select_column_list(entity);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE an active row: SET declared columns present in `changes`, refresh updated_at.
pub fn update(entity: &EntityDef, schema: &str, id: i64, changes: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for (k, v) in changes {
        let Some(f) = entity.field(k) else { continue };
        let ph = q.push_value(&f.ty, schema, v);
        sets.push(format!("{} = {}", quoted(k), ph));
    }
    sets.push(touch_updated_at());
    let id_param = q.push_param(SqlParam::BigInt(id));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = ${} AND {} IS NULL RETURNING {}",
        qualified_table(schema, entity.table()),
        sets.join(", "),
        quoted("id"),
        id_param,
        quoted("deleted_at"),
        select_column_list(entity)
    );
    q
}

/// Archive an active row. The state check lives in the WHERE clause, so a concurrent
/// second soft-delete matches nothing.
pub fn soft_delete(entity: &EntityDef, schema: &str, id: i64, actor: Option<i64>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_param = q.push_param(SqlParam::BigInt(id));
    let actor_param = q.push_param(SqlParam::OptBigInt(actor));
    q.sql = format!(
        "UPDATE {} SET {} = NOW(), {} = ${}, {} WHERE {} = ${} AND {} IS NULL RETURNING {}",
        qualified_table(schema, entity.table()),
        quoted("deleted_at"),
        quoted("deleted_by"),
        actor_param,
        touch_updated_at(),
        quoted("id"),
        id_param,
        quoted("deleted_at"),
        select_column_list(entity)
    );
    q
}

/// Bring an archived row back: clears deleted_at and deleted_by.
pub fn restore(entity: &EntityDef, schema: &str, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_param = q.push_param(SqlParam::BigInt(id));
    q.sql = format!(
        "UPDATE {} SET {} = NULL, {} = NULL, {} WHERE {} = ${} AND {} IS NOT NULL RETURNING {}",
        qualified_table(schema, entity.table()),
        quoted("deleted_at"),
        quoted("deleted_by"),
        touch_updated_at(),
        quoted("id"),
        id_param,
        quoted("deleted_at"),
        select_column_list(entity)
    );
    q
}
