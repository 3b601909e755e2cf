//! DDL for bootstrap and schema-evolution steps. Every statement is written to be re-runnable.

use crate::model::{EntityDef, FieldType};
use crate::sql::builder::{qualified_table, quoted};
use serde_json::Value;

/// SQL literal for a column default.
pub fn literal(v: &Value) -> String {
    match v {
        Value::Null => "NULL".into(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Array(_) | Value::Object(_) => format!("'{}'", v.to_string().replace('\'', "''")),
    }
}

fn column_def(schema: &str, name: &str, ty: &FieldType, not_null: bool, default: Option<&Value>) -> String {
    let pg_type = ty.pg_type(schema);
    let mut def = format!("{} {}", quoted(name), pg_type);
    if not_null {
        def.push_str(" NOT NULL");
    }
    if let Some(d) = default {
        def.push_str(&format!(" DEFAULT {}::{}", literal(d), pg_type));
    }
    def
}

/// CREATE TABLE with the entity's base fields and the system columns. Columns added by
/// later migrations are left out. No foreign keys: relations are resolved in the query layer.
pub fn create_table(entity: &EntityDef, schema: &str) -> String {
    let mut col_defs = vec![format!("{} BIGSERIAL PRIMARY KEY", quoted("id"))];
    for f in entity.base_fields() {
        col_defs.push(column_def(schema, &f.name, &f.ty, f.rule.required, f.default.as_ref()));
    }
    col_defs.push(format!("{} TIMESTAMPTZ NOT NULL DEFAULT NOW()", quoted("created_at")));
    col_defs.push(format!("{} TIMESTAMPTZ NOT NULL DEFAULT NOW()", quoted("updated_at")));
    col_defs.push(format!("{} TIMESTAMPTZ", quoted("deleted_at")));
    col_defs.push(format!("{} BIGINT", quoted("deleted_by")));
    for u in &entity.unique {
        col_defs.push(format!("UNIQUE ({})", quoted(u)));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        qualified_table(schema, entity.table()),
        col_defs.join(",\n  ")
    )
}

/// Partial index backing the default active-only listing.
pub fn create_active_index(entity: &EntityDef, schema: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({}) WHERE {} IS NULL",
        quoted(&format!("{}_active_idx", entity.table())),
        qualified_table(schema, entity.table()),
        quoted("id"),
        quoted("deleted_at")
    )
}

pub fn add_column(schema: &str, table: &str, name: &str, ty: &FieldType, default: Option<&Value>) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
        qualified_table(schema, table),
        column_def(schema, name, ty, false, default)
    )
}

pub fn drop_column(schema: &str, table: &str, name: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN IF EXISTS {}",
        qualified_table(schema, table),
        quoted(name)
    )
}

pub fn create_enum(schema: &str, type_name: &str, values: &[String]) -> String {
    let values: Vec<String> = values.iter().map(|v| literal(&Value::String(v.clone()))).collect();
    format!(
        "CREATE TYPE {} AS ENUM ({})",
        qualified_table(schema, type_name),
        values.join(", ")
    )
}

pub fn drop_enum(schema: &str, type_name: &str) -> String {
    format!("DROP TYPE IF EXISTS {}", qualified_table(schema, type_name))
}

pub fn add_enum_value(schema: &str, type_name: &str, value: &str) -> String {
    format!(
        "ALTER TYPE {} ADD VALUE IF NOT EXISTS {}",
        qualified_table(schema, type_name),
        literal(&Value::String(value.to_string()))
    )
}

pub fn create_ledger(schema: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {} TEXT PRIMARY KEY,\n  {} TIMESTAMPTZ NOT NULL DEFAULT NOW()\n)",
        qualified_table(schema, LEDGER_TABLE),
        quoted("id"),
        quoted("applied_at")
    )
}

pub const LEDGER_TABLE: &str = "crm_schema_migrations";
