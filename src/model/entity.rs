//! Entity declarations: kinds, field types, defaults, validation rules, and allowed operations.

use rust_decimal::Decimal;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Every persisted record kind. Each kind maps 1:1 to a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Client,
    Project,
    Sale,
    Task,
    Unit,
    Note,
    Reminder,
    Backup,
    User,
}

impl EntityKind {
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Client,
        EntityKind::Project,
        EntityKind::Sale,
        EntityKind::Task,
        EntityKind::Unit,
        EntityKind::Note,
        EntityKind::Reminder,
        EntityKind::Backup,
        EntityKind::User,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Client => "client",
            EntityKind::Project => "project",
            EntityKind::Sale => "sale",
            EntityKind::Task => "task",
            EntityKind::Unit => "unit",
            EntityKind::Note => "note",
            EntityKind::Reminder => "reminder",
            EntityKind::Backup => "backup",
            EntityKind::User => "user",
        }
    }

    /// Table name, also used as the URL path segment.
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Client => "clients",
            EntityKind::Project => "projects",
            EntityKind::Sale => "sales",
            EntityKind::Task => "tasks",
            EntityKind::Unit => "units",
            EntityKind::Note => "notes",
            EntityKind::Reminder => "reminders",
            EntityKind::Backup => "backups",
            EntityKind::User => "users",
        }
    }

    pub fn from_path(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.table() == segment)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldType {
    Text,
    Integer,
    Decimal,
    Date,
    Timestamp,
    /// Free-form tagged JSON.
    Json,
    /// Text constrained to the entity's canonical status vocabulary.
    Status,
    /// Database enum type living in the CRM schema.
    Enum { type_name: String, values: Vec<String> },
}

impl FieldType {
    /// PostgreSQL type for DDL and parameter casts. Enum types are qualified with `schema`.
    pub fn pg_type(&self, schema: &str) -> String {
        match self {
            FieldType::Text | FieldType::Status => "text".into(),
            FieldType::Integer => "bigint".into(),
            FieldType::Decimal => "numeric".into(),
            FieldType::Date => "date".into(),
            FieldType::Timestamp => "timestamptz".into(),
            FieldType::Json => "jsonb".into(),
            FieldType::Enum { type_name, .. } => format!("\"{}\".\"{}\"", schema, type_name),
        }
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, FieldType::Text | FieldType::Status | FieldType::Enum { .. })
    }
}

/// Per-field constraints checked on create and update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationRule {
    pub required: bool,
    /// Only "email" is recognised.
    pub format: Option<String>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    pub minimum: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
    pub rule: ValidationRule,
    pub default: Option<Value>,
    /// Id of the migration that adds this column; `None` for columns present from the first release.
    pub added_in: Option<&'static str>,
}

impl FieldDef {
    pub fn new(name: &str, ty: FieldType) -> Self {
        FieldDef {
            name: name.to_string(),
            ty,
            rule: ValidationRule::default(),
            default: None,
            added_in: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.rule.required = true;
        self
    }

    pub fn default_value(mut self, v: Value) -> Self {
        self.default = Some(v);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.rule.max_length = Some(n);
        self
    }

    pub fn pattern(mut self, re: &str) -> Self {
        self.rule.pattern = Some(re.to_string());
        self
    }

    pub fn email(mut self) -> Self {
        self.rule.format = Some("email".into());
        self
    }

    pub fn non_negative(mut self) -> Self {
        self.rule.minimum = Some(Decimal::ZERO);
        self
    }

    pub fn added_in(mut self, migration_id: &'static str) -> Self {
        self.added_in = Some(migration_id);
        self
    }
}

/// Exact text of a decimal: no exponent, no trailing fractional zeros.
/// Both stores hand decimals out in this form.
pub fn decimal_text(raw: &str) -> Option<String> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
        .map(|d| d.normalize().to_string())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
    Restore,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Read,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
        Operation::Restore,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Restore => "restore",
        }
    }
}

/// System columns appended to every table.
pub const SYSTEM_COLUMNS: [&str; 5] = ["id", "created_at", "updated_at", "deleted_at", "deleted_by"];

#[derive(Clone, Debug)]
pub struct EntityDef {
    pub kind: EntityKind,
    pub fields: Vec<FieldDef>,
    /// Field names carrying a unique constraint (archived rows included).
    pub unique: Vec<String>,
    pub operations: Vec<Operation>,
}

impl EntityDef {
    pub fn new(kind: EntityKind, fields: Vec<FieldDef>) -> Self {
        EntityDef {
            kind,
            fields,
            unique: Vec::new(),
            operations: Operation::ALL.to_vec(),
        }
    }

    pub fn unique(mut self, field: &str) -> Self {
        self.unique.push(field.to_string());
        self
    }

    pub fn operations(mut self, ops: &[Operation]) -> Self {
        self.operations = ops.to_vec();
        self
    }

    pub fn table(&self) -> &'static str {
        self.kind.table()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn allows(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }

    /// Soft-deletable entities allow both delete and restore.
    pub fn soft_delete(&self) -> bool {
        self.allows(Operation::Delete) && self.allows(Operation::Restore)
    }

    /// Fields present in the table as first created, before any migration.
    pub fn base_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.added_in.is_none())
    }

    pub fn status_field(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.ty == FieldType::Status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segments_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_path(kind.table()), Some(kind));
        }
        assert_eq!(EntityKind::from_path("widgets"), None);
    }

    #[test]
    fn enum_pg_type_is_schema_qualified() {
        let ty = FieldType::Enum {
            type_name: "task_priority".into(),
            values: vec!["low".into()],
        };
        assert_eq!(ty.pg_type("crm"), "\"crm\".\"task_priority\"");
        assert_eq!(FieldType::Decimal.pg_type("crm"), "numeric");
    }

    #[test]
    fn decimal_text_is_exact() {
        assert_eq!(decimal_text("12345678901234567.89").as_deref(), Some("12345678901234567.89"));
        assert_eq!(decimal_text(" 125000.50 ").as_deref(), Some("125000.5"));
        assert_eq!(decimal_text("1.5e3").as_deref(), Some("1500"));
        assert_eq!(decimal_text("lots"), None);
    }

    #[test]
    fn base_fields_skip_migrated_columns() {
        let def = EntityDef::new(
            EntityKind::Unit,
            vec![
                FieldDef::new("unit_number", FieldType::Text),
                FieldDef::new("area_m2", FieldType::Decimal).added_in("0001_unit_area"),
            ],
        );
        let names: Vec<_> = def.base_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["unit_number"]);
    }
}
