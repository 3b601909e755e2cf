//! Stored records and list queries.

use crate::case::to_camel_case;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// One persisted row: system columns plus domain fields keyed by snake_case column name.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub id: i64,
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Weak reference to the acting user. May dangle.
    pub deleted_by: Option<i64>,
}

impl Record {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// API representation: camelCase keys, RFC 3339 timestamps.
    pub fn to_api_json(&self) -> Value {
        let mut out = Map::with_capacity(self.fields.len() + 5);
        out.insert("id".into(), Value::from(self.id));
        for (k, v) in &self.fields {
            out.insert(to_camel_case(k), v.clone());
        }
        out.insert("createdAt".into(), Value::String(self.created_at.to_rfc3339()));
        out.insert("updatedAt".into(), Value::String(self.updated_at.to_rfc3339()));
        out.insert(
            "deletedAt".into(),
            self.deleted_at.map(|d| Value::String(d.to_rfc3339())).unwrap_or(Value::Null),
        );
        out.insert("deletedBy".into(), self.deleted_by.map(Value::from).unwrap_or(Value::Null));
        Value::Object(out)
    }
}

/// Which side of the active/archived partition a read sees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Active,
    Archived,
    All,
}

impl Visibility {
    pub fn admits(self, record: &Record) -> bool {
        match self {
            Visibility::Active => record.is_active(),
            Visibility::Archived => !record.is_active(),
            Visibility::All => true,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Visibility::Active),
            "archived" => Some(Visibility::Archived),
            "all" => Some(Visibility::All),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// Exact match on a column.
    Eq(String, Value),
    /// Case-insensitive substring match on a text column.
    Contains(String, String),
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _) | Filter::Contains(c, _) => c,
        }
    }
}

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListQuery {
    pub visibility: Visibility,
    pub filters: Vec<Filter>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListQuery {
    pub fn active() -> Self {
        Self::default()
    }

    pub fn with_visibility(visibility: Visibility) -> Self {
        ListQuery {
            visibility,
            ..Self::default()
        }
    }

    pub fn filter(mut self, f: Filter) -> Self {
        self.filters.push(f);
        self
    }

    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(deleted: bool) -> Record {
        let now = Utc::now();
        let mut fields = Map::new();
        fields.insert("unit_number".into(), json!("U-001"));
        Record {
            id: 1,
            fields,
            created_at: now,
            updated_at: now,
            deleted_at: deleted.then_some(now),
            deleted_by: deleted.then_some(3),
        }
    }

    #[test]
    fn api_json_uses_camel_case_and_nulls() {
        let v = record(false).to_api_json();
        assert_eq!(v["unitNumber"], json!("U-001"));
        assert_eq!(v["deletedAt"], Value::Null);
        assert_eq!(v["deletedBy"], Value::Null);
        assert!(v.get("unit_number").is_none());
    }

    #[test]
    fn visibility_partitions_records() {
        let live = record(false);
        let gone = record(true);
        assert!(Visibility::Active.admits(&live) && !Visibility::Active.admits(&gone));
        assert!(Visibility::Archived.admits(&gone) && !Visibility::Archived.admits(&live));
        assert!(Visibility::All.admits(&live) && Visibility::All.admits(&gone));
    }

    #[test]
    fn limit_is_capped() {
        let mut q = ListQuery::active();
        assert_eq!(q.effective_limit(), DEFAULT_LIMIT);
        q.limit = Some(5000);
        assert_eq!(q.effective_limit(), MAX_LIMIT);
    }
}
