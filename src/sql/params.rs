//! Bind values for PostgreSQL queries.
//!
//! Domain values are bound as text and cast in SQL (`$3::numeric`, `$4::jsonb`), so one
//! Rust type covers every column type, enums included.

use serde_json::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;

#[derive(Clone, Debug, PartialEq)]
pub enum SqlParam {
    BigInt(i64),
    OptBigInt(Option<i64>),
    Text(Option<String>),
}

impl SqlParam {
    /// Text form of a stored JSON value. Null binds as SQL NULL; arrays and objects as JSON text.
    pub fn from_json(v: &Value) -> Self {
        SqlParam::Text(match v {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Array(_) | Value::Object(_) => Some(v.to_string()),
        })
    }

    pub fn bind<'q>(&'q self, query: Query<'q, Postgres, PgArguments>) -> Query<'q, Postgres, PgArguments> {
        match self {
            SqlParam::BigInt(n) => query.bind(*n),
            SqlParam::OptBigInt(n) => query.bind(*n),
            SqlParam::Text(s) => query.bind(s.as_deref()),
        }
    }
}

/// Escape LIKE metacharacters and wrap for a substring match.
pub fn contains_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
