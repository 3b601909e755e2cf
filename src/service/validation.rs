//! Request validation and coercion against entity declarations.

use crate::case::keys_to_snake_case;
use crate::error::AppError;
use crate::model::{decimal_text, status, EntityDef, FieldDef, FieldType, SYSTEM_COLUMNS};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

pub struct RequestValidator;

impl RequestValidator {
    /// Validate a create body: system keys are dropped, defaults applied, required fields
    /// enforced, values coerced to their column types and statuses canonicalized.
    /// An explicit `null` takes the default just like an absent key.
    pub fn prepare_create(entity: &EntityDef, body: Map<String, Value>) -> Result<Map<String, Value>, AppError> {
        let mut body = strip_system_keys(keys_to_snake_case(body));
        reject_unknown(entity, &body)?;
        for f in &entity.fields {
            let Some(d) = &f.default else { continue };
            if body.get(&f.name).map_or(true, Value::is_null) {
                body.insert(f.name.clone(), d.clone());
            }
        }
        let mut out = Map::with_capacity(body.len());
        for f in &entity.fields {
            let v = body.remove(&f.name).unwrap_or(Value::Null);
            if f.rule.required && v.is_null() {
                return Err(AppError::Validation(format!("{} is required", f.name)));
            }
            let v = coerce(entity, f, v)?;
            validate_rules(f, &v)?;
            if !v.is_null() {
                out.insert(f.name.clone(), v);
            }
        }
        Ok(out)
    }

    /// Validate a partial update: only fields present are checked. A body `id` must match the target.
    pub fn prepare_update(entity: &EntityDef, id: i64, body: Map<String, Value>) -> Result<Map<String, Value>, AppError> {
        let body = keys_to_snake_case(body);
        if let Some(body_id) = body.get("id") {
            if body_id.as_i64() != Some(id) {
                return Err(AppError::Validation("id is immutable".into()));
            }
        }
        let body = strip_system_keys(body);
        reject_unknown(entity, &body)?;
        let mut out = Map::with_capacity(body.len());
        for (k, v) in body {
            let Some(f) = entity.field(&k) else { continue };
            if f.rule.required && v.is_null() {
                return Err(AppError::Validation(format!("{} cannot be cleared", f.name)));
            }
            let v = coerce(entity, f, v)?;
            validate_rules(f, &v)?;
            out.insert(k, v);
        }
        Ok(out)
    }

    /// Coerce a query-string value for an equality filter on `field`.
    /// Statuses are canonicalized, so legacy labels filter the same as their canonical value.
    pub fn filter_value(entity: &EntityDef, field: &FieldDef, raw: &str) -> Result<Value, AppError> {
        if field.ty == FieldType::Json {
            return Err(AppError::Validation(format!("{} cannot be filtered", field.name)));
        }
        coerce(entity, field, Value::String(raw.to_string()))
    }
}

fn strip_system_keys(mut body: Map<String, Value>) -> Map<String, Value> {
    for k in SYSTEM_COLUMNS {
        body.remove(k);
    }
    body
}

fn reject_unknown(entity: &EntityDef, body: &Map<String, Value>) -> Result<(), AppError> {
    match body.keys().find(|k| entity.field(k).is_none()) {
        Some(k) => Err(AppError::Validation(format!("unknown field '{}' for {}", k, entity.kind))),
        None => Ok(()),
    }
}

fn type_error(f: &FieldDef, expected: &str) -> AppError {
    AppError::Validation(format!("{} must be {}", f.name, expected))
}

/// Normalize a value to the JSON shape stored for its column type. Null passes through.
fn coerce(entity: &EntityDef, f: &FieldDef, v: Value) -> Result<Value, AppError> {
    if v.is_null() {
        return Ok(v);
    }
    match &f.ty {
        FieldType::Text => match v {
            Value::String(_) => Ok(v),
            _ => Err(type_error(f, "a string")),
        },
        FieldType::Integer => {
            let n = match &v {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            n.map(Value::from).ok_or_else(|| type_error(f, "an integer"))
        }
        // Exact text. JSON numbers have already been read as f64 by serde_json.
        FieldType::Decimal => {
            let text = match &v {
                Value::Number(n) => decimal_text(&n.to_string()),
                Value::String(s) => decimal_text(s),
                _ => None,
            };
            text.map(Value::String).ok_or_else(|| type_error(f, "a decimal number"))
        }
        FieldType::Date => {
            let s = v.as_str().ok_or_else(|| type_error(f, "a date (YYYY-MM-DD)"))?;
            let d = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| type_error(f, "a date (YYYY-MM-DD)"))?;
            Ok(Value::String(d.format("%Y-%m-%d").to_string()))
        }
        FieldType::Timestamp => {
            let s = v.as_str().ok_or_else(|| type_error(f, "an RFC 3339 timestamp"))?;
            let t = DateTime::parse_from_rfc3339(s.trim()).map_err(|_| type_error(f, "an RFC 3339 timestamp"))?;
            Ok(Value::String(t.with_timezone(&Utc).to_rfc3339()))
        }
        FieldType::Json => Ok(v),
        FieldType::Status => {
            let s = v.as_str().ok_or_else(|| type_error(f, "a string"))?;
            Ok(Value::String(status::canonicalize(entity.kind, s)?.to_string()))
        }
        FieldType::Enum { values, .. } => {
            let s = v.as_str().ok_or_else(|| type_error(f, "a string"))?.trim().to_lowercase();
            if values.iter().any(|a| *a == s) {
                Ok(Value::String(s))
            } else {
                Err(AppError::Validation(format!("{} must be one of: {}", f.name, values.join(", "))))
            }
        }
    }
}

/// Coerced integers are JSON numbers, coerced decimals are exact text.
fn numeric(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => n.as_i64().map(Decimal::from),
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

fn validate_rules(f: &FieldDef, v: &Value) -> Result<(), AppError> {
    if v.is_null() {
        return Ok(());
    }
    let rule = &f.rule;
    let col = &f.name;
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max {
                return Err(AppError::Validation(format!("{} must be at most {} characters", col, max)));
            }
        }
        if let Some(ref pattern) = rule.pattern {
            let re = Regex::new(pattern).map_err(|_| AppError::Validation(format!("invalid pattern for {}", col)))?;
            if !re.is_match(s) {
                return Err(AppError::Validation(format!("{} does not match required pattern", col)));
            }
        }
        if rule.format.as_deref() == Some("email") && (!s.contains('@') || s.len() < 3) {
            return Err(AppError::Validation(format!("{} must be a valid email", col)));
        }
    }
    if let (Some(min), Some(n)) = (rule.minimum, numeric(v)) {
        if n < min {
            return Err(AppError::Validation(format!("{} must be at least {}", col, min)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Catalog, EntityKind};
    use serde_json::json;

    fn def(kind: EntityKind) -> EntityDef {
        Catalog::standard().unwrap().entity(kind).unwrap().clone()
    }

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn create_applies_defaults_and_drops_system_keys() {
        let unit = def(EntityKind::Unit);
        let out = RequestValidator::prepare_create(
            &unit,
            obj(json!({ "id": 99, "projectId": 7, "unitNumber": "U-001", "deletedAt": "2024-01-01T00:00:00Z" })),
        )
        .unwrap();
        assert_eq!(out.get("project_id"), Some(&json!(7)));
        assert_eq!(out.get("status"), Some(&json!("available")));
        assert!(out.get("id").is_none());
        assert!(out.get("deleted_at").is_none());
    }

    #[test]
    fn create_requires_fields() {
        let unit = def(EntityKind::Unit);
        let err = RequestValidator::prepare_create(&unit, obj(json!({ "unitNumber": "U-001" }))).unwrap_err();
        assert_eq!(err.to_string(), "validation: project_id is required");
    }

    #[test]
    fn create_canonicalizes_legacy_status() {
        let client = def(EntityKind::Client);
        let out = RequestValidator::prepare_create(&client, obj(json!({ "name": "Ana", "status": "activo" }))).unwrap();
        assert_eq!(out.get("status"), Some(&json!("active")));
    }

    #[test]
    fn rejects_unknown_fields_and_bad_types() {
        let unit = def(EntityKind::Unit);
        let unknown = RequestValidator::prepare_create(&unit, obj(json!({ "projectId": 1, "unitNumber": "A", "colour": "red" })));
        assert!(matches!(unknown, Err(AppError::Validation(_))));
        let bad = RequestValidator::prepare_create(&unit, obj(json!({ "projectId": "seven", "unitNumber": "A" })));
        assert!(matches!(bad, Err(AppError::Validation(_))));
        let pattern = RequestValidator::prepare_create(&unit, obj(json!({ "projectId": 1, "unitNumber": "U 001" })));
        assert!(matches!(pattern, Err(AppError::Validation(_))));
    }

    #[test]
    fn coerces_dates_decimals_and_enums() {
        let sale = def(EntityKind::Sale);
        let out = RequestValidator::prepare_create(
            &sale,
            obj(json!({ "unitId": 1, "clientId": "2", "amount": "125000.50", "closedOn": "2024-03-09" })),
        )
        .unwrap();
        assert_eq!(out.get("client_id"), Some(&json!(2)));
        assert_eq!(out.get("amount"), Some(&json!("125000.5")));
        assert_eq!(out.get("closed_on"), Some(&json!("2024-03-09")));

        let task = def(EntityKind::Task);
        let err = RequestValidator::prepare_create(&task, obj(json!({ "title": "Call", "priority": "someday" })));
        assert!(err.is_err());
    }

    #[test]
    fn update_rejects_identity_change_and_ignores_timestamps() {
        let unit = def(EntityKind::Unit);
        let err = RequestValidator::prepare_update(&unit, 4, obj(json!({ "id": 5, "status": "sold" }))).unwrap_err();
        assert_eq!(err.to_string(), "validation: id is immutable");
        let out = RequestValidator::prepare_update(
            &unit,
            4,
            obj(json!({ "id": 4, "status": "vendido", "updatedAt": "2020-01-01T00:00:00Z" })),
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.get("status"), Some(&json!("sold")));
    }

    #[test]
    fn update_cannot_clear_required_field() {
        let unit = def(EntityKind::Unit);
        let err = RequestValidator::prepare_update(&unit, 1, obj(json!({ "unitNumber": null })));
        assert!(matches!(err, Err(AppError::Validation(_))));
    }

    #[test]
    fn large_amounts_keep_every_digit() {
        let sale = def(EntityKind::Sale);
        let out = RequestValidator::prepare_create(
            &sale,
            obj(json!({ "unitId": 1, "clientId": 2, "amount": "12345678901234567.89" })),
        )
        .unwrap();
        assert_eq!(out.get("amount"), Some(&json!("12345678901234567.89")));
        let bad = RequestValidator::prepare_create(&sale, obj(json!({ "unitId": 1, "clientId": 2, "amount": "12,5" })));
        assert!(matches!(bad, Err(AppError::Validation(_))));
    }

    #[test]
    fn explicit_null_takes_the_default() {
        let client = def(EntityKind::Client);
        let out = RequestValidator::prepare_create(&client, obj(json!({ "name": "Ana", "status": null }))).unwrap();
        assert_eq!(out.get("status"), Some(&json!("prospect")));
    }

    #[test]
    fn negative_amount_is_rejected() {
        let sale = def(EntityKind::Sale);
        let err = RequestValidator::prepare_create(&sale, obj(json!({ "unitId": 1, "clientId": 2, "amount": -1 })));
        assert_eq!(err.unwrap_err().to_string(), "validation: amount must be at least 0");
        let err = RequestValidator::prepare_create(&sale, obj(json!({ "unitId": 1, "clientId": 2, "amount": "-0.01" })));
        assert!(matches!(err, Err(AppError::Validation(_))));
    }
}
