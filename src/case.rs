//! Key casing between the API (camelCase) and storage (snake_case).

use serde_json::{Map, Value};

/// "unit_number" -> "unitNumber", "deleted_at" -> "deletedAt"
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper = false;
    for c in s.chars() {
        match c {
            '_' => upper = true,
            c if upper => {
                out.extend(c.to_uppercase());
                upper = false;
            }
            c => out.push(c),
        }
    }
    out
}

/// "unitNumber" -> "unit_number". Already snake_case input is returned unchanged.
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        if c.is_uppercase() {
            if !out.is_empty() {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Rekey a request body to snake_case column names. Clients may send either casing.
pub fn keys_to_snake_case(obj: Map<String, Value>) -> Map<String, Value> {
    obj.into_iter().map(|(k, v)| (to_snake_case(&k), v)).collect()
}
