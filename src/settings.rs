//! Process settings read from the environment (after `.env` has been loaded).

use crate::error::ConfigError;
use std::net::SocketAddr;
use std::str::FromStr;

pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost/estate_crm";
pub const DEFAULT_SCHEMA: &str = "crm";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub schema: String,
    pub listen_addr: SocketAddr,
    pub max_connections: u32,
    pub body_limit_bytes: usize,
}

impl Settings {
    /// Load `.env` if present, then read the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "could not read .env");
            }
        }
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build settings from any key lookup; unset or blank keys take their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let schema = get("CRM_SCHEMA").unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
        if !is_plain_identifier(&schema) {
            return Err(ConfigError::InvalidSchema(schema));
        }
        Ok(Settings {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            schema,
            listen_addr: parse_or("LISTEN_ADDR", get("LISTEN_ADDR"), DEFAULT_LISTEN_ADDR)?,
            max_connections: parse_or("DB_MAX_CONNECTIONS", get("DB_MAX_CONNECTIONS"), DEFAULT_MAX_CONNECTIONS)?,
            body_limit_bytes: parse_or("BODY_LIMIT_BYTES", get("BODY_LIMIT_BYTES"), DEFAULT_BODY_LIMIT)?,
        })
    }
}

fn parse_or<T, D>(var: &'static str, raw: Option<String>, default: D) -> Result<T, ConfigError>
where
    T: FromStr,
    D: ToString,
{
    let value = raw.unwrap_or_else(|| default.to_string());
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue { var, value })
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(s.schema, "crm");
        assert_eq!(s.listen_addr.port(), 3000);
        assert_eq!(s.max_connections, 5);
        assert_eq!(s.body_limit_bytes, 1024 * 1024);
    }

    #[test]
    fn explicit_values_win() {
        let s = settings(&[("CRM_SCHEMA", "crm_test"), ("DB_MAX_CONNECTIONS", "12"), ("LISTEN_ADDR", "127.0.0.1:8080")]).unwrap();
        assert_eq!(s.schema, "crm_test");
        assert_eq!(s.max_connections, 12);
        assert_eq!(s.listen_addr.to_string(), "127.0.0.1:8080");
    }

    #[rstest]
    #[case("DB_MAX_CONNECTIONS", "many")]
    #[case("BODY_LIMIT_BYTES", "-1")]
    #[case("LISTEN_ADDR", "localhost")]
    fn malformed_numbers_are_config_errors(#[case] var: &str, #[case] value: &str) {
        let err = settings(&[(var, value)]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: v, .. } if v == var));
    }

    #[rstest]
    #[case("Crm")]
    #[case("crm; drop")]
    #[case("1crm")]
    fn schema_must_be_a_plain_identifier(#[case] schema: &str) {
        assert!(matches!(settings(&[("CRM_SCHEMA", schema)]), Err(ConfigError::InvalidSchema(_))));
    }
}
