//! PostgreSQL store. All tables, enum types and the migration ledger live in one schema.

use crate::error::AppError;
use crate::error::ConfigError;
use crate::model::{decimal_text, EntityDef, FieldType};
use crate::record::{ListQuery, Record, Visibility};
use crate::sql::{self, ddl, QueryBuf};
use crate::store::{ColumnSpec, SchemaOps, Store};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{ConnectOptions, PgPool, Row};
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
    schema: String,
}

impl PgStore {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgStore {
            pool,
            schema: schema.into(),
        }
    }

    pub async fn connect(database_url: &str, max_connections: u32, schema: &str) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool, schema))
    }

    async fn fetch_one(&self, entity: &EntityDef, q: QueryBuf) -> Result<Option<Record>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = p.bind(query);
        }
        let row = query.fetch_optional(&self.pool).await.map_err(AppError::from_db)?;
        row.map(|r| decode_record(entity, &r)).transpose()
    }

    async fn fetch_many(&self, entity: &EntityDef, q: QueryBuf) -> Result<Vec<Record>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = p.bind(query);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(AppError::from_db)?;
        rows.iter().map(|r| decode_record(entity, r)).collect()
    }

    async fn execute(&self, sql: &str) -> Result<(), AppError> {
        tracing::debug!(sql = %sql, "ddl");
        sqlx::query(sql).execute(&self.pool).await.map_err(AppError::from_db)?;
        Ok(())
    }
}

/// Decode a row by the declared column types (see the casts in the SELECT list).
fn decode_record(entity: &EntityDef, row: &PgRow) -> Result<Record, AppError> {
    let mut fields = Map::new();
    for f in &entity.fields {
        let name = f.name.as_str();
        let v = match f.ty {
            FieldType::Text | FieldType::Status | FieldType::Enum { .. } => {
                row.try_get::<Option<String>, _>(name)?.map(Value::String)
            }
            FieldType::Integer => row.try_get::<Option<i64>, _>(name)?.map(Value::from),
            FieldType::Decimal => row
                .try_get::<Option<String>, _>(name)?
                .map(|s| Value::String(decimal_text(&s).unwrap_or(s))),
            FieldType::Date => row
                .try_get::<Option<NaiveDate>, _>(name)?
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
            FieldType::Timestamp => row
                .try_get::<Option<DateTime<Utc>>, _>(name)?
                .map(|t| Value::String(t.to_rfc3339())),
            FieldType::Json => row.try_get::<Option<Value>, _>(name)?,
        };
        if let Some(v) = v {
            fields.insert(f.name.clone(), v);
        }
    }
    Ok(Record {
        id: row.try_get("id")?,
        fields,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
        deleted_by: row.try_get("deleted_by")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn insert(&self, entity: &EntityDef, fields: Map<String, Value>) -> Result<Record, AppError> {
        let q = sql::insert(entity, &self.schema, &fields);
        self.fetch_one(entity, q)
            .await?
            .ok_or(AppError::Storage(sqlx::Error::RowNotFound))
    }

    async fn fetch(&self, entity: &EntityDef, id: i64, visibility: Visibility) -> Result<Option<Record>, AppError> {
        self.fetch_one(entity, sql::select_by_id(entity, &self.schema, id, visibility)).await
    }

    async fn list(&self, entity: &EntityDef, query: &ListQuery) -> Result<Vec<Record>, AppError> {
        self.fetch_many(entity, sql::select_list(entity, &self.schema, query)).await
    }

    async fn update(&self, entity: &EntityDef, id: i64, changes: Map<String, Value>) -> Result<Option<Record>, AppError> {
        self.fetch_one(entity, sql::update(entity, &self.schema, id, &changes)).await
    }

    async fn mark_deleted(&self, entity: &EntityDef, id: i64, actor: Option<i64>) -> Result<Option<Record>, AppError> {
        self.fetch_one(entity, sql::soft_delete(entity, &self.schema, id, actor)).await
    }

    async fn clear_deleted(&self, entity: &EntityDef, id: i64) -> Result<Option<Record>, AppError> {
        self.fetch_one(entity, sql::restore(entity, &self.schema, id)).await
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl SchemaOps for PgStore {
    async fn ensure_ledger(&self) -> Result<(), AppError> {
        self.execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", sql::quoted(&self.schema)))
            .await?;
        self.execute(&ddl::create_ledger(&self.schema)).await
    }

    async fn applied_migrations(&self) -> Result<Vec<String>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT {} FROM {} ORDER BY {}, {}",
            sql::quoted("id"),
            sql::qualified_table(&self.schema, ddl::LEDGER_TABLE),
            sql::quoted("applied_at"),
            sql::quoted("id")
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn record_migration(&self, id: &str) -> Result<(), AppError> {
        sqlx::query(&format!(
            "INSERT INTO {} ({}) VALUES ($1)",
            sql::qualified_table(&self.schema, ddl::LEDGER_TABLE),
            sql::quoted("id")
        ))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(AppError::from_db)?;
        Ok(())
    }

    async fn forget_migration(&self, id: &str) -> Result<(), AppError> {
        sqlx::query(&format!(
            "DELETE FROM {} WHERE {} = $1",
            sql::qualified_table(&self.schema, ddl::LEDGER_TABLE),
            sql::quoted("id")
        ))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, AppError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2)",
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create_table(&self, entity: &EntityDef) -> Result<(), AppError> {
        self.execute(&ddl::create_table(entity, &self.schema)).await?;
        self.execute(&ddl::create_active_index(entity, &self.schema)).await
    }

    async fn column_exists(&self, table: &str, column: &str) -> Result<bool, AppError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM information_schema.columns WHERE table_schema = $1 AND table_name = $2 AND column_name = $3)",
        )
        .bind(&self.schema)
        .bind(table)
        .bind(column)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn add_column(&self, table: &str, column: &ColumnSpec) -> Result<(), AppError> {
        self.execute(&ddl::add_column(
            &self.schema,
            table,
            &column.name,
            &column.ty,
            column.default.as_ref(),
        ))
        .await
    }

    async fn drop_column(&self, table: &str, column: &str) -> Result<(), AppError> {
        self.execute(&ddl::drop_column(&self.schema, table, column)).await
    }

    async fn enum_values(&self, type_name: &str) -> Result<Option<Vec<String>>, AppError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM pg_type t JOIN pg_namespace n ON n.oid = t.typnamespace \
             WHERE n.nspname = $1 AND t.typname = $2 AND t.typtype = 'e')",
        )
        .bind(&self.schema)
        .bind(type_name)
        .fetch_one(&self.pool)
        .await?;
        if !exists {
            return Ok(None);
        }
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT e.enumlabel FROM pg_enum e \
             JOIN pg_type t ON t.oid = e.enumtypid \
             JOIN pg_namespace n ON n.oid = t.typnamespace \
             WHERE n.nspname = $1 AND t.typname = $2 ORDER BY e.enumsortorder",
        )
        .bind(&self.schema)
        .bind(type_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(Some(rows.into_iter().map(|(v,)| v).collect()))
    }

    async fn create_enum(&self, type_name: &str, values: &[String]) -> Result<(), AppError> {
        self.execute(&ddl::create_enum(&self.schema, type_name, values)).await
    }

    async fn drop_enum(&self, type_name: &str) -> Result<(), AppError> {
        self.execute(&ddl::drop_enum(&self.schema, type_name)).await
    }

    async fn add_enum_value(&self, type_name: &str, value: &str) -> Result<(), AppError> {
        self.execute(&ddl::add_enum_value(&self.schema, type_name, value)).await
    }

    async fn rewrite_values(&self, table: &str, column: &str, from: &str, to: &str) -> Result<u64, AppError> {
        let col = sql::quoted(column);
        let done = sqlx::query(&format!(
            "UPDATE {} SET {} = $1 WHERE lower(btrim({})) = $2 AND {} <> $1",
            sql::qualified_table(&self.schema, table),
            col,
            col,
            col
        ))
        .bind(to)
        .bind(from)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected())
    }
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = split_database_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url).map_err(|_| invalid_url(database_url))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", sql::quoted(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn invalid_url(url: &str) -> AppError {
    ConfigError::InvalidValue {
        var: "DATABASE_URL",
        value: url.to_string(),
    }
    .into()
}

/// Split `postgres://host/db?opts` into the admin URL (same server, `postgres` database) and `db`.
fn split_database_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url.rfind('/').ok_or_else(|| invalid_url(url))? + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let mut parts = path_and_query.splitn(2, '?');
    let db_name = parts.next().unwrap_or("").trim().to_string();
    let query = parts.next().map(|q| format!("?{}", q)).unwrap_or_default();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres{}", base, query), db_name))
}
