//! Estate CRM core: entity catalog, soft-delete lifecycle, schema evolution and the REST surface.

pub mod case;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod migration;
pub mod model;
pub mod record;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;

pub use error::{AppError, ConfigError, MigrationError, ModelError};
pub use migration::{bootstrap, prepare, Migration, MigrationReport, Migrator, Step, StepOutcome};
pub use model::{Catalog, EntityDef, EntityKind};
pub use record::{Filter, ListQuery, Record, Visibility};
pub use routes::{app, common_routes, entity_routes};
pub use service::{Lifecycle, RequestValidator};
pub use settings::Settings;
pub use state::AppState;
pub use store::{ensure_database_exists, MemoryStore, PgStore, SchemaOps, Store};
