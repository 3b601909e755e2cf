//! Schema bootstrap and additive, ordered migrations.
//!
//! Bootstrap creates every entity table with its base fields. Later shape changes are
//! [`Migration`]s made of idempotent [`Step`]s: each step inspects the live structure
//! first and reports [`StepOutcome::Skipped`] when there is nothing to do. Applied ids are
//! kept in a ledger table so `up` only runs what is pending.

pub mod builtin;

use crate::error::{AppError, MigrationError};
use crate::model::{Catalog, FieldType};
use crate::store::{ColumnSpec, SchemaOps};
use std::collections::HashSet;

#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    CreateEnum { type_name: String, values: Vec<String> },
    AddEnumValue { type_name: String, value: String },
    AddColumn { table: String, column: ColumnSpec },
    /// Rewrite legacy labels (lowercase) to canonical values.
    NormalizeStatus {
        table: String,
        column: String,
        aliases: Vec<(String, String)>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    /// The structure was already in the target shape.
    Skipped,
    /// Down direction of a step that cannot be undone without losing data. Nothing is changed.
    Irreversible,
}

impl Step {
    pub async fn up(&self, ops: &dyn SchemaOps) -> Result<StepOutcome, AppError> {
        match self {
            Step::CreateEnum { type_name, values } => {
                if ops.enum_values(type_name).await?.is_some() {
                    return Ok(StepOutcome::Skipped);
                }
                ops.create_enum(type_name, values).await?;
                Ok(StepOutcome::Applied)
            }
            Step::AddEnumValue { type_name, value } => {
                let existing = ops.enum_values(type_name).await?.ok_or_else(|| {
                    AppError::Storage(sqlx::Error::TypeNotFound {
                        type_name: type_name.clone(),
                    })
                })?;
                if existing.iter().any(|v| v == value) {
                    return Ok(StepOutcome::Skipped);
                }
                ops.add_enum_value(type_name, value).await?;
                Ok(StepOutcome::Applied)
            }
            Step::AddColumn { table, column } => {
                if ops.column_exists(table, &column.name).await? {
                    return Ok(StepOutcome::Skipped);
                }
                ops.add_column(table, column).await?;
                Ok(StepOutcome::Applied)
            }
            Step::NormalizeStatus { table, column, aliases } => {
                let mut changed = 0;
                for (legacy, canonical) in aliases {
                    changed += ops.rewrite_values(table, column, legacy, canonical).await?;
                }
                tracing::info!(table = %table, column = %column, rows = changed, "status values normalized");
                Ok(if changed > 0 {
                    StepOutcome::Applied
                } else {
                    StepOutcome::Skipped
                })
            }
        }
    }

    pub async fn down(&self, ops: &dyn SchemaOps) -> Result<StepOutcome, AppError> {
        match self {
            Step::AddColumn { table, column } => {
                if !ops.column_exists(table, &column.name).await? {
                    return Ok(StepOutcome::Skipped);
                }
                ops.drop_column(table, &column.name).await?;
                Ok(StepOutcome::Applied)
            }
            Step::CreateEnum { type_name, .. } => {
                if ops.enum_values(type_name).await?.is_none() {
                    return Ok(StepOutcome::Skipped);
                }
                ops.drop_enum(type_name).await?;
                Ok(StepOutcome::Applied)
            }
            Step::AddEnumValue { .. } | Step::NormalizeStatus { .. } => Ok(StepOutcome::Irreversible),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Migration {
    pub id: String,
    pub description: String,
    pub steps: Vec<Step>,
}

impl Migration {
    pub fn new(id: &str, description: &str, steps: Vec<Step>) -> Self {
        Migration {
            id: id.to_string(),
            description: description.to_string(),
            steps,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReportEntry {
    pub id: String,
    pub direction: Direction,
    pub outcomes: Vec<StepOutcome>,
}

/// What a run of the migrator did, in execution order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MigrationReport {
    pub entries: Vec<ReportEntry>,
}

impl MigrationReport {
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct Migrator {
    migrations: Vec<Migration>,
}

impl Migrator {
    pub fn new(migrations: Vec<Migration>) -> Result<Self, MigrationError> {
        let mut seen = HashSet::new();
        for m in &migrations {
            if !seen.insert(m.id.as_str()) {
                return Err(MigrationError::DuplicateId(m.id.clone()));
            }
        }
        Ok(Migrator { migrations })
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Ids not yet recorded in the ledger, in declaration order.
    pub async fn pending(&self, ops: &dyn SchemaOps) -> Result<Vec<&str>, AppError> {
        let applied: HashSet<String> = ops.applied_migrations().await?.into_iter().collect();
        Ok(self
            .migrations
            .iter()
            .filter(|m| !applied.contains(&m.id))
            .map(|m| m.id.as_str())
            .collect())
    }

    /// Apply every pending migration in order and record it in the ledger.
    pub async fn up(&self, ops: &dyn SchemaOps) -> Result<MigrationReport, AppError> {
        ops.ensure_ledger().await?;
        let applied: HashSet<String> = ops.applied_migrations().await?.into_iter().collect();
        let mut report = MigrationReport::default();
        for m in self.migrations.iter().filter(|m| !applied.contains(&m.id)) {
            let mut outcomes = Vec::with_capacity(m.steps.len());
            for (i, step) in m.steps.iter().enumerate() {
                let outcome = step.up(ops).await.map_err(|e| MigrationError::Step {
                    id: m.id.clone(),
                    step: i + 1,
                    source: Box::new(e),
                })?;
                outcomes.push(outcome);
            }
            ops.record_migration(&m.id).await?;
            tracing::info!(migration = %m.id, description = %m.description, ?outcomes, "migration applied");
            report.entries.push(ReportEntry {
                id: m.id.clone(),
                direction: Direction::Up,
                outcomes,
            });
        }
        Ok(report)
    }

    /// Revert applied migrations declared after `target`, newest first. `None` reverts all.
    pub async fn down_to(&self, ops: &dyn SchemaOps, target: Option<&str>) -> Result<MigrationReport, AppError> {
        let keep = match target {
            Some(t) => {
                self.migrations
                    .iter()
                    .position(|m| m.id == t)
                    .ok_or_else(|| MigrationError::UnknownTarget(t.to_string()))?
                    + 1
            }
            None => 0,
        };
        let applied: HashSet<String> = ops.applied_migrations().await?.into_iter().collect();
        let mut report = MigrationReport::default();
        for m in self.migrations[keep..].iter().rev().filter(|m| applied.contains(&m.id)) {
            let mut outcomes = Vec::with_capacity(m.steps.len());
            for (i, step) in m.steps.iter().enumerate().rev() {
                let outcome = step.down(ops).await.map_err(|e| MigrationError::Step {
                    id: m.id.clone(),
                    step: i + 1,
                    source: Box::new(e),
                })?;
                if outcome == StepOutcome::Irreversible {
                    tracing::warn!(migration = %m.id, step = i + 1, "step is irreversible, left in place");
                }
                outcomes.push(outcome);
            }
            ops.forget_migration(&m.id).await?;
            tracing::info!(migration = %m.id, "migration reverted");
            report.entries.push(ReportEntry {
                id: m.id.clone(),
                direction: Direction::Down,
                outcomes,
            });
        }
        Ok(report)
    }
}

/// Create the ledger, the enum types base fields need, and every entity table.
pub async fn bootstrap(ops: &dyn SchemaOps, catalog: &Catalog) -> Result<(), AppError> {
    ops.ensure_ledger().await?;
    for entity in catalog.entities() {
        for f in entity.base_fields() {
            if let FieldType::Enum { type_name, values } = &f.ty {
                if ops.enum_values(type_name).await?.is_none() {
                    ops.create_enum(type_name, values).await?;
                }
            }
        }
    }
    for entity in catalog.entities() {
        if !ops.table_exists(entity.table()).await? {
            tracing::info!(table = entity.table(), "creating table");
            ops.create_table(entity).await?;
        }
    }
    Ok(())
}

/// Bootstrap, then apply the built-in migrations. Safe to run on every start.
pub async fn prepare(ops: &dyn SchemaOps, catalog: &Catalog) -> Result<MigrationReport, AppError> {
    bootstrap(ops, catalog).await?;
    Migrator::new(builtin::migrations(catalog))?.up(ops).await
}
