//! The CRM's migration history.
//!
//! Column shapes are read from the catalog (fields tagged with `added_in`), so the
//! declared model and the migration that introduces a column cannot drift apart.

use crate::migration::{Migration, Step};
use crate::model::{status, Catalog};
use crate::store::ColumnSpec;

pub const UNIT_AREA: &str = "0001_unit_area";
pub const CLIENT_TAGS: &str = "0002_client_tags";
pub const TASK_PRIORITY: &str = "0003_task_priority";
pub const TASK_PRIORITY_URGENT: &str = "0004_task_priority_urgent";
pub const NORMALIZE_STATUS: &str = "0005_normalize_status";

/// AddColumn steps for every catalog field introduced by `migration_id`.
fn columns_added_in(catalog: &Catalog, migration_id: &str) -> Vec<Step> {
    catalog
        .entities()
        .iter()
        .flat_map(|e| {
            e.fields
                .iter()
                .filter(move |f| f.added_in == Some(migration_id))
                .map(move |f| Step::AddColumn {
                    table: e.table().to_string(),
                    column: ColumnSpec {
                        name: f.name.clone(),
                        ty: f.ty.clone(),
                        default: f.default.clone(),
                    },
                })
        })
        .collect()
}

/// One backfill per status column. Canonical values are included so differently-cased
/// canonical labels are folded too.
fn normalize_statuses(catalog: &Catalog) -> Vec<Step> {
    catalog
        .entities()
        .iter()
        .filter(|e| e.status_field().is_some())
        .map(|e| {
            let mut aliases: Vec<(String, String)> = status::aliases_for(e.kind)
                .into_iter()
                .map(|(legacy, canonical)| (legacy.to_string(), canonical.to_string()))
                .collect();
            aliases.extend(
                status::vocabulary(e.kind)
                    .iter()
                    .map(|v| (v.to_string(), v.to_string())),
            );
            Step::NormalizeStatus {
                table: e.table().to_string(),
                column: "status".to_string(),
                aliases,
            }
        })
        .collect()
}

pub fn migrations(catalog: &Catalog) -> Vec<Migration> {
    let mut priority = vec![Step::CreateEnum {
        type_name: "task_priority".into(),
        values: ["low", "medium", "high"].map(String::from).to_vec(),
    }];
    priority.extend(columns_added_in(catalog, TASK_PRIORITY));

    vec![
        Migration::new(UNIT_AREA, "units.area_m2", columns_added_in(catalog, UNIT_AREA)),
        Migration::new(CLIENT_TAGS, "clients.tags", columns_added_in(catalog, CLIENT_TAGS)),
        Migration::new(TASK_PRIORITY, "task_priority type and tasks.priority", priority),
        Migration::new(
            TASK_PRIORITY_URGENT,
            "task_priority gains 'urgent'",
            vec![Step::AddEnumValue {
                type_name: "task_priority".into(),
                value: "urgent".into(),
            }],
        ),
        Migration::new(
            NORMALIZE_STATUS,
            "legacy status labels to canonical English",
            normalize_statuses(catalog),
        ),
    ]
}
