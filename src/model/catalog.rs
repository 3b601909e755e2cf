//! The catalog: validated entity declarations plus the relationship table, built once at startup.

use crate::error::ModelError;
use crate::model::entity::{EntityDef, EntityKind, FieldDef, FieldType, Operation, SYSTEM_COLUMNS};
use crate::model::relation::RelationTable;
use serde_json::json;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug)]
pub struct Catalog {
    entities: Vec<EntityDef>,
    by_kind: HashMap<EntityKind, usize>,
    relations: RelationTable,
}

impl Catalog {
    /// Validate declarations: unique kinds, unique non-reserved field names, and relations
    /// whose columns and targets are declared.
    pub fn new(entities: Vec<EntityDef>, relations: RelationTable) -> Result<Self, ModelError> {
        let mut by_kind = HashMap::new();
        for (i, def) in entities.iter().enumerate() {
            if by_kind.insert(def.kind, i).is_some() {
                return Err(ModelError::DuplicateEntity(def.kind));
            }
            let mut seen = HashSet::new();
            for f in &def.fields {
                if SYSTEM_COLUMNS.contains(&f.name.as_str()) {
                    return Err(ModelError::ReservedField {
                        kind: def.kind,
                        field: f.name.clone(),
                    });
                }
                if !seen.insert(f.name.as_str()) {
                    return Err(ModelError::DuplicateField {
                        kind: def.kind,
                        field: f.name.clone(),
                    });
                }
            }
        }

        for r in relations.iter() {
            let Some(&idx) = by_kind.get(&r.from) else {
                return Err(ModelError::UnknownRelationColumn {
                    from: r.from,
                    column: r.column.clone(),
                });
            };
            let declared = entities[idx].field(&r.column).is_some() || SYSTEM_COLUMNS.contains(&r.column.as_str());
            if !declared {
                return Err(ModelError::UnknownRelationColumn {
                    from: r.from,
                    column: r.column.clone(),
                });
            }
            if !by_kind.contains_key(&r.to) {
                return Err(ModelError::UnknownRelationTarget {
                    from: r.from,
                    column: r.column.clone(),
                    to: r.to,
                });
            }
        }

        Ok(Catalog {
            entities,
            by_kind,
            relations,
        })
    }

    pub fn entity(&self, kind: EntityKind) -> Option<&EntityDef> {
        self.by_kind.get(&kind).and_then(|&i| self.entities.get(i))
    }

    pub fn entities(&self) -> &[EntityDef] {
        &self.entities
    }

    pub fn relations(&self) -> &RelationTable {
        &self.relations
    }

    /// The CRM's entity set.
    pub fn standard() -> Result<Self, ModelError> {
        use EntityKind::*;
        use FieldType::*;

        let priority = Enum {
            type_name: "task_priority".into(),
            values: ["low", "medium", "high", "urgent"].map(String::from).to_vec(),
        };

        let entities = vec![
            EntityDef::new(
                Client,
                vec![
                    FieldDef::new("name", Text).required().max_length(200),
                    FieldDef::new("email", Text).email().max_length(254),
                    FieldDef::new("phone", Text).max_length(40),
                    FieldDef::new("status", Status).default_value(json!("prospect")),
                    FieldDef::new("tags", Json).default_value(json!([])).added_in("0002_client_tags"),
                ],
            ),
            EntityDef::new(
                Project,
                vec![
                    FieldDef::new("name", Text).required().max_length(200),
                    FieldDef::new("location", Text),
                    FieldDef::new("status", Status).default_value(json!("planning")),
                    FieldDef::new("starts_on", Date),
                    FieldDef::new("metadata", Json),
                ],
            ),
            EntityDef::new(
                Unit,
                vec![
                    FieldDef::new("project_id", Integer).required(),
                    FieldDef::new("unit_number", Text).required().max_length(40).pattern("^[A-Za-z0-9-]+$"),
                    FieldDef::new("status", Status).default_value(json!("available")),
                    FieldDef::new("area_m2", Decimal).non_negative().added_in("0001_unit_area"),
                    FieldDef::new("price", Decimal).non_negative(),
                ],
            ),
            EntityDef::new(
                Sale,
                vec![
                    FieldDef::new("unit_id", Integer).required(),
                    FieldDef::new("client_id", Integer).required(),
                    FieldDef::new("amount", Decimal).required().non_negative(),
                    FieldDef::new("status", Status).default_value(json!("pending")),
                    FieldDef::new("closed_on", Date),
                ],
            ),
            EntityDef::new(
                Task,
                vec![
                    FieldDef::new("title", Text).required().max_length(200),
                    FieldDef::new("project_id", Integer),
                    FieldDef::new("client_id", Integer),
                    FieldDef::new("status", Status).default_value(json!("pending")),
                    FieldDef::new("due_on", Date),
                    FieldDef::new("assigned_to", Integer),
                    FieldDef::new("priority", priority)
                        .default_value(json!("medium"))
                        .added_in("0003_task_priority"),
                ],
            ),
            EntityDef::new(
                Note,
                vec![
                    FieldDef::new("body", Text).required(),
                    FieldDef::new("client_id", Integer),
                    FieldDef::new("project_id", Integer),
                ],
            ),
            EntityDef::new(
                Reminder,
                vec![
                    FieldDef::new("message", Text).required().max_length(500),
                    FieldDef::new("remind_at", Timestamp).required(),
                    FieldDef::new("client_id", Integer),
                    FieldDef::new("status", Status).default_value(json!("pending")),
                ],
            ),
            EntityDef::new(
                Backup,
                vec![
                    FieldDef::new("filename", Text).required().max_length(255),
                    FieldDef::new("size_bytes", Integer).non_negative(),
                    FieldDef::new("status", Status).default_value(json!("completed")),
                ],
            )
            .unique("filename"),
            EntityDef::new(
                User,
                vec![
                    FieldDef::new("name", Text).required().max_length(200),
                    FieldDef::new("email", Text).required().email().max_length(254),
                ],
            )
            .unique("email")
            .operations(&[Operation::Read, Operation::Create]),
        ];

        let mut relations = RelationTable::new()
            .reference(Unit, "project_id", Project, "project")
            .reference(Sale, "unit_id", Unit, "unit")
            .reference(Sale, "client_id", Client, "client")
            .reference(Task, "project_id", Project, "project")
            .reference(Task, "client_id", Client, "client")
            .weak(Task, "assigned_to", User, "assignee")
            .reference(Note, "client_id", Client, "client")
            .reference(Note, "project_id", Project, "project")
            .reference(Reminder, "client_id", Client, "client");
        for def in entities.iter().filter(|e| e.soft_delete()) {
            relations = relations.weak(def.kind, "deleted_by", User, "deleted_by");
        }

        Catalog::new(entities, relations)
    }
}
