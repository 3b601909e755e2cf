//! Soft-delete gate: every read and write of an entity goes through here.
//!
//! Records are partitioned into active (`deleted_at` null) and archived. Reads default to
//! the active side; lifecycle transitions are state-conditioned in the store, so a
//! transition from the wrong state surfaces as NotFound.

use crate::error::AppError;
use crate::model::{Catalog, EntityDef, EntityKind, Operation, Relation};
use crate::record::{Filter, ListQuery, Record, Visibility, MAX_LIMIT};
use crate::service::RequestValidator;
use crate::store::Store;
use serde_json::{Map, Value};

/// Active records of one kind that point at a given record through a relation.
#[derive(Clone, Debug)]
pub struct Dependents {
    pub relation: Relation,
    pub records: Vec<Record>,
}

#[derive(Clone, Copy)]
pub struct Lifecycle<'a> {
    store: &'a dyn Store,
    catalog: &'a Catalog,
}

impl<'a> Lifecycle<'a> {
    pub fn new(store: &'a dyn Store, catalog: &'a Catalog) -> Self {
        Lifecycle { store, catalog }
    }

    /// Entity declaration for `kind`, checked against the operation being attempted.
    pub fn entity(&self, kind: EntityKind, op: Operation) -> Result<&'a EntityDef, AppError> {
        let entity = self
            .catalog
            .entity(kind)
            .ok_or_else(|| AppError::UnknownEntity(kind.to_string()))?;
        if !entity.allows(op) {
            return Err(AppError::BadRequest(format!(
                "operation '{}' is not allowed on {}",
                op.as_str(),
                kind
            )));
        }
        Ok(entity)
    }

    /// Records ordered by id. Filters must name declared fields; substring filters need a text column.
    pub async fn list(&self, kind: EntityKind, query: &ListQuery) -> Result<Vec<Record>, AppError> {
        let entity = self.entity(kind, Operation::Read)?;
        for filter in &query.filters {
            let field = entity.field(filter.column()).ok_or_else(|| {
                AppError::Validation(format!("unknown filter field '{}' for {}", filter.column(), kind))
            })?;
            if matches!(filter, Filter::Contains(..)) && !field.ty.is_textual() {
                return Err(AppError::Validation(format!(
                    "{} does not support substring filters",
                    field.name
                )));
            }
        }
        self.store.list(entity, query).await
    }

    pub async fn get(&self, kind: EntityKind, id: i64, visibility: Visibility) -> Result<Record, AppError> {
        let entity = self.entity(kind, Operation::Read)?;
        self.store
            .fetch(entity, id, visibility)
            .await?
            .ok_or_else(|| AppError::not_found(kind, id))
    }

    pub async fn create(&self, kind: EntityKind, body: Map<String, Value>) -> Result<Record, AppError> {
        let entity = self.entity(kind, Operation::Create)?;
        let fields = RequestValidator::prepare_create(entity, body)?;
        let record = self.store.insert(entity, fields).await?;
        tracing::info!(entity = %kind, id = record.id, "created");
        Ok(record)
    }

    /// Partial update of an active record. Archived records are read-only until restored.
    pub async fn update(&self, kind: EntityKind, id: i64, body: Map<String, Value>) -> Result<Record, AppError> {
        let entity = self.entity(kind, Operation::Update)?;
        let changes = RequestValidator::prepare_update(entity, id, body)?;
        let record = self
            .store
            .update(entity, id, changes)
            .await?
            .ok_or_else(|| AppError::not_found(kind, id))?;
        tracing::info!(entity = %kind, id, "updated");
        Ok(record)
    }

    /// Archive an active record. An actor that does not resolve to a user is recorded anyway;
    /// the actor lookup only feeds a warning and never fails the delete.
    pub async fn soft_delete(&self, kind: EntityKind, id: i64, actor: Option<i64>) -> Result<Record, AppError> {
        let entity = self.entity(kind, Operation::Delete)?;
        if let Some(user_id) = actor {
            match self.find(EntityKind::User, user_id).await {
                Ok(Some(_)) => {}
                Ok(None) => tracing::warn!(entity = %kind, id, user_id, "soft delete by unknown user"),
                Err(e) => tracing::warn!(entity = %kind, id, user_id, error = %e, "could not look up deleting user"),
            }
        }
        let record = self
            .store
            .mark_deleted(entity, id, actor)
            .await?
            .ok_or_else(|| AppError::not_found(kind, id))?;
        tracing::info!(entity = %kind, id, deleted_by = ?actor, "soft deleted");
        Ok(record)
    }

    pub async fn restore(&self, kind: EntityKind, id: i64) -> Result<Record, AppError> {
        let entity = self.entity(kind, Operation::Restore)?;
        let record = self
            .store
            .clear_deleted(entity, id)
            .await?
            .ok_or_else(|| AppError::not_found(kind, id))?;
        tracing::info!(entity = %kind, id, "restored");
        Ok(record)
    }

    /// The user who archived the record, when recorded and still present.
    pub async fn deleted_by_user(&self, kind: EntityKind, id: i64) -> Result<Option<Record>, AppError> {
        let record = self.get(kind, id, Visibility::All).await?;
        let (Some(user_id), Some(relation)) = (record.deleted_by, self.catalog.relations().by_role(kind, "deleted_by"))
        else {
            return Ok(None);
        };
        let user = self.find(relation.to, user_id).await?;
        if user.is_none() {
            tracing::warn!(entity = %kind, id, user_id, "deleted_by points at a missing user");
        }
        Ok(user)
    }

    /// Active records referencing this one, grouped by relation. Nothing is cascaded.
    pub async fn dependents(&self, kind: EntityKind, id: i64) -> Result<Vec<Dependents>, AppError> {
        self.get(kind, id, Visibility::All).await?;
        let mut out = Vec::new();
        for relation in self.catalog.relations().referencing(kind) {
            let Some(from) = self.catalog.entity(relation.from) else { continue };
            let query = ListQuery {
                limit: Some(MAX_LIMIT),
                ..ListQuery::active()
            }
            .filter(Filter::Eq(relation.column.clone(), Value::from(id)));
            let records = self.store.list(from, &query).await?;
            if !records.is_empty() {
                out.push(Dependents {
                    relation: relation.clone(),
                    records,
                });
            }
        }
        Ok(out)
    }

    /// Lookup through a weak reference: any visibility, missing is not an error.
    async fn find(&self, kind: EntityKind, id: i64) -> Result<Option<Record>, AppError> {
        let entity = self
            .catalog
            .entity(kind)
            .ok_or_else(|| AppError::UnknownEntity(kind.to_string()))?;
        self.store.fetch(entity, id, Visibility::All).await
    }
}
