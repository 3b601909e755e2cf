//! Relationship table: which entity columns point at which other entities.
//!
//! Relations are resolved by the query layer only. No foreign-key constraint is emitted,
//! so every lookup through a relation must tolerate a missing target.

use crate::model::EntityKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strength {
    /// Domain reference (a unit belongs to a project).
    Reference,
    /// Audit/display reference with no ownership, e.g. `deleted_by`.
    Weak,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    pub from: EntityKind,
    pub column: String,
    pub to: EntityKind,
    pub role: &'static str,
    pub strength: Strength,
}

#[derive(Clone, Debug, Default)]
pub struct RelationTable {
    relations: Vec<Relation>,
}

impl RelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reference(mut self, from: EntityKind, column: &str, to: EntityKind, role: &'static str) -> Self {
        self.relations.push(Relation {
            from,
            column: column.to_string(),
            to,
            role,
            strength: Strength::Reference,
        });
        self
    }

    pub fn weak(mut self, from: EntityKind, column: &str, to: EntityKind, role: &'static str) -> Self {
        self.relations.push(Relation {
            from,
            column: column.to_string(),
            to,
            role,
            strength: Strength::Weak,
        });
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relation> {
        self.relations.iter()
    }

    /// Domain references pointing at `kind` from other entities. Weak references are excluded.
    pub fn referencing(&self, kind: EntityKind) -> impl Iterator<Item = &Relation> {
        self.relations
            .iter()
            .filter(move |r| r.to == kind && r.strength == Strength::Reference)
    }

    pub fn by_role(&self, from: EntityKind, role: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.from == from && r.role == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RelationTable {
        RelationTable::new()
            .reference(EntityKind::Unit, "project_id", EntityKind::Project, "project")
            .reference(EntityKind::Task, "project_id", EntityKind::Project, "project")
            .weak(EntityKind::Unit, "deleted_by", EntityKind::User, "deleted_by")
    }

    #[test]
    fn referencing_skips_weak_edges() {
        let t = table();
        let into_project: Vec<_> = t.referencing(EntityKind::Project).map(|r| r.from).collect();
        assert_eq!(into_project, vec![EntityKind::Unit, EntityKind::Task]);
        assert_eq!(t.referencing(EntityKind::User).count(), 0);
    }

    #[test]
    fn finds_relation_by_role() {
        let t = table();
        let r = t.by_role(EntityKind::Unit, "deleted_by").unwrap();
        assert_eq!(r.strength, Strength::Weak);
        assert_eq!(r.column, "deleted_by");
        assert!(t.by_role(EntityKind::Sale, "deleted_by").is_none());
    }
}
