//! Entity model and association layer.

pub mod catalog;
pub mod entity;
pub mod relation;
pub mod status;

pub use catalog::Catalog;
pub use entity::{decimal_text, EntityDef, EntityKind, FieldDef, FieldType, Operation, ValidationRule, SYSTEM_COLUMNS};
pub use relation::{Relation, RelationTable, Strength};
