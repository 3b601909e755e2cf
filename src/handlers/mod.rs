//! HTTP handlers for entity records.

pub mod entity;
pub use entity::*;
