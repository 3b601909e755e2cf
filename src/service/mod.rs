//! Entity services: request validation and the soft-delete lifecycle gate.

mod lifecycle;
mod validation;
pub use lifecycle::{Dependents, Lifecycle};
pub use validation::RequestValidator;
