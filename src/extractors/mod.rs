//! Request extractors.

mod actor;
pub use actor::{ActingUser, USER_ID_HEADER};
