//! Router assembly.

mod common;
mod entity;
pub use common::common_routes;
pub use entity::entity_routes;

use crate::state::AppState;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

pub const API_PREFIX: &str = "/api/v1";

/// The full application: common routes at the root, entities under [`API_PREFIX`].
pub fn app(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .nest(API_PREFIX, entity_routes(state))
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
}
