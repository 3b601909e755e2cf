//! Entity routes. Paths are parameterized; handlers resolve the entity kind from the segment.

use crate::handlers::entity::{create, deleted_by, delete as delete_handler, dependents, list, read, restore, update};
use crate::state::AppState;
use axum::{routing::get, routing::post, Router};

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/:path_segment", get(list).post(create))
        .route(
            "/:path_segment/:id",
            get(read).patch(update).delete(delete_handler),
        )
        .route("/:path_segment/:id/restore", post(restore))
        .route("/:path_segment/:id/dependents", get(dependents))
        .route("/:path_segment/:id/deleted-by", get(deleted_by))
        .with_state(state)
}
