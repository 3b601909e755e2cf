//! Shared application state for all routes.

use crate::model::Catalog;
use crate::service::Lifecycle;
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub catalog: Arc<Catalog>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, catalog: Arc<Catalog>) -> Self {
        AppState { store, catalog }
    }

    /// The soft-delete gate over this state's store and catalog.
    pub fn lifecycle(&self) -> Lifecycle<'_> {
        Lifecycle::new(self.store.as_ref(), &self.catalog)
    }
}
