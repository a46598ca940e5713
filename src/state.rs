//! Shared application state
//!
//! Cloned into every handler. The store is the only path to data; the secret
//! is optional so a misconfigured deployment fails closed per request rather
//! than at startup.

use std::sync::Arc;

use crate::store::RowStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RowStore>,
    pub admin_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(store: Arc<dyn RowStore>, admin_secret: Option<String>) -> Self {
        Self {
            store,
            admin_secret: admin_secret
                .filter(|secret| !secret.is_empty())
                .map(Arc::from),
        }
    }
}
