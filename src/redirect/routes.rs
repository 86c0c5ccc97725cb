use axum::{routing::get, Router};
use std::sync::Arc;

use crate::analytics::Manager;
use crate::store::Store;

use super::handlers::{redirect_url, RedirectState};

pub fn create_redirect_router(
    store: Arc<Store>,
    analytics: Option<Arc<Manager>>,
    public_url: String,
) -> Router {
    let state = Arc::new(RedirectState {
        store,
        analytics,
        public_url,
    });

    Router::new()
        .route("/{short_code}", get(redirect_url))
        .with_state(state)
}
