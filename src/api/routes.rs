use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::store::Store;

use super::handlers::{
    create_url, delete_url, health_check, list_urls, update_url, ApiState,
};

pub fn create_api_router(store: Arc<Store>, public_url: String) -> Router {
    let state = Arc::new(ApiState { store, public_url });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/urls", post(create_url).get(list_urls))
        .route(
            "/api/v1/urls/{short_code}",
            put(update_url).delete(delete_url),
        )
        .route("/health", get(health_check))
        .layer(cors)
        .with_state(state)
}
