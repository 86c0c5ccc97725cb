use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::metrics::get_metrics;
use crate::models::{CreateUrlRequest, UpdateUrlRequest};
use crate::store::{Store, StoreError};

use super::response::{error_response, success};

pub struct ApiState {
    pub store: Arc<Store>,
    pub public_url: String,
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    10
}

/// Create a short URL.
pub async fn create_url(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<CreateUrlRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, "invalid request body");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    if req.url.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "URL is required");
    }

    // Non-positive expiry means no expiry.
    let expiry = req
        .expiry_in_secs
        .filter(|&secs| secs > 0)
        .map(|secs| Duration::from_secs(secs as u64));

    match state
        .store
        .create_short_url(
            &req.url,
            req.title,
            req.slug,
            expiry,
            req.device_urls.unwrap_or_default(),
        )
        .await
    {
        Ok(short_code) => {
            if let Some(metrics) = get_metrics() {
                metrics.urls_shortened_total.inc();
            }
            success(json!({
                "short_code": short_code,
                "public_url": state.public_url,
            }))
        }
        Err(StoreError::EmptyUrl) => error_response(StatusCode::BAD_REQUEST, "URL is required"),
        Err(e) => {
            error!(error = %e, url = %req.url, "failed to create short URL");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create short URL",
            )
        }
    }
}

/// List short URLs, newest first.
pub async fn list_urls(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let page = query.page.max(1);
    let per_page = query.per_page.max(1);

    match state.store.get_urls(page, per_page).await {
        Ok((urls, total)) => success(json!({
            "urls": urls,
            "page": page,
            "per_page": per_page,
            "count": total,
        })),
        Err(e) => {
            error!(error = %e, "failed to fetch URLs");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch URLs")
        }
    }
}

/// Replace a short URL's target, title, and device URLs.
pub async fn update_url(
    State(state): State<Arc<ApiState>>,
    Path(short_code): Path<String>,
    payload: Result<Json<UpdateUrlRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, "invalid request body");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    if req.url.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "URL is required");
    }

    match state
        .store
        .update_url(
            &short_code,
            &req.url,
            req.title,
            req.device_urls.unwrap_or_default(),
        )
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(StoreError::NotExist) => error_response(StatusCode::NOT_FOUND, "URL not found"),
        Err(StoreError::EmptyUrl) => error_response(StatusCode::BAD_REQUEST, "URL is required"),
        Err(e) => {
            error!(error = %e, short_code = %short_code, "failed to update URL");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// Delete a short URL.
pub async fn delete_url(
    State(state): State<Arc<ApiState>>,
    Path(short_code): Path<String>,
) -> Response {
    match state.store.delete_url(&short_code).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(StoreError::NotExist) => error_response(StatusCode::NOT_FOUND, "URL not found"),
        Err(e) => {
            error!(error = %e, short_code = %short_code, "failed to delete URL");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// Health check backed by a database ping.
pub async fn health_check(State(state): State<Arc<ApiState>>) -> Response {
    match state.store.ping().await {
        Ok(()) => success("healthy"),
        Err(e) => {
            error!(error = %e, "health check failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Database is not healthy")
        }
    }
}
