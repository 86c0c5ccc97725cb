use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use tracing::error;

use crate::analytics::{Event, Manager};
use crate::api::response::error_response;
use crate::metrics::get_metrics;
use crate::models::{Platform, UrlRecord};
use crate::store::{Store, StoreError};

use super::client_ip::resolve_user_ip;
use super::ua::{classify_device, DeviceClass};

pub struct RedirectState {
    pub store: Arc<Store>,
    pub analytics: Option<Arc<Manager>>,
    pub public_url: String,
}

/// Resolve a short code and redirect to its target.
pub async fn redirect_url(
    State(state): State<Arc<RedirectState>>,
    Path(short_code): Path<String>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let record = match state.store.get_redirect_data(&short_code).await {
        Ok(record) => record,
        Err(StoreError::NotExist) => {
            if let Some(metrics) = get_metrics() {
                metrics.redirect_failures_total.inc();
            }
            return error_response(StatusCode::NOT_FOUND, "URL not found");
        }
        Err(e) => {
            error!(short_code = %short_code, error = %e, "failed to get URL data");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    let user_agent = header_str(&headers, header::USER_AGENT);
    let target_url = select_target(&record, classify_device(user_agent));

    if let Some(metrics) = get_metrics() {
        metrics.redirects_total.inc();
    }

    if let Some(analytics) = &state.analytics {
        let remote_addr = remote_addr.to_string();
        analytics.track(Event {
            name: "pageview".to_string(),
            domain: header_str(&headers, header::HOST).to_string(),
            url: format!("{}/{}", state.public_url, short_code),
            referrer: header_str(&headers, header::REFERER).to_string(),
            user_agent: user_agent.to_string(),
            user_ip: resolve_user_ip(&headers, &remote_addr),
            remote_addr,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            short_code: short_code.clone(),
            target_url: target_url.clone(),
        });
    }

    (
        StatusCode::FOUND,
        [
            (header::LOCATION, target_url),
            (
                header::CACHE_CONTROL,
                // Browsers must revalidate, or an updated link keeps
                // serving the stale target.
                "public, max-age=0, must-revalidate".to_string(),
            ),
        ],
    )
        .into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Pick the target for a device class, falling back to the base URL when the
/// matching device entry is absent or empty.
fn select_target(record: &UrlRecord, device: DeviceClass) -> String {
    let device_urls = match &record.device_urls {
        Some(device_urls) => device_urls,
        None => return record.url.clone(),
    };

    let platform = match device {
        DeviceClass::Android => Platform::Android,
        DeviceClass::Ios => Platform::Ios,
        DeviceClass::Web => Platform::Web,
    };

    match device_urls.get(&platform) {
        Some(device_url) if !device_url.url.is_empty() => device_url.url.clone(),
        _ => record.url.clone(),
    }
}
