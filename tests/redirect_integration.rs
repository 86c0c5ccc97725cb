//! Redirect integration tests: status/headers, device selection, expiry,
//! and event enqueueing, driven through the router with `oneshot`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
};
use tokio::sync::Mutex;
use tower::ServiceExt;

use shrike::analytics::{Dispatcher, Event, Manager};
use shrike::config::DbConfig;
use shrike::models::Platform;
use shrike::redirect;
use shrike::store::Store;
use tempfile::TempDir;

const ANDROID_UA: &str =
    "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Mobile Safari/537.36";
const IPHONE_UA: &str =
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
const DESKTOP_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

async fn create_test_store(dir: &TempDir) -> Arc<Store> {
    let cfg = DbConfig {
        path: dir.path().join("test.db").to_string_lossy().into_owned(),
        max_open_conns: 5,
        max_idle_conns: 2,
        conn_max_lifetime_mins: 5,
        buffer_size: 100,
        flush_interval: Duration::from_millis(50),
    };
    Arc::new(Store::new(&cfg, 6).await.unwrap())
}

fn get_request(path: &str, user_agent: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri(path)
        .header(header::HOST, "sho.rt")
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4242))));
    if let Some(ua) = user_agent {
        builder = builder.header(header::USER_AGENT, ua);
    }
    builder.body(Body::empty()).unwrap()
}

fn location(response: &axum::response::Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

/// Dispatcher that records every event it receives.
struct CapturingDispatcher {
    events: Arc<Mutex<Vec<Event>>>,
}

#[async_trait::async_trait]
impl Dispatcher for CapturingDispatcher {
    fn name(&self) -> &'static str {
        "capturing"
    }

    async fn send(&self, event: &Event) -> anyhow::Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn redirect_sets_status_and_headers() {
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir).await;
    store
        .create_short_url(
            "https://example.com/destination",
            None,
            Some("known".to_string()),
            None,
            HashMap::new(),
        )
        .await
        .unwrap();

    let app = redirect::create_redirect_router(store.clone(), None, "https://sho.rt".to_string());
    let response = app.oneshot(get_request("/known", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "https://example.com/destination");
    assert_eq!(
        response
            .headers()
            .get(header::CACHE_CONTROL)
            .unwrap()
            .to_str()
            .unwrap(),
        "public, max-age=0, must-revalidate"
    );

    store.close().await;
}

#[tokio::test]
async fn unknown_code_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir).await;

    let app = redirect::create_redirect_router(store.clone(), None, "https://sho.rt".to_string());
    let response = app.oneshot(get_request("/missing", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    store.close().await;
}

#[tokio::test]
async fn device_selection_prefers_platform_entries() {
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir).await;

    let devices = HashMap::from([
        (Platform::Android, "https://example.com/android".to_string()),
        (Platform::Ios, "https://example.com/ios".to_string()),
    ]);
    store
        .create_short_url(
            "https://example.com/base",
            None,
            Some("dev".to_string()),
            None,
            devices,
        )
        .await
        .unwrap();

    let app = redirect::create_redirect_router(store.clone(), None, "https://sho.rt".to_string());

    let response = app
        .clone()
        .oneshot(get_request("/dev", Some(ANDROID_UA)))
        .await
        .unwrap();
    assert_eq!(location(&response), "https://example.com/android");

    let response = app
        .clone()
        .oneshot(get_request("/dev", Some(IPHONE_UA)))
        .await
        .unwrap();
    assert_eq!(location(&response), "https://example.com/ios");

    // No web override configured, so desktop traffic takes the base URL.
    let response = app
        .oneshot(get_request("/dev", Some(DESKTOP_UA)))
        .await
        .unwrap();
    assert_eq!(location(&response), "https://example.com/base");

    store.close().await;
}

#[tokio::test]
async fn expired_code_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir).await;
    store
        .create_short_url(
            "https://example.com",
            None,
            Some("brief".to_string()),
            Some(Duration::from_secs(1)),
            HashMap::new(),
        )
        .await
        .unwrap();

    let app = redirect::create_redirect_router(store.clone(), None, "https://sho.rt".to_string());

    let response = app
        .clone()
        .oneshot(get_request("/brief", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);

    tokio::time::sleep(Duration::from_millis(1300)).await;

    let response = app.oneshot(get_request("/brief", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    store.close().await;
}

#[tokio::test]
async fn redirect_enqueues_a_tracking_event() {
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir).await;
    store
        .create_short_url(
            "https://example.com/destination",
            None,
            Some("tracked".to_string()),
            None,
            HashMap::new(),
        )
        .await
        .unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let manager = Arc::new(Manager::with_dispatchers(
        vec![Box::new(CapturingDispatcher {
            events: Arc::clone(&events),
        })],
        1,
    ));
    manager.start();

    let app = redirect::create_redirect_router(
        store.clone(),
        Some(Arc::clone(&manager)),
        "https://sho.rt".to_string(),
    );

    let mut request = get_request("/tracked", Some(ANDROID_UA));
    request.headers_mut().insert(
        header::REFERER,
        header::HeaderValue::from_static("https://referrer.example"),
    );
    request.headers_mut().insert(
        "x-forwarded-for",
        header::HeaderValue::from_static("203.0.113.1, 192.0.2.1"),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);

    // Give the worker a moment to drain the channel.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let events = events.lock().await;
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.name, "pageview");
    assert_eq!(event.domain, "sho.rt");
    assert_eq!(event.url, "https://sho.rt/tracked");
    assert_eq!(event.short_code, "tracked");
    assert_eq!(event.target_url, "https://example.com/destination");
    assert_eq!(event.referrer, "https://referrer.example");
    assert_eq!(event.user_ip, "203.0.113.1");
    assert_eq!(event.user_agent, ANDROID_UA);
    drop(events);

    manager.close().await;
    store.close().await;
}
