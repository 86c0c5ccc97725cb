//! Integration tests for the store: cache semantics, buffered flushes,
//! expiry, and the synchronous device-URL path.

use std::collections::HashMap;
use std::time::Duration;

use shrike::config::DbConfig;
use shrike::models::Platform;
use shrike::store::{Store, StoreError};
use tempfile::TempDir;

/// Helper to create a file-backed test store with a fast flush cycle.
async fn create_test_store(dir: &TempDir) -> Store {
    let cfg = DbConfig {
        path: dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .into_owned(),
        max_open_conns: 5,
        max_idle_conns: 2,
        conn_max_lifetime_mins: 5,
        buffer_size: 8,
        flush_interval: Duration::from_millis(50),
    };
    Store::new(&cfg, 6).await.unwrap()
}

fn no_devices() -> HashMap<Platform, String> {
    HashMap::new()
}

#[tokio::test]
async fn create_then_read_your_writes() {
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir).await;

    let code = store
        .create_short_url("https://example.com", None, None, None, no_devices())
        .await
        .unwrap();
    assert_eq!(code.len(), 6);

    // Visible from the cache immediately, before any flush ran.
    let record = store.get_redirect_data(&code).await.unwrap();
    assert_eq!(record.url, "https://example.com");

    store.close().await;
}

#[tokio::test]
async fn empty_url_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir).await;

    let err = store
        .create_short_url("", None, None, None, no_devices())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::EmptyUrl));

    store.close().await;
}

#[tokio::test]
async fn slug_collision_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir).await;

    store
        .create_short_url(
            "https://example.com/1",
            None,
            Some("hi".to_string()),
            None,
            no_devices(),
        )
        .await
        .unwrap();

    let err = store
        .create_short_url(
            "https://example.com/2",
            None,
            Some("hi".to_string()),
            None,
            no_devices(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict));

    store.close().await;
}

#[tokio::test]
async fn delete_is_idempotent_only_once() {
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir).await;

    // Use the synchronous path so the row is persisted before the delete.
    let devices = HashMap::from([(Platform::Android, "https://example.com/a".to_string())]);
    let code = store
        .create_short_url("https://example.com", None, None, None, devices)
        .await
        .unwrap();

    store.delete_url(&code).await.unwrap();
    assert!(matches!(
        store.get_redirect_data(&code).await.unwrap_err(),
        StoreError::NotExist
    ));
    assert!(matches!(
        store.delete_url(&code).await.unwrap_err(),
        StoreError::NotExist
    ));

    store.close().await;
}

#[tokio::test]
async fn update_replaces_target_and_devices() {
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir).await;

    let devices = HashMap::from([(Platform::Android, "https://example.com/a".to_string())]);
    let code = store
        .create_short_url("https://example.com", None, None, None, devices)
        .await
        .unwrap();

    let new_devices = HashMap::from([(Platform::Ios, "https://example.com/i".to_string())]);
    store
        .update_url(&code, "https://other.example", Some("new".to_string()), new_devices)
        .await
        .unwrap();

    let record = store.get_redirect_data(&code).await.unwrap();
    assert_eq!(record.url, "https://other.example");
    assert_eq!(record.title.as_deref(), Some("new"));
    let device_urls = record.device_urls.unwrap();
    assert!(device_urls.contains_key(&Platform::Ios));
    assert!(!device_urls.contains_key(&Platform::Android));

    let err = store
        .update_url("missing", "https://example.com", None, no_devices())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotExist));

    store.close().await;
}

#[tokio::test]
async fn expired_urls_are_reaped_lazily() {
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir).await;

    let code = store
        .create_short_url(
            "https://example.com",
            None,
            None,
            Some(Duration::from_secs(1)),
            no_devices(),
        )
        .await
        .unwrap();

    // Still resolves before the deadline.
    assert!(store.get_redirect_data(&code).await.is_ok());

    tokio::time::sleep(Duration::from_millis(1300)).await;

    assert!(matches!(
        store.get_redirect_data(&code).await.unwrap_err(),
        StoreError::NotExist
    ));

    // The reap removed the persisted row as well.
    let (urls, total) = store.get_urls(1, 50).await.unwrap();
    assert_eq!(total, 0);
    assert!(urls.iter().all(|u| u.short_code != code));

    store.close().await;
}

#[tokio::test]
async fn buffered_creates_reach_the_database() {
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir).await;

    let mut codes = Vec::new();
    for i in 0..10 {
        codes.push(
            store
                .create_short_url(
                    &format!("https://example.com/{}", i),
                    None,
                    None,
                    None,
                    no_devices(),
                )
                .await
                .unwrap(),
        );
    }

    // Redirects resolve before the flush.
    for code in &codes {
        assert!(store.get_redirect_data(code).await.is_ok());
    }

    // One flush cycle later the rows are persisted.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let (_, total) = store.get_urls(1, 50).await.unwrap();
    assert_eq!(total, 10);

    // And redirects still resolve after it.
    for code in &codes {
        assert!(store.get_redirect_data(code).await.is_ok());
    }

    store.close().await;
}

#[tokio::test]
async fn size_trigger_flushes_ahead_of_the_ticker() {
    let dir = TempDir::new().unwrap();
    // buffer_size is 8; two full buffers of creates.
    let store = create_test_store(&dir).await;

    for i in 0..16 {
        store
            .create_short_url(
                &format!("https://example.com/{}", i),
                None,
                None,
                None,
                no_devices(),
            )
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    let (_, total) = store.get_urls(1, 50).await.unwrap();
    assert_eq!(total, 16);

    store.close().await;
}

#[tokio::test]
async fn cache_size_tracks_creates_and_deletes() {
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir).await;

    let devices = HashMap::from([(Platform::Web, "https://example.com/w".to_string())]);
    let keep = store
        .create_short_url("https://example.com/1", None, None, None, no_devices())
        .await
        .unwrap();
    let gone = store
        .create_short_url("https://example.com/2", None, None, None, devices)
        .await
        .unwrap();
    assert_eq!(store.cache_size(), 2);

    store.delete_url(&gone).await.unwrap();
    assert_eq!(store.cache_size(), 1);
    assert!(store.get_redirect_data(&keep).await.is_ok());

    store.close().await;
}

#[tokio::test]
async fn close_flushes_the_residual_buffer() {
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir).await;

    // Never reaches the size trigger and close before the ticker fires.
    let code = store
        .create_short_url("https://example.com", None, None, None, no_devices())
        .await
        .unwrap();
    store.close().await;

    // A fresh store over the same file sees the row.
    let store = create_test_store(&dir).await;
    let record = store.get_redirect_data(&code).await.unwrap();
    assert_eq!(record.url, "https://example.com");

    store.close().await;
}

#[tokio::test]
async fn device_urls_hydrate_on_first_resolve_after_restart() {
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir).await;

    let devices = HashMap::from([
        (Platform::Android, "https://example.com/a".to_string()),
        (Platform::Ios, "https://example.com/i".to_string()),
    ]);
    let code = store
        .create_short_url("https://example.com", None, None, None, devices)
        .await
        .unwrap();
    store.close().await;

    // Warm-load skips device rows; the first resolve hydrates them.
    let store = create_test_store(&dir).await;
    let record = store.get_redirect_data(&code).await.unwrap();
    let device_urls = record.device_urls.expect("device urls should hydrate");
    assert_eq!(device_urls.len(), 2);
    assert_eq!(
        device_urls[&Platform::Android].url,
        "https://example.com/a"
    );

    store.close().await;
}

#[tokio::test]
async fn empty_device_targets_are_skipped() {
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir).await;

    let devices = HashMap::from([
        (Platform::Android, "https://example.com/a".to_string()),
        (Platform::Ios, String::new()),
    ]);
    let code = store
        .create_short_url("https://example.com", None, None, None, devices)
        .await
        .unwrap();

    let record = store.get_redirect_data(&code).await.unwrap();
    let device_urls = record.device_urls.unwrap();
    assert_eq!(device_urls.len(), 1);
    assert!(device_urls.contains_key(&Platform::Android));

    store.close().await;
}

#[tokio::test]
async fn listing_is_paginated_newest_first() {
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir).await;

    for i in 0..5 {
        let devices =
            HashMap::from([(Platform::Web, format!("https://example.com/w/{}", i))]);
        store
            .create_short_url(
                &format!("https://example.com/{}", i),
                None,
                Some(format!("code{}", i)),
                None,
                devices,
            )
            .await
            .unwrap();
        // Distinct created_at values so the ordering is deterministic.
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let (page_one, total) = store.get_urls(1, 2).await.unwrap();
    assert_eq!(total, 5);
    assert_eq!(page_one.len(), 2);
    assert_eq!(page_one[0].short_code, "code4");
    assert_eq!(page_one[1].short_code, "code3");

    let (page_three, _) = store.get_urls(3, 2).await.unwrap();
    assert_eq!(page_three.len(), 1);
    assert_eq!(page_three[0].short_code, "code0");

    // Device URLs come along with the listing.
    assert!(page_one[0]
        .device_urls
        .as_ref()
        .unwrap()
        .contains_key(&Platform::Web));

    store.close().await;
}

#[tokio::test]
async fn concurrent_creates_stay_unique() {
    let dir = TempDir::new().unwrap();
    let store = std::sync::Arc::new(create_test_store(&dir).await);

    let mut handles = Vec::new();
    for i in 0..20 {
        let store = std::sync::Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .create_short_url(
                    &format!("https://example.com/{}", i),
                    None,
                    None,
                    None,
                    HashMap::new(),
                )
                .await
                .unwrap()
        }));
    }

    let mut codes = std::collections::HashSet::new();
    for handle in handles {
        codes.insert(handle.await.unwrap());
    }
    assert_eq!(codes.len(), 20);
    assert_eq!(store.cache_size(), 20);

    store.close().await;
}
