use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::error;

use crate::config::DbConfig;
use crate::models::{DeviceUrl, Platform, UrlRecord};

/// Open the SQLite pool with the performance pragmas applied per connection.
pub async fn connect(cfg: &DbConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(&cfg.path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true)
        .page_size(4096)
        .pragma("temp_store", "memory")
        .pragma("cache_size", "-64000")
        .pragma("mmap_size", "536870912")
        .pragma("wal_autocheckpoint", "2000")
        .pragma("journal_size_limit", "31457280");

    let pool = SqlitePoolOptions::new()
        .max_connections(cfg.max_open_conns)
        .min_connections(cfg.max_idle_conns.min(cfg.max_open_conns))
        .max_lifetime(Duration::from_secs(cfg.conn_max_lifetime_mins * 60))
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create the schema if it does not exist yet.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS urls (
            short_code TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            title TEXT,
            created_at DATETIME NOT NULL,
            expires_at DATETIME
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS device_urls (
            short_code TEXT,
            platform TEXT CHECK(platform IN ('android', 'ios', 'macos', 'web')),
            url TEXT NOT NULL,
            created_at DATETIME NOT NULL,
            FOREIGN KEY (short_code) REFERENCES urls(short_code) ON DELETE CASCADE,
            PRIMARY KEY (short_code, platform)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_urls_created_at ON urls(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

fn record_from_row(
    short_code: String,
    url: String,
    title: Option<String>,
    created_at: String,
    expires_at: Option<String>,
) -> Result<UrlRecord> {
    let created_at = DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc);
    let expires_at = expires_at.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    });

    Ok(UrlRecord {
        short_code,
        url,
        title,
        created_at,
        expires_at,
        device_urls: None,
    })
}

/// Load every URL row for cache warm-up. Device URLs stay unhydrated.
pub async fn load_all(pool: &SqlitePool) -> Result<HashMap<String, UrlRecord>> {
    let rows = sqlx::query("SELECT short_code, url, title, created_at, expires_at FROM urls")
        .fetch_all(pool)
        .await?;

    let mut records = HashMap::with_capacity(rows.len());
    for row in rows {
        let record = record_from_row(
            row.get("short_code"),
            row.get("url"),
            row.get("title"),
            row.get("created_at"),
            row.get("expires_at"),
        )?;
        records.insert(record.short_code.clone(), record);
    }
    Ok(records)
}

/// Fetch a single URL row, without device URLs.
pub async fn get_url_row(pool: &SqlitePool, short_code: &str) -> Result<Option<UrlRecord>> {
    let row = sqlx::query(
        "SELECT short_code, url, title, created_at, expires_at FROM urls WHERE short_code = ?",
    )
    .bind(short_code)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(record_from_row(
            row.get("short_code"),
            row.get("url"),
            row.get("title"),
            row.get("created_at"),
            row.get("expires_at"),
        )?)),
        None => Ok(None),
    }
}

/// Insert a URL together with its device URLs in one transaction.
///
/// Device entries with an empty target are skipped. Returns the device map
/// actually inserted, for the caller to place into the cache.
pub async fn insert_url_with_devices(
    pool: &SqlitePool,
    record: &UrlRecord,
    device_urls: &HashMap<Platform, String>,
) -> Result<HashMap<Platform, DeviceUrl>> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO urls (short_code, url, title, created_at, expires_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&record.short_code)
    .bind(&record.url)
    .bind(&record.title)
    .bind(record.created_at.to_rfc3339())
    .bind(record.expires_at.map(|t| t.to_rfc3339()))
    .execute(&mut *tx)
    .await?;

    let inserted = insert_device_rows(&mut tx, &record.short_code, device_urls).await?;

    tx.commit().await?;
    Ok(inserted)
}

async fn insert_device_rows(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    short_code: &str,
    device_urls: &HashMap<Platform, String>,
) -> Result<HashMap<Platform, DeviceUrl>> {
    let mut inserted = HashMap::new();
    for (&platform, url) in device_urls {
        if url.is_empty() {
            continue;
        }
        let device = DeviceUrl {
            platform,
            url: url.clone(),
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO device_urls (short_code, platform, url, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(short_code)
        .bind(platform.as_str())
        .bind(&device.url)
        .bind(device.created_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
        inserted.insert(platform, device);
    }
    Ok(inserted)
}

/// Persist one buffered batch as a single multi-row INSERT in one transaction.
pub async fn insert_batch(pool: &SqlitePool, batch: &[UrlRecord]) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("INSERT INTO urls (short_code, url, title, created_at, expires_at) ");
    builder.push_values(batch, |mut row, record| {
        row.push_bind(record.short_code.clone())
            .push_bind(record.url.clone())
            .push_bind(record.title.clone())
            .push_bind(record.created_at.to_rfc3339())
            .push_bind(record.expires_at.map(|t| t.to_rfc3339()));
    });
    builder.build().execute(&mut *tx).await?;

    tx.commit().await?;
    Ok(())
}

/// Delete a URL row; cascade removes its device URLs. Returns rows affected.
pub async fn delete_url_row(pool: &SqlitePool, short_code: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM urls WHERE short_code = ?")
        .bind(short_code)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Update a URL row and replace its device URLs in one transaction.
///
/// Returns `None` when no row matched the short code.
pub async fn update_url_with_devices(
    pool: &SqlitePool,
    short_code: &str,
    url: &str,
    title: Option<&str>,
    device_urls: &HashMap<Platform, String>,
) -> Result<Option<HashMap<Platform, DeviceUrl>>> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query("UPDATE urls SET url = ?, title = ? WHERE short_code = ?")
        .bind(url)
        .bind(title)
        .bind(short_code)
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Ok(None);
    }

    sqlx::query("DELETE FROM device_urls WHERE short_code = ?")
        .bind(short_code)
        .execute(&mut *tx)
        .await?;

    let inserted = insert_device_rows(&mut tx, short_code, device_urls).await?;

    tx.commit().await?;
    Ok(Some(inserted))
}

/// Fetch the device URLs for one short code.
pub async fn fetch_device_urls(
    pool: &SqlitePool,
    short_code: &str,
) -> Result<HashMap<Platform, DeviceUrl>> {
    let rows = sqlx::query("SELECT platform, url, created_at FROM device_urls WHERE short_code = ?")
        .bind(short_code)
        .fetch_all(pool)
        .await?;

    let mut device_urls = HashMap::new();
    for row in rows {
        let platform_tag: String = row.get("platform");
        let platform = match Platform::from_str(&platform_tag) {
            Ok(platform) => platform,
            Err(e) => {
                error!(short_code, error = %e, "skipping device url with bad platform");
                continue;
            }
        };
        let created_at: String = row.get("created_at");
        let created_at = match DateTime::parse_from_rfc3339(&created_at) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(e) => {
                error!(short_code, error = %e, "skipping device url with bad timestamp");
                continue;
            }
        };
        device_urls.insert(
            platform,
            DeviceUrl {
                platform,
                url: row.get("url"),
                created_at,
            },
        );
    }
    Ok(device_urls)
}

/// Paginated listing ordered by creation time, newest first.
pub async fn list_urls(pool: &SqlitePool, page: i64, per_page: i64) -> Result<(Vec<UrlRecord>, i64)> {
    let total: i64 = sqlx::query("SELECT COUNT(*) AS count FROM urls")
        .fetch_one(pool)
        .await?
        .get("count");

    let offset = (page - 1) * per_page;
    let rows = sqlx::query(
        "SELECT short_code, url, title, created_at, expires_at
         FROM urls
         ORDER BY created_at DESC
         LIMIT ? OFFSET ?",
    )
    .bind(per_page)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let mut record = record_from_row(
            row.get("short_code"),
            row.get("url"),
            row.get("title"),
            row.get("created_at"),
            row.get("expires_at"),
        )?;
        record.device_urls = Some(fetch_device_urls(pool, &record.short_code).await?);
        records.push(record);
    }

    Ok((records, total))
}
