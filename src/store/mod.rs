//! SQLite-backed URL store with a write-through cache and batched flushes.
//!
//! Reads on the redirect hot path are served from the in-memory cache only;
//! the database is consulted to hydrate device URLs and for list queries.
//! Creates without device URLs are buffered and persisted in batches by a
//! single flush worker; creates with device URLs commit synchronously.

pub mod buffer;
pub mod cache;
pub mod db;
pub mod shortcode;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::DbConfig;
use crate::models::{Platform, UrlRecord};

use buffer::WriteBuffer;
use cache::UrlCache;

/// Colliding probes at one code length before the generator widens it.
const MAX_PROBES_PER_LENGTH: u32 = 32;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("the URL does not exist")]
    NotExist,
    #[error("short code already exists")]
    Conflict,
    #[error("url must not be empty")]
    EmptyUrl,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub struct Store {
    pool: SqlitePool,
    cache: UrlCache,
    write_buffer: WriteBuffer,
    buffer_size: usize,
    flush_tx: mpsc::Sender<Vec<UrlRecord>>,
    shutdown: CancellationToken,
    flush_worker: Mutex<Option<JoinHandle<()>>>,
    short_url_len: usize,
}

impl Store {
    /// Open the database, create the schema if needed, warm the cache from a
    /// full scan, and start the flush worker.
    pub async fn new(cfg: &DbConfig, short_url_len: usize) -> Result<Self> {
        let pool = db::connect(cfg).await?;
        db::init_schema(&pool).await?;

        let cache = UrlCache::new();
        cache.warm(db::load_all(&pool).await?);
        info!(count = cache.len(), "loaded short links into cache");

        let write_buffer = buffer::new_buffer(cfg.buffer_size);
        let (flush_tx, flush_rx) = mpsc::channel(buffer::FLUSH_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();

        let worker = tokio::spawn(buffer::run_flush_worker(
            pool.clone(),
            flush_rx,
            flush_tx.clone(),
            write_buffer.clone(),
            cfg.buffer_size,
            cfg.flush_interval,
            shutdown.clone(),
        ));

        Ok(Self {
            pool,
            cache,
            write_buffer,
            buffer_size: cfg.buffer_size,
            flush_tx,
            shutdown,
            flush_worker: Mutex::new(Some(worker)),
            short_url_len,
        })
    }

    /// Database liveness check.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Number of URLs currently in the cache.
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    /// Create a short URL.
    ///
    /// With device URLs the row and all device rows commit in one transaction
    /// before the cache is updated; without them the record goes to the write
    /// buffer and the cache immediately, trading durability for latency.
    pub async fn create_short_url(
        &self,
        url: &str,
        title: Option<String>,
        slug: Option<String>,
        expiry: Option<Duration>,
        device_urls: HashMap<Platform, String>,
    ) -> StoreResult<String> {
        if url.is_empty() {
            return Err(StoreError::EmptyUrl);
        }

        let short_code = match slug.filter(|s| !s.is_empty()) {
            Some(slug) => {
                if self.cache.contains(&slug) {
                    return Err(StoreError::Conflict);
                }
                slug
            }
            None => self.generate_unique_code(),
        };

        let now = Utc::now();
        let expires_at = expiry
            .filter(|d| !d.is_zero())
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| now + d);

        let mut record = UrlRecord {
            short_code: short_code.clone(),
            url: url.to_string(),
            title,
            created_at: now,
            expires_at,
            device_urls: None,
        };

        if !device_urls.is_empty() {
            // Synchronous path: device rows must land with the URL row.
            let inserted = db::insert_url_with_devices(&self.pool, &record, &device_urls).await?;
            record.device_urls = Some(inserted);
            self.cache.insert(record);
        } else {
            {
                let mut buf = self.write_buffer.lock().unwrap();
                buf.push(record.clone());
                if buf.len() >= self.buffer_size {
                    let batch =
                        std::mem::replace(&mut *buf, Vec::with_capacity(self.buffer_size));
                    drop(buf);
                    buffer::send_batch(&self.flush_tx, batch);
                }
            }
            self.cache.insert(record);
        }

        Ok(short_code)
    }

    /// Resolve a short code for a redirect. Cache-only for existence; the
    /// database is touched to reap an expired row and to hydrate device URLs
    /// the first time a record is resolved.
    pub async fn get_redirect_data(&self, short_code: &str) -> StoreResult<UrlRecord> {
        let mut record = self.cache.get(short_code).ok_or(StoreError::NotExist)?;

        if let Some(expires_at) = record.expires_at {
            if Utc::now() > expires_at {
                self.cache.remove(short_code);
                if let Err(e) = db::delete_url_row(&self.pool, short_code).await {
                    error!(short_code, error = %e, "failed to delete expired url");
                }
                return Err(StoreError::NotExist);
            }
        }

        if record.device_urls.is_none() {
            match db::fetch_device_urls(&self.pool, short_code).await {
                Ok(device_urls) => {
                    self.cache.set_device_urls(short_code, device_urls.clone());
                    record.device_urls = Some(device_urls);
                }
                Err(e) => {
                    // Serve the base URL rather than failing the redirect.
                    error!(short_code, error = %e, "failed to load device urls");
                }
            }
        }

        Ok(record)
    }

    /// Delete a short URL. The database is authoritative; cascade removes the
    /// device rows, then the cache entry goes away.
    pub async fn delete_url(&self, short_code: &str) -> StoreResult<()> {
        let rows_affected = db::delete_url_row(&self.pool, short_code).await?;
        if rows_affected == 0 {
            return Err(StoreError::NotExist);
        }
        self.cache.remove(short_code);
        Ok(())
    }

    /// Replace target, title, and device URLs in one transaction, then swap
    /// the cache entry.
    pub async fn update_url(
        &self,
        short_code: &str,
        url: &str,
        title: Option<String>,
        device_urls: HashMap<Platform, String>,
    ) -> StoreResult<()> {
        if url.is_empty() {
            return Err(StoreError::EmptyUrl);
        }

        let inserted =
            db::update_url_with_devices(&self.pool, short_code, url, title.as_deref(), &device_urls)
                .await?
                .ok_or(StoreError::NotExist)?;

        let updated = self.cache.update_entry(short_code, |record| {
            record.url = url.to_string();
            record.title = title.clone();
            record.device_urls = Some(inserted.clone());
        });
        if !updated {
            // Row exists but the cache entry is gone; rebuild it from the DB.
            if let Some(mut record) = db::get_url_row(&self.pool, short_code).await? {
                record.device_urls = Some(inserted);
                self.cache.insert(record);
            }
        }

        Ok(())
    }

    /// Paginated listing, newest first, with device URLs attached.
    pub async fn get_urls(&self, page: i64, per_page: i64) -> StoreResult<(Vec<UrlRecord>, i64)> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        Ok(db::list_urls(&self.pool, page, per_page).await?)
    }

    /// Stop the flush worker, drain pending batches, and close the pool.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let worker = self.flush_worker.lock().unwrap().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "flush worker did not shut down cleanly");
            }
        }
        self.pool.close().await;
    }

    fn generate_unique_code(&self) -> String {
        let mut length = self.short_url_len;
        let mut probes = 0;
        loop {
            let code = shortcode::generate(length);
            if !self.cache.contains(&code) {
                return code;
            }
            probes += 1;
            if probes >= MAX_PROBES_PER_LENGTH {
                // Key space at this length is saturated; widen instead of spinning.
                length += 1;
                probes = 0;
            }
        }
    }
}
