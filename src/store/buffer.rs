use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::metrics::get_metrics;
use crate::models::UrlRecord;

use super::db;

/// Batches the flush channel can hold before hand-off starts dropping.
pub const FLUSH_CHANNEL_CAPACITY: usize = 100;

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Staging area for creates on the buffered path.
///
/// Guarded by its own mutex, held only for the append and the swap-out, so
/// batch hand-off never contends with the URL cache lock.
pub type WriteBuffer = Arc<Mutex<Vec<UrlRecord>>>;

pub fn new_buffer(capacity: usize) -> WriteBuffer {
    Arc::new(Mutex::new(Vec::with_capacity(capacity)))
}

/// Swap the buffer contents out and hand them to the flush worker.
///
/// A full channel drops the batch with a warning; the cache still serves the
/// records, but they will not reach the database unless re-created.
pub fn hand_off(buffer: &WriteBuffer, tx: &mpsc::Sender<Vec<UrlRecord>>, capacity: usize) {
    let batch = {
        let mut buf = buffer.lock().unwrap();
        if buf.is_empty() {
            return;
        }
        std::mem::replace(&mut *buf, Vec::with_capacity(capacity))
    };
    send_batch(tx, batch);
}

pub fn send_batch(tx: &mpsc::Sender<Vec<UrlRecord>>, batch: Vec<UrlRecord>) {
    let count = batch.len();
    if tx.try_send(batch).is_err() {
        warn!(count, "flush channel full, dropping batch");
        if let Some(metrics) = get_metrics() {
            metrics.flush_batches_dropped_total.inc();
        }
    }
}

/// Single flush worker: owns all database writes for the buffered path.
///
/// The ticker and the size trigger both feed batches through the hand-off
/// channel; on shutdown the worker drains in-flight batches and flushes the
/// residual buffer before exiting.
pub async fn run_flush_worker(
    pool: SqlitePool,
    mut rx: mpsc::Receiver<Vec<UrlRecord>>,
    tx: mpsc::Sender<Vec<UrlRecord>>,
    buffer: WriteBuffer,
    capacity: usize,
    flush_interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(flush_interval);
    // The first tick fires immediately; there is nothing to flush yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                hand_off(&buffer, &tx, capacity);
            }
            batch = rx.recv() => {
                match batch {
                    Some(batch) => flush_with_retry(&pool, batch).await,
                    None => return,
                }
            }
            _ = shutdown.cancelled() => {
                while let Ok(batch) = rx.try_recv() {
                    flush_with_retry(&pool, batch).await;
                }
                let residual = {
                    let mut buf = buffer.lock().unwrap();
                    std::mem::take(&mut *buf)
                };
                if !residual.is_empty() {
                    flush_with_retry(&pool, residual).await;
                }
                return;
            }
        }
    }
}

async fn flush_with_retry(pool: &SqlitePool, batch: Vec<UrlRecord>) {
    let count = batch.len();
    for attempt in 1..=MAX_RETRIES {
        match db::insert_batch(pool, &batch).await {
            Ok(()) => {
                info!(count, "flushed urls to database");
                return;
            }
            Err(e) if attempt < MAX_RETRIES => {
                warn!(error = %e, attempt, count, "flush failed, retrying");
                tokio::time::sleep(RETRY_DELAY * attempt).await;
            }
            Err(e) => {
                error!(error = %e, count, "flush failed after retries");
                if let Some(metrics) = get_metrics() {
                    metrics.flush_failures_total.inc();
                }
            }
        }
    }
}
