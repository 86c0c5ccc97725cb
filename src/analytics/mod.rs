//! Analytics fan-out: one bounded event channel, N workers, M sinks.
//!
//! Tracking is strictly fire-and-forget. A full channel drops the event with
//! a warning; a failing sink is logged and the remaining sinks still get the
//! event. Redirect latency never depends on sink health.

pub mod access_log;
pub mod matomo;
pub mod plausible;
pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{AnalyticsConfig, ProviderConfig};
use crate::metrics::get_metrics;

pub use access_log::AccessLogDispatcher;
pub use matomo::MatomoDispatcher;
pub use plausible::PlausibleDispatcher;
pub use webhook::WebhookDispatcher;

/// Events the channel holds before tracking starts dropping.
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// One tracked redirect, as handed to every dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub domain: String,
    pub url: String,
    pub referrer: String,
    pub user_agent: String,
    pub user_ip: String,
    pub remote_addr: String,
    pub timestamp: String,
    pub short_code: String,
    pub target_url: String,
}

/// A configured analytics delivery target.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, event: &Event) -> anyhow::Result<()>;
    async fn close(&self) -> anyhow::Result<()>;
}

/// Owns the event channel, the worker tasks, and the dispatchers.
pub struct Manager {
    tx: mpsc::Sender<Event>,
    rx: Arc<Mutex<mpsc::Receiver<Event>>>,
    dispatchers: Arc<Vec<Box<dyn Dispatcher>>>,
    num_workers: usize,
    shutdown: CancellationToken,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Manager {
    /// Build dispatchers from the configured providers.
    ///
    /// Returns `Ok(None)` when analytics is disabled. Provider configs were
    /// validated at parse time, but sink construction (e.g. opening the
    /// access log) can still fail here and aborts startup.
    pub async fn new(cfg: &AnalyticsConfig) -> anyhow::Result<Option<Self>> {
        if !cfg.enabled {
            return Ok(None);
        }

        let mut dispatchers: Vec<Box<dyn Dispatcher>> = Vec::with_capacity(cfg.providers.len());
        for provider in &cfg.providers {
            let dispatcher: Box<dyn Dispatcher> = match provider {
                ProviderConfig::Plausible(p) => Box::new(PlausibleDispatcher::new(p)?),
                ProviderConfig::Matomo(p) => Box::new(MatomoDispatcher::new(p)?),
                ProviderConfig::Webhook(p) => Box::new(WebhookDispatcher::new(p)?),
                ProviderConfig::AccessLog(p) => Box::new(AccessLogDispatcher::new(p).await?),
            };
            info!(provider = dispatcher.name(), "initialized analytics provider");
            dispatchers.push(dispatcher);
        }

        Ok(Some(Self::with_dispatchers(dispatchers, cfg.num_workers)))
    }

    /// Assemble a manager around prebuilt dispatchers.
    pub fn with_dispatchers(dispatchers: Vec<Box<dyn Dispatcher>>, num_workers: usize) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            dispatchers: Arc::new(dispatchers),
            num_workers: num_workers.max(1),
            shutdown: CancellationToken::new(),
            workers: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker tasks.
    pub fn start(&self) {
        let mut workers = self.workers.lock().unwrap();
        for worker_id in 0..self.num_workers {
            let rx = Arc::clone(&self.rx);
            let dispatchers = Arc::clone(&self.dispatchers);
            let shutdown = self.shutdown.clone();
            workers.push(tokio::spawn(worker(worker_id, rx, dispatchers, shutdown)));
        }
    }

    /// Non-blocking enqueue; a full channel drops the event with a warning.
    pub fn track(&self, event: Event) {
        if self.tx.try_send(event).is_err() {
            warn!("analytics channel full, dropping event");
            if let Some(metrics) = get_metrics() {
                metrics.analytics_events_dropped_total.inc();
            }
        }
    }

    /// Cancel the workers and close every dispatcher, best-effort.
    ///
    /// Late events still in the channel are dropped rather than awaited.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for worker in workers {
            let _ = worker.await;
        }
        for dispatcher in self.dispatchers.iter() {
            if let Err(e) = dispatcher.close().await {
                error!(provider = dispatcher.name(), error = %e, "failed to close dispatcher");
            }
        }
    }
}

async fn worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Event>>>,
    dispatchers: Arc<Vec<Box<dyn Dispatcher>>>,
    shutdown: CancellationToken,
) {
    info!(worker_id, "starting analytics worker");

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => return,
            event = async { rx.lock().await.recv().await } => {
                match event {
                    Some(event) => event,
                    None => return,
                }
            }
        };

        // Shutdown also cancels a delivery already in flight.
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = deliver(&dispatchers, &event) => {}
        }
    }
}

/// Hand one event to every sink; one failure never starves the rest.
async fn deliver(dispatchers: &[Box<dyn Dispatcher>], event: &Event) {
    for dispatcher in dispatchers {
        if let Err(e) = dispatcher.send(event).await {
            error!(provider = dispatcher.name(), error = %e, "failed to send event");
        }
    }
}
