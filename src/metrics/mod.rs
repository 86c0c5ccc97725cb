//! Global metrics registry
//!
//! Counters and gauges shared by the store, redirect, and analytics paths.
//! Exposition is left to the embedder; everything here is a plain registry.

use prometheus::{IntCounter, IntGauge, Registry};
use std::sync::OnceLock;

/// Global metrics instance (initialized explicitly via `init_metrics()`)
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the global metrics registry.
///
/// Returns `Ok(())` if metrics were successfully created and registered,
/// or if they were already initialized.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if METRICS.get().is_some() {
        return Ok(());
    }
    let metrics = Metrics::try_new()?;
    // Another thread may have initialized between our check and here; that's fine.
    let _ = METRICS.set(metrics);
    Ok(())
}

/// Get a reference to the global metrics, if initialized.
pub fn get_metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

/// Application metrics container
pub struct Metrics {
    registry: Registry,

    /// Number of URLs currently held in the in-memory cache
    pub urls_stored: IntGauge,
    /// Total number of short URLs created
    pub urls_shortened_total: IntCounter,
    /// Total number of successful redirects served
    pub redirects_total: IntCounter,
    /// Redirect lookups that resolved to nothing
    pub redirect_failures_total: IntCounter,
    /// Analytics events dropped because the event channel was full
    pub analytics_events_dropped_total: IntCounter,
    /// Write batches dropped because the flush channel was full
    pub flush_batches_dropped_total: IntCounter,
    /// Write batches discarded after exhausting flush retries
    pub flush_failures_total: IntCounter,
}

impl Metrics {
    fn try_new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let urls_stored = IntGauge::new(
            "shrike_urls_stored",
            "Number of URLs currently held in the in-memory cache",
        )?;
        let urls_shortened_total = IntCounter::new(
            "shrike_urls_shortened_total",
            "Total number of short URLs created",
        )?;
        let redirects_total = IntCounter::new(
            "shrike_redirects_total",
            "Total number of successful redirects served",
        )?;
        let redirect_failures_total = IntCounter::new(
            "shrike_redirect_failures_total",
            "Redirect lookups that resolved to nothing",
        )?;
        let analytics_events_dropped_total = IntCounter::new(
            "shrike_analytics_events_dropped_total",
            "Analytics events dropped because the event channel was full",
        )?;
        let flush_batches_dropped_total = IntCounter::new(
            "shrike_flush_batches_dropped_total",
            "Write batches dropped because the flush channel was full",
        )?;
        let flush_failures_total = IntCounter::new(
            "shrike_flush_failures_total",
            "Write batches discarded after exhausting flush retries",
        )?;

        registry.register(Box::new(urls_stored.clone()))?;
        registry.register(Box::new(urls_shortened_total.clone()))?;
        registry.register(Box::new(redirects_total.clone()))?;
        registry.register(Box::new(redirect_failures_total.clone()))?;
        registry.register(Box::new(analytics_events_dropped_total.clone()))?;
        registry.register(Box::new(flush_batches_dropped_total.clone()))?;
        registry.register(Box::new(flush_failures_total.clone()))?;

        Ok(Self {
            registry,
            urls_stored,
            urls_shortened_total,
            redirects_total,
            redirect_failures_total,
            analytics_events_dropped_total,
            flush_batches_dropped_total,
            flush_failures_total,
        })
    }

    /// The underlying registry, for embedders that expose it.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
