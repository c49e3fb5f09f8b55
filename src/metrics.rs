//! Prometheus metrics collection for the relay.
//!
//! Metrics live in `OnceLock` statics and are registered by [`init`]. Every
//! helper is a no-op until then, so library users and unit tests that never
//! call `init` pay nothing.
//!
//! - `relay_subscribers` - currently registered subscribers (gauge)
//! - `relay_upstream_connected` - 1 while the upstream session is live (gauge)
//! - `relay_upstream_connect_attempts_total`
//! - `relay_upstream_connect_failures_total{reason}` - failed connects by error code
//! - `relay_broadcasts_total` - frames queued to subscribers
//! - `relay_subscribers_pruned_total` - subscribers dropped after a failed send
//! - `relay_broadcast_fanout` - recipients per broadcast (histogram)

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{Once, OnceLock};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Upstream `connect()` invocations.
pub static CONNECT_ATTEMPTS: OnceLock<IntCounter> = OnceLock::new();

/// Upstream `connect()` invocations that failed, by error code.
pub static CONNECT_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

/// Frames queued to subscribers by broadcasts.
pub static BROADCASTS: OnceLock<IntCounter> = OnceLock::new();

/// Subscribers removed because their queue was closed or full.
pub static SUBSCRIBERS_PRUNED: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// Gauges (can increase/decrease)
// ========================================================================

/// Currently registered subscribers.
pub static SUBSCRIBERS: OnceLock<IntGauge> = OnceLock::new();

/// 1 while the upstream session is live.
pub static UPSTREAM_CONNECTED: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Histograms
// ========================================================================

pub static BROADCAST_FANOUT: OnceLock<Histogram> = OnceLock::new();

static INIT: Once = Once::new();

/// Initialize the Prometheus metrics registry.
///
/// Call at startup before any metrics are recorded; later calls are no-ops.
pub fn init() {
    INIT.call_once(register_all);
}

fn register_all() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(CONNECT_ATTEMPTS, IntCounter::new("relay_upstream_connect_attempts_total", "Upstream connect attempts"));
    register!(CONNECT_FAILURES, IntCounterVec::new(Opts::new("relay_upstream_connect_failures_total", "Failed upstream connect attempts by reason"), &["reason"]));
    register!(BROADCASTS, IntCounter::new("relay_broadcasts_total", "Frames queued to subscribers"));
    register!(SUBSCRIBERS_PRUNED, IntCounter::new("relay_subscribers_pruned_total", "Subscribers removed after a failed send"));
    register!(SUBSCRIBERS, IntGauge::new("relay_subscribers", "Currently registered subscribers"));
    register!(UPSTREAM_CONNECTED, IntGauge::new("relay_upstream_connected", "Whether the upstream session is live"));
    register!(BROADCAST_FANOUT, Histogram::with_opts(
        HistogramOpts::new("relay_broadcast_fanout", "Recipients per broadcast")
            .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for relay metric updates
// ============================================================================

#[inline]
pub fn set_subscribers(count: usize) {
    if let Some(g) = SUBSCRIBERS.get() {
        g.set(count as i64);
    }
}

#[inline]
pub fn set_upstream_connected(connected: bool) {
    if let Some(g) = UPSTREAM_CONNECTED.get() {
        g.set(i64::from(connected));
    }
}

#[inline]
pub fn inc_connect_attempts() {
    if let Some(c) = CONNECT_ATTEMPTS.get() {
        c.inc();
    }
}

#[inline]
pub fn inc_connect_failures(reason: &str) {
    if let Some(c) = CONNECT_FAILURES.get() {
        c.with_label_values(&[reason]).inc();
    }
}

/// Record one broadcast: frames delivered and subscribers pruned.
#[inline]
pub fn record_broadcast(delivered: usize, pruned: usize) {
    if let Some(c) = BROADCASTS.get() {
        c.inc_by(delivered as u64);
    }
    if pruned > 0
        && let Some(c) = SUBSCRIBERS_PRUNED.get()
    {
        c.inc_by(pruned as u64);
    }
    if let Some(h) = BROADCAST_FANOUT.get() {
        h.observe(delivered as f64);
    }
}
