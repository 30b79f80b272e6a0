//! Harvest observability metrics
//!
//! Counters and histograms for outbound requests, rate limits, retries and
//! per-unit outcomes. Recording is always cheap: without an installed
//! recorder the `metrics` macros are no-ops, so the exporter is optional.
//!
//! ## Architecture
//!
//! - `metrics` facade for collection
//! - Prometheus exporter started only when `--metrics-addr` is given

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

static METRICS_INITIALIZED: Lazy<AtomicBool> = Lazy::new(|| AtomicBool::new(false));

static CORRELATION_COUNTER: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(0));

/// Initialize the Prometheus exporter.
///
/// Idempotent: a second call is a no-op.
///
/// # Arguments
/// * `addr` - Socket address of the scrape endpoint (e.g. `127.0.0.1:9090`)
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        METRICS_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(format!("Failed to install Prometheus exporter: {e}"));
    }

    describe_counter!(
        "aemet_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to AEMET OpenData"
    );
    describe_counter!(
        "aemet_rate_limited_total",
        Unit::Count,
        "Responses classified as rate limited (HTTP or body status 429)"
    );
    describe_counter!(
        "aemet_retries_total",
        Unit::Count,
        "Total number of retry attempts"
    );
    describe_histogram!(
        "aemet_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_histogram!(
        "aemet_retry_backoff_seconds",
        Unit::Seconds,
        "Wait before a retry in seconds"
    );
    describe_counter!(
        "harvest_units_total",
        Unit::Count,
        "Work units processed, by outcome"
    );

    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Whether the exporter has been installed
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.load(Ordering::SeqCst)
}

/// Next request correlation id (`req-0000002a`)
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Timing and outcome of one outbound request
pub struct HttpRequestMetrics {
    endpoint: &'static str,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start recording a request. `endpoint` is a low-cardinality label.
    pub fn start(endpoint: &'static str, attempt: u32) -> Self {
        let correlation_id = generate_correlation_id();
        debug!(
            correlation_id = %correlation_id,
            endpoint = endpoint,
            attempt = attempt,
            "Starting HTTP request"
        );

        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record a response with its status code
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "aemet_requests_total",
            "endpoint" => self.endpoint,
            "status" => status_code.to_string(),
        )
        .increment(1);
        histogram!("aemet_request_duration_seconds", "endpoint" => self.endpoint)
            .record(duration.as_secs_f64());

        if status_code == 429 {
            self.record_rate_limited();
        }

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = self.endpoint,
            status = status_code,
            duration_ms = duration.as_millis() as u64,
            "HTTP request completed"
        );
    }

    /// Record a 429 found in the body of a 2xx response
    pub fn record_rate_limited(&self) {
        counter!("aemet_rate_limited_total", "endpoint" => self.endpoint).increment(1);
        warn!(
            correlation_id = %self.correlation_id,
            endpoint = self.endpoint,
            attempt = self.attempt,
            "Rate limit (429) recorded"
        );
    }

    /// Record a transport failure (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "aemet_requests_total",
            "endpoint" => self.endpoint,
            "status" => "network_error",
        )
        .increment(1);
        histogram!("aemet_request_duration_seconds", "endpoint" => self.endpoint)
            .record(duration.as_secs_f64());

        warn!(
            correlation_id = %self.correlation_id,
            endpoint = self.endpoint,
            attempt = self.attempt,
            duration_ms = duration.as_millis() as u64,
            "Network error recorded"
        );
    }

    /// Correlation id of this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record a retry wait
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!("aemet_retries_total").increment(1);
    histogram!("aemet_retry_backoff_seconds").record(duration.as_secs_f64());

    debug!(
        attempt = attempt,
        backoff_ms = duration.as_millis() as u64,
        "Retry backoff recorded"
    );
}

/// Per-unit outcome tracking
pub struct HarvestMetrics {
    phase: &'static str,
    unit: String,
    start_time: Instant,
}

impl HarvestMetrics {
    /// Start tracking a unit of the given harvest (`historical`, `forecast`, `replay`)
    pub fn start(phase: &'static str, unit: impl Into<String>) -> Self {
        Self {
            phase,
            unit: unit.into(),
            start_time: Instant::now(),
        }
    }

    /// Unit fetched and merged
    pub fn record_success(&self, items_count: usize) {
        counter!("harvest_units_total", "phase" => self.phase, "outcome" => "succeeded")
            .increment(1);
        info!(
            phase = self.phase,
            unit = %self.unit,
            items_count = items_count,
            duration_ms = self.start_time.elapsed().as_millis() as u64,
            "Unit harvested"
        );
    }

    /// Unit answered with no data
    pub fn record_empty(&self) {
        counter!("harvest_units_total", "phase" => self.phase, "outcome" => "empty").increment(1);
        info!(phase = self.phase, unit = %self.unit, "No data for unit, skipping");
    }

    /// Unit failed terminally
    pub fn record_failure(&self, error: &str) {
        counter!("harvest_units_total", "phase" => self.phase, "outcome" => "failed").increment(1);
        error!(
            phase = self.phase,
            unit = %self.unit,
            error = %error,
            duration_ms = self.start_time.elapsed().as_millis() as u64,
            "Unit failed"
        );
    }
}
