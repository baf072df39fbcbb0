//! Prometheus metrics setup and the `/metrics` scrape handler. Most
//! counters/histograms are recorded inline at their call site across the
//! workspace (`relay-orchestrator`, `relay-transport`, `relay-cache`);
//! this module only owns the exporter lifecycle and describes the names
//! so a scraping tool sees help text instead of bare numbers.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global Prometheus recorder. Call once at startup, before
/// any `metrics::counter!`/`histogram!` call site runs.
pub fn init_metrics() {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    describe_metrics();

    HANDLE
        .set(handle)
        .unwrap_or_else(|_| panic!("init_metrics called more than once"));
}

fn describe_metrics() {
    metrics::describe_counter!(
        "utterances_emitted_total",
        "Utterances that completed recognize -> translate -> publish"
    );
    metrics::describe_counter!(
        "utterances_below_confidence_threshold_total",
        "Utterances dropped for recognition confidence below the configured floor"
    );
    metrics::describe_counter!(
        "translation_language_failures_total",
        "Per-target-language translate/synthesize failures, isolated from sibling languages"
    );
    metrics::describe_counter!("tts_cache_hits_total", "TTS Cache lookups that found a cached clip");
    metrics::describe_counter!("tts_cache_misses_total", "TTS Cache lookups that required synthesis");
    metrics::describe_counter!(
        "stream_dropped_frames_total",
        "Ingest Stream frames dropped under per-session backpressure"
    );
    metrics::describe_counter!("ws_connections_total", "WebSocket upgrades accepted");
    metrics::describe_counter!("ws_reconnects_total", "WebSocket upgrades that reclaimed an existing session");
    metrics::describe_counter!(
        "ws_heartbeat_timeouts_total",
        "Sessions torn down after missing their heartbeat deadline"
    );
    metrics::describe_counter!("ws_rate_limited_frames_total", "Inbound audio frames dropped by the per-session rate limiter");
    metrics::describe_histogram!(
        "utterance_pipeline_latency_ms",
        "Wall-clock time from utterance segmentation to Delivery Bus publish"
    );
}

/// Render the current metric set in Prometheus text exposition format.
pub async fn metrics_handler() -> String {
    HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_else(|| "# metrics recorder not initialized\n".to_string())
}
