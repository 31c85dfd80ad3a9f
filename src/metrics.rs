use metrics::{describe_counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus metrics recorder and describe the pipeline's
/// counters. Called once at server startup.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();

    let handle = builder
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    init_metric_descriptions();

    handle
}

fn init_metric_descriptions() {
    describe_counter!("dns_lines_read_total", "Log lines handed to the decoder");
    describe_counter!(
        "dns_decode_failures_total",
        "Lines that could not be decoded into an event"
    );
    describe_counter!(
        "dns_events_dropped_total",
        "Events evicted from the ingestion buffer on overflow"
    );
    describe_counter!(
        "dns_batches_written_total",
        "Batches committed to the store"
    );
    describe_counter!(
        "dns_batches_lost_total",
        "Batches dropped after exhausting write retries"
    );
    describe_counter!("dns_rows_written_total", "Event rows committed to the store");
    describe_counter!("dns_store_reads_total", "Aggregate reads served by the store");
    describe_counter!("dns_cache_hits_total", "Aggregate results served from cache");
    describe_counter!(
        "dns_cache_misses_total",
        "Aggregate results recomputed from the store"
    );
    describe_counter!(
        "dns_source_rotations_total",
        "Log source rotations or truncations detected"
    );
    describe_counter!(
        "dns_timestamp_anomalies_total",
        "Backward timestamp jumps observed without a rotation"
    );

    gauge!("dns_monitor_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}
