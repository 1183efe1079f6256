use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus exporter and register all application metrics.
/// Returns a `PrometheusHandle` whose `render()` method produces the
/// text/plain Prometheus scrape payload.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // Pre-register counters so they appear even before the first increment.
    counter!("copy_jobs_enqueued_total").absolute(0);
    counter!("copy_jobs_completed_total").absolute(0);
    counter!("copy_jobs_retried_total").absolute(0);
    counter!("copy_jobs_dead_total").absolute(0);
    counter!("copy_jobs_skipped_total").absolute(0);
    counter!("copy_orders_opened_total").absolute(0);
    counter!("copy_orders_closed_total").absolute(0);
    counter!("copy_compensations_total").absolute(0);
    counter!("copy_compensation_failures_total").absolute(0);

    gauge!("copy_jobs_pending").set(0.0);

    handle
}
