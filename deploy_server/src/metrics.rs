//! Prometheus metrics for deployment pipeline observability.

use metrics::{counter, histogram};

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record a deploy request received over HTTP.
pub fn deploy_requested() {
    counter!("deploy_requests_total").increment(1);
}

/// Record a job entering a pipeline stage.
pub fn stage_entered(stage: &'static str) {
    counter!("deploy_stage_transitions_total", "stage" => stage).increment(1);
}

/// Record a finished job.
pub fn job_finished(status: &'static str, duration_ms: u64) {
    counter!("deploy_jobs_total", "status" => status).increment(1);
    histogram!("deploy_duration_ms", "status" => status).record(duration_ms as f64);
}

/// Record uploaded artifact files.
pub fn files_uploaded(count: usize) {
    counter!("deploy_uploaded_files_total").increment(count as u64);
}

/// Record a host resource that could not be released.
pub fn cleanup_failed(resource: &'static str) {
    counter!("deploy_cleanup_failures_total", "resource" => resource).increment(1);
}
