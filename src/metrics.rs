//! Prometheus exposition for the service counters.

use axum::{routing::get, Router};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and pre-register the series that are
    /// only incremented on rare paths, so they show up from the start.
    pub fn init() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");

        describe_counter!("ai_calls_total", "Generative API calls attempted.");
        describe_counter!("ai_retries_total", "Generative API retries after overload.");
        describe_counter!("issues_generated_total", "Issues accepted into briefs.");
        describe_counter!(
            "issues_discarded_duplicate_total",
            "Issues discarded by the dedup gate."
        );
        describe_counter!("briefs_generated_total", "Daily briefs generated.");
        describe_counter!("jobs_spawned_total", "Background jobs spawned.");
        describe_counter!("jobs_failed_total", "Background jobs that failed or timed out.");

        Self { handle }
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
