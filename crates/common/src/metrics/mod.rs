//! Metrics for pipeline runs
//!
//! Counters and histograms go through the `metrics` facade; without an
//! installed recorder they are no-ops.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Paperstack metrics
pub const METRICS_PREFIX: &str = "paperstack";

/// Register all metric descriptions
pub fn register_metrics() {
    // Store metrics
    describe_counter!(
        format!("{}_store_papers_fetched_total", METRICS_PREFIX),
        Unit::Count,
        "Papers read from the store"
    );

    describe_counter!(
        format!("{}_store_papers_written_total", METRICS_PREFIX),
        Unit::Count,
        "Papers created or updated in the store"
    );

    describe_counter!(
        format!("{}_papers_added_total", METRICS_PREFIX),
        Unit::Count,
        "New papers merged into the catalog"
    );

    // Search metrics
    describe_counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Search attempts, including operator retries"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Search latency in seconds"
    );

    // Labeling metrics
    describe_counter!(
        format!("{}_labels_assigned_total", METRICS_PREFIX),
        Unit::Count,
        "Enrichment fields populated"
    );

    describe_counter!(
        format!("{}_labeling_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Failed labeling calls"
    );

    describe_histogram!(
        format!("{}_labeling_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Labeling call latency in seconds"
    );

    tracing::debug!("Metrics registered");
}

/// Times one labeling call
pub struct LabelingTimer {
    start: Instant,
    stage: &'static str,
    backend: String,
}

impl LabelingTimer {
    pub fn start(stage: &'static str, backend: &str) -> Self {
        Self {
            start: Instant::now(),
            stage,
            backend: backend.to_string(),
        }
    }

    /// Record call completion
    pub fn finish(self, success: bool) {
        let duration = self.start.elapsed().as_secs_f64();

        if success {
            counter!(
                format!("{}_labels_assigned_total", METRICS_PREFIX),
                "stage" => self.stage,
                "backend" => self.backend.clone()
            )
            .increment(1);
        } else {
            counter!(
                format!("{}_labeling_errors_total", METRICS_PREFIX),
                "stage" => self.stage,
                "backend" => self.backend.clone()
            )
            .increment(1);
        }

        histogram!(
            format!("{}_labeling_duration_seconds", METRICS_PREFIX),
            "stage" => self.stage,
            "backend" => self.backend
        )
        .record(duration);
    }
}

/// Record one search attempt
pub fn record_search(duration_secs: f64, outcome: &'static str) {
    counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(format!("{}_search_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record papers read from the store
pub fn record_store_fetch(count: usize) {
    counter!(format!("{}_store_papers_fetched_total", METRICS_PREFIX)).increment(count as u64);
}

/// Record new papers merged in one run
pub fn record_papers_added(count: usize) {
    counter!(format!("{}_papers_added_total", METRICS_PREFIX)).increment(count as u64);
}

/// Record papers written to the store
pub fn record_store_write(created: u64, updated: u64) {
    counter!(
        format!("{}_store_papers_written_total", METRICS_PREFIX),
        "op" => "create"
    )
    .increment(created);
    counter!(
        format!("{}_store_papers_written_total", METRICS_PREFIX),
        "op" => "update"
    )
    .increment(updated);
}
