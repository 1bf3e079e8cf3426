use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Metric name prefix for all review engine metrics
const PREFIX: &str = "tunedin";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Track review mutations
    pub static ref REVIEW_MUTATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_review_mutations_total"), "Track review mutations by operation and outcome"),
        &["operation", "status"]
    ).expect("Failed to create review_mutations_total metric");

    // Album aggregate
    pub static ref ALBUM_RECOMPUTE_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_album_recompute_total"), "Album aggregate recomputations by outcome"),
        &["status"]
    ).expect("Failed to create album_recompute_total metric");

    pub static ref METADATA_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_metadata_failures_total"), "Failed metadata provider lookups"),
        &["lookup"]
    ).expect("Failed to create metadata_failures_total metric");

    // Rescoring
    pub static ref RESCORE_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_rescore_duration_seconds"),
            "Time spent re-ranking and rescoring a user's reviews"
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5])
    ).expect("Failed to create rescore_duration_seconds metric");
}

/// Initialize all metrics and register them with the registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(REVIEW_MUTATIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ALBUM_RECOMPUTE_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(METADATA_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RESCORE_DURATION_SECONDS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_review_mutation(operation: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    REVIEW_MUTATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

/// `status` is one of "updated", "created", "skipped" or "failed".
pub fn record_album_recompute(status: &str) {
    ALBUM_RECOMPUTE_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_metadata_failure(lookup: &str) {
    METADATA_FAILURES_TOTAL.with_label_values(&[lookup]).inc();
}

pub fn record_rescore(duration: Duration) {
    RESCORE_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Renders the registry in the Prometheus text exposition format.
pub fn gather_text() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        init_metrics();

        let metric_families = REGISTRY.gather();
        assert!(!metric_families.is_empty(), "Metrics should be registered");
    }

    #[test]
    fn test_record_review_mutation() {
        init_metrics();

        let before = REVIEW_MUTATIONS_TOTAL
            .with_label_values(&["create", "success"])
            .get();
        record_review_mutation("create", true);
        let after = REVIEW_MUTATIONS_TOTAL
            .with_label_values(&["create", "success"])
            .get();
        assert!(after > before);
    }

    #[test]
    fn test_record_metadata_failure() {
        init_metrics();

        let before = METADATA_FAILURES_TOTAL.with_label_values(&["track"]).get();
        record_metadata_failure("track");
        let after = METADATA_FAILURES_TOTAL.with_label_values(&["track"]).get();
        assert!(after > before);
    }

    #[test]
    fn test_gather_text_contains_prefix() {
        init_metrics();
        record_album_recompute("skipped");
        record_rescore(Duration::from_millis(2));

        let text = gather_text().unwrap();
        assert!(text.contains("tunedin_album_recompute_total"));
        assert!(text.contains("tunedin_rescore_duration_seconds"));
    }
}
