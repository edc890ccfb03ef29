use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};
use tracing::info;

use crate::Category;

struct AgentMetrics {
    evaluated: Counter<u64>,
    admitted: Counter<u64>,
    duplicates: Counter<u64>,
    provider_failures: Counter<u64>,
    run_duration_ms: Histogram<f64>,
}

static METRICS: OnceCell<AgentMetrics> = OnceCell::new();

fn handles() -> &'static AgentMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("newsscout.agents");
        AgentMetrics {
            evaluated: meter
                .u64_counter("candidates_evaluated_total")
                .with_description("Candidates sent to the evaluator")
                .init(),
            admitted: meter
                .u64_counter("articles_admitted_total")
                .with_description("Articles admitted by specialist agents")
                .init(),
            duplicates: meter
                .u64_counter("duplicates_filtered_total")
                .with_description("Candidates dropped as recently stored content")
                .init(),
            provider_failures: meter
                .u64_counter("provider_failures_total")
                .with_description("Search, evaluation and refinement calls that failed")
                .init(),
            run_duration_ms: meter
                .f64_histogram("agent_run_duration_ms")
                .with_description("Specialist agent runtime in milliseconds")
                .init(),
        }
    })
}

/// Hint to operators that OTEL metrics export can be configured externally.
pub fn init_metrics_from_env(service_name: &str) {
    if std::env::var("NEWSSCOUT_OTEL_METRICS_ENDPOINT").is_ok() {
        info!(
            target = "telemetry",
            "NEWSSCOUT_OTEL_METRICS_ENDPOINT detected for {service_name}. Configure an OTLP meter provider in your deployment to export agent metrics."
        );
    }
}

pub fn record_evaluated(category: Category, count: usize) {
    handles().evaluated.add(
        count as u64,
        &[KeyValue::new("category", category.slug())],
    );
}

pub fn record_admitted(category: Category, count: usize) {
    handles()
        .admitted
        .add(count as u64, &[KeyValue::new("category", category.slug())]);
}

pub fn record_duplicates(count: usize) {
    handles().duplicates.add(count as u64, &[]);
}

/// `stage` is one of `search`, `evaluate`, `refine`, `persist`.
pub fn record_provider_failure(category: Category, stage: &'static str) {
    handles().provider_failures.add(
        1,
        &[
            KeyValue::new("category", category.slug()),
            KeyValue::new("stage", stage),
        ],
    );
}

pub fn record_run_duration(category: Category, duration_ms: u64, admitted: usize) {
    handles().run_duration_ms.record(
        duration_ms as f64,
        &[
            KeyValue::new("category", category.slug()),
            KeyValue::new("admitted", admitted as i64),
        ],
    );
}
