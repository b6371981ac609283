use tracing::trace;

// Trace-based metrics shims; the Prometheus recorder scrapes what matters,
// these keep per-route counters visible without macro churn.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "stylist.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "stylist.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}
