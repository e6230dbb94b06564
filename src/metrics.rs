use tracing::trace;

// Trace-based counters; the Prometheus recorder installed in main renders
// whatever exporters are wired on top of these events.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "catalog.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "catalog.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn sync_outcome(owner_id: &str, loaded: usize, failed: usize) {
    trace!(
        target = "catalog.metrics",
        owner_id = owner_id,
        loaded = loaded as u64,
        failed = failed as u64,
        "sync_outcome"
    );
}
