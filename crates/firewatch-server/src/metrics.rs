use metrics::counter;
use std::sync::OnceLock;

static METRICS_INIT: OnceLock<()> = OnceLock::new();

pub fn init_metrics() {
    METRICS_INIT.get_or_init(|| {
        // Counters register themselves on first use
    });
}

pub fn record_mutation(op: &str) {
    counter!("mutations_total", "op" => op.to_string()).increment(1);
}

pub fn record_rollback(op: &str) {
    counter!("rollbacks_total", "op" => op.to_string()).increment(1);
}

pub fn record_store_upsert() {
    counter!("store_upserts_total").increment(1);
}

pub fn record_store_remove() {
    counter!("store_removes_total").increment(1);
}
