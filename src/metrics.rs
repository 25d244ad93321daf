use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

use crate::errors::ServiceError;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref SALES_COMPLETED: IntCounter =
        IntCounter::new("sales_completed_total", "Total number of completed sales")
            .expect("metric can be created");
    pub static ref SALES_FAILED: IntCounter =
        IntCounter::new("sales_failed_total", "Total number of failed sales")
            .expect("metric can be created");
    pub static ref TRANSFERS_COMPLETED: IntCounter = IntCounter::new(
        "transfers_completed_total",
        "Total number of completed stock transfers"
    )
    .expect("metric can be created");
    pub static ref TRANSFERS_FAILED: IntCounter = IntCounter::new(
        "transfers_failed_total",
        "Total number of failed stock transfers"
    )
    .expect("metric can be created");
    pub static ref ROLLBACK_STEPS: IntCounter = IntCounter::new(
        "rollback_steps_total",
        "Total number of compensating rollback steps applied"
    )
    .expect("metric can be created");
    pub static ref ROLLBACK_STEP_FAILURES: IntCounter = IntCounter::new(
        "rollback_step_failures_total",
        "Total number of compensating rollback steps that failed"
    )
    .expect("metric can be created");
    pub static ref LEDGER_DIVERGENCES: IntCounter = IntCounter::new(
        "ledger_divergences_total",
        "Sales where stock was deducted but the ledger write failed"
    )
    .expect("metric can be created");
}

/// Registers all counters with the shared registry. Safe to call once at
/// startup; repeated registration errors are ignored.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(SALES_COMPLETED.clone()),
        Box::new(SALES_FAILED.clone()),
        Box::new(TRANSFERS_COMPLETED.clone()),
        Box::new(TRANSFERS_FAILED.clone()),
        Box::new(ROLLBACK_STEPS.clone()),
        Box::new(ROLLBACK_STEP_FAILURES.clone()),
        Box::new(LEDGER_DIVERGENCES.clone()),
    ];
    for collector in collectors {
        let _ = REGISTRY.register(collector);
    }
}

/// Renders the registry in prometheus text format for the `/metrics` route.
pub fn metrics_handler() -> Result<String, ServiceError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| ServiceError::InternalError(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| ServiceError::InternalError(format!("Metrics are not valid UTF-8: {}", e)))
}
