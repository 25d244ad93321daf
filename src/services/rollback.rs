use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::metrics;
use crate::services::batch_store::BatchStore;

/// Undo state for one applied forward step, recorded in arrival order and
/// replayed in reverse. The manual equivalent of a transaction log entry.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoRecord {
    /// A source batch was decremented; restore its previous quantity.
    Deduction { batch_id: Uuid, quantity_before: i32 },
    /// An existing destination batch was incremented; restore its previous
    /// quantity.
    CreditUpdate { batch_id: Uuid, quantity_before: i32 },
    /// A destination batch was inserted; delete it.
    CreditInsert { batch_id: Uuid },
}

impl UndoRecord {
    pub fn batch_id(&self) -> Uuid {
        match self {
            UndoRecord::Deduction { batch_id, .. }
            | UndoRecord::CreditUpdate { batch_id, .. }
            | UndoRecord::CreditInsert { batch_id } => *batch_id,
        }
    }
}

/// Replays undo records most-recently-applied first. Best-effort: a failed
/// undo step is logged and counted, and the remaining steps are still
/// attempted; nothing is ever raised to the caller.
pub struct CompensatingRollback {
    store: Arc<dyn BatchStore>,
}

impl CompensatingRollback {
    pub fn new(store: Arc<dyn BatchStore>) -> Self {
        Self { store }
    }

    /// Returns the number of undo steps that could not be applied.
    pub async fn undo(&self, records: &[UndoRecord]) -> usize {
        let mut failed = 0usize;

        for record in records.iter().rev() {
            let result = match record {
                UndoRecord::Deduction {
                    batch_id,
                    quantity_before,
                }
                | UndoRecord::CreditUpdate {
                    batch_id,
                    quantity_before,
                } => {
                    self.store
                        .restore_quantity(*batch_id, *quantity_before)
                        .await
                }
                UndoRecord::CreditInsert { batch_id } => self.store.delete_batch(*batch_id).await,
            };

            match result {
                Ok(()) => {
                    metrics::ROLLBACK_STEPS.inc();
                }
                Err(e) => {
                    failed += 1;
                    metrics::ROLLBACK_STEP_FAILURES.inc();
                    error!(
                        batch_id = %record.batch_id(),
                        error = %e,
                        "Rollback step failed; continuing with remaining steps"
                    );
                }
            }
        }

        if !records.is_empty() {
            info!(
                steps = records.len(),
                failed, "Compensating rollback finished"
            );
        }

        failed
    }
}

/// A forward step failed: `applied` holds the undo records for every step
/// that durably changed a row before the failure (the failing step itself
/// made no durable change). The orchestrator owns the rollback decision.
#[derive(Debug)]
pub struct StepFailure {
    pub applied: Vec<UndoRecord>,
    pub error: ServiceError,
}

impl StepFailure {
    pub fn new(applied: Vec<UndoRecord>, error: ServiceError) -> Self {
        Self { applied, error }
    }
}
