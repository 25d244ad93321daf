use std::sync::Arc;
use tracing::{instrument, warn};

use crate::errors::ServiceError;
use crate::services::allocation::AllocationPlan;
use crate::services::batch_store::BatchStore;
use crate::services::rollback::{StepFailure, UndoRecord};

/// Applies an allocation plan against source batches, one row at a time.
///
/// Each step re-reads the batch before writing so the conditional write is
/// anchored to fresh state, and captures the pre-write quantity for rollback.
/// The first failing step stops the walk; its own write never landed, so the
/// returned failure carries undo records only for the steps before it.
pub struct DeductionExecutor {
    store: Arc<dyn BatchStore>,
}

impl DeductionExecutor {
    pub fn new(store: Arc<dyn BatchStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, plan), fields(steps = plan.deductions.len()))]
    pub async fn apply(&self, plan: &AllocationPlan) -> Result<Vec<UndoRecord>, StepFailure> {
        let mut applied = Vec::with_capacity(plan.deductions.len());

        for step in &plan.deductions {
            let batch = match self.store.find_batch(step.batch_id).await {
                Ok(Some(batch)) => batch,
                Ok(None) => {
                    warn!(batch_id = %step.batch_id, "Planned batch vanished before deduction");
                    return Err(StepFailure::new(
                        applied,
                        ServiceError::NotFound(format!(
                            "Batch {} no longer exists",
                            step.batch_id
                        )),
                    ));
                }
                Err(e) => return Err(StepFailure::new(applied, e)),
            };

            // The plan was computed against an earlier read; if stock has
            // shrunk below the planned amount in the meantime, deducting
            // would drive the quantity negative.
            if batch.quantity_on_hand < step.quantity {
                warn!(
                    batch_id = %step.batch_id,
                    on_hand = batch.quantity_on_hand,
                    planned = step.quantity,
                    "Batch quantity shrank below the planned deduction"
                );
                return Err(StepFailure::new(
                    applied,
                    ServiceError::ConcurrentModification(step.batch_id),
                ));
            }

            let before = batch.quantity_on_hand;
            match self
                .store
                .update_quantity(step.batch_id, before, before - step.quantity)
                .await
            {
                Ok(()) => applied.push(UndoRecord::Deduction {
                    batch_id: step.batch_id,
                    quantity_before: before,
                }),
                Err(e) => return Err(StepFailure::new(applied, e)),
            }
        }

        Ok(applied)
    }
}
