use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::stock_batch::QualityStatus;
use crate::services::allocation::AllocationPlan;
use crate::services::batch_store::{BatchStore, NewBatch};
use crate::services::rollback::{StepFailure, UndoRecord};

/// Applies the credited side of a transfer at the destination location.
///
/// Credits merge into an existing destination batch with the same batch
/// number, preserving expiry and cost traceability across moves; only when
/// the number is absent does a new row get created. Same
/// re-read-before-write and stop-on-first-failure discipline as the
/// deduction side.
pub struct CreditExecutor {
    store: Arc<dyn BatchStore>,
}

impl CreditExecutor {
    pub fn new(store: Arc<dyn BatchStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, plan), fields(steps = plan.deductions.len(), destination = %destination_id))]
    pub async fn apply(
        &self,
        plan: &AllocationPlan,
        destination_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<UndoRecord>, StepFailure> {
        let mut applied = Vec::with_capacity(plan.deductions.len());

        for step in &plan.deductions {
            let existing = match self
                .store
                .find_by_batch_number(destination_id, product_id, &step.batch_number)
                .await
            {
                Ok(existing) => existing,
                Err(e) => return Err(StepFailure::new(applied, e)),
            };

            match existing {
                Some(batch) => {
                    let before = batch.quantity_on_hand;
                    match self
                        .store
                        .update_quantity(batch.id, before, before + step.quantity)
                        .await
                    {
                        Ok(()) => applied.push(UndoRecord::CreditUpdate {
                            batch_id: batch.id,
                            quantity_before: before,
                        }),
                        Err(e) => return Err(StepFailure::new(applied, e)),
                    }
                }
                None => {
                    let new_batch = NewBatch {
                        product_id,
                        location_id: destination_id,
                        batch_number: step.batch_number.clone(),
                        quantity_on_hand: step.quantity,
                        unit_cost: step.unit_cost,
                        manufactured_date: step.manufactured_date,
                        expiry_date: step.expiry_date,
                        quality_status: QualityStatus::Ok,
                    };
                    match self.store.insert_batch(new_batch).await {
                        Ok(inserted) => applied.push(UndoRecord::CreditInsert {
                            batch_id: inserted.id,
                        }),
                        Err(e) => return Err(StepFailure::new(applied, e)),
                    }
                }
            }
        }

        Ok(applied)
    }
}
