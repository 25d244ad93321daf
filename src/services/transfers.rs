use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics;
use crate::services::allocation::plan_fifo;
use crate::services::batch_store::BatchStore;
use crate::services::credit::CreditExecutor;
use crate::services::deduction::DeductionExecutor;
use crate::services::hierarchy::LocationHierarchy;
use crate::services::rollback::CompensatingRollback;
use crate::services::sales::{plan_breakdown, BatchDeduction};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTransferRequest {
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub product_id: Uuid,

    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransferResponse {
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub deductions: Vec<BatchDeduction>,
    pub message: String,
}

/// Inter-location transfer orchestrator: validate → hierarchy check →
/// allocate → deduct at source → credit at destination.
///
/// A failure while crediting rolls back everything applied so far:
/// destination credits first, then source deductions, most-recent-first
/// across both executors.
#[derive(Clone)]
pub struct TransferService {
    store: Arc<dyn BatchStore>,
    hierarchy: Arc<dyn LocationHierarchy>,
    event_sender: Arc<EventSender>,
}

impl TransferService {
    pub fn new(
        store: Arc<dyn BatchStore>,
        hierarchy: Arc<dyn LocationHierarchy>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            store,
            hierarchy,
            event_sender,
        }
    }

    #[instrument(
        skip(self, request, user),
        fields(
            from = %request.from_location_id,
            to = %request.to_location_id,
            product_id = %request.product_id,
            quantity = request.quantity,
        )
    )]
    pub async fn create_transfer(
        &self,
        request: CreateTransferRequest,
        user: &AuthUser,
    ) -> Result<TransferResponse, ServiceError> {
        let result = self.execute(request, user).await;
        match &result {
            Ok(_) => metrics::TRANSFERS_COMPLETED.inc(),
            Err(_) => metrics::TRANSFERS_FAILED.inc(),
        }
        result
    }

    async fn execute(
        &self,
        request: CreateTransferRequest,
        user: &AuthUser,
    ) -> Result<TransferResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(format!("Invalid input: {}", e)))?;

        if request.from_location_id == request.to_location_id {
            return Err(ServiceError::ValidationError(
                "Cannot transfer stock to the same location".to_string(),
            ));
        }

        if !user.can_access_location(request.from_location_id) {
            return Err(ServiceError::Forbidden(format!(
                "No access to location {}",
                request.from_location_id
            )));
        }

        if !self
            .hierarchy
            .is_direct_edge(request.from_location_id, request.to_location_id)
            .await?
        {
            return Err(ServiceError::Forbidden(format!(
                "Locations {} and {} are not in a direct parent/child relationship",
                request.from_location_id, request.to_location_id
            )));
        }

        let candidates = self
            .store
            .available_batches(request.from_location_id, request.product_id)
            .await?;

        let plan = plan_fifo(&candidates, request.quantity)?;

        let deduction = DeductionExecutor::new(self.store.clone());
        let source_undo = match deduction.apply(&plan).await {
            Ok(undo) => undo,
            Err(failure) => {
                return Err(self
                    .rollback_and_classify("deduction", &request, failure.applied, failure.error)
                    .await);
            }
        };

        let credit = CreditExecutor::new(self.store.clone());
        if let Err(failure) = credit
            .apply(&plan, request.to_location_id, request.product_id)
            .await
        {
            // Credits applied before the failure undo first, then the source
            // deductions; the rollback routine reverses the combined list.
            let mut all_applied = source_undo;
            all_applied.extend(failure.applied);
            return Err(self
                .rollback_and_classify("credit", &request, all_applied, failure.error)
                .await);
        }

        let _ = self
            .event_sender
            .send(Event::StockTransferred {
                from_location_id: request.from_location_id,
                to_location_id: request.to_location_id,
                product_id: request.product_id,
                quantity: request.quantity,
                batches_touched: plan.deductions.len(),
            })
            .await;

        let message = format!(
            "Transferred {} units across {} batches",
            request.quantity,
            plan.deductions.len()
        );
        info!(batches = plan.deductions.len(), "Transfer completed");

        Ok(TransferResponse {
            from_location_id: request.from_location_id,
            to_location_id: request.to_location_id,
            product_id: request.product_id,
            quantity: request.quantity,
            deductions: plan_breakdown(&plan),
            message,
        })
    }

    async fn rollback_and_classify(
        &self,
        stage: &str,
        request: &CreateTransferRequest,
        applied: Vec<crate::services::rollback::UndoRecord>,
        error: ServiceError,
    ) -> ServiceError {
        let rollback = CompensatingRollback::new(self.store.clone());
        let failed_steps = rollback.undo(&applied).await;

        let _ = self
            .event_sender
            .send(Event::StockRolledBack {
                operation: format!("transfer/{}", stage),
                location_id: request.from_location_id,
                product_id: request.product_id,
                steps_undone: applied.len() - failed_steps,
                steps_failed: failed_steps,
            })
            .await;

        ServiceError::StepFailure(format!(
            "Transfer {} failed and {} applied steps were rolled back: {}",
            stage,
            applied.len(),
            error
        ))
    }
}
