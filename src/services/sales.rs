use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics;
use crate::services::allocation::{plan_fifo, AllocationPlan};
use crate::services::batch_store::{BatchStore, NewSaleRecord};
use crate::services::deduction::DeductionExecutor;
use crate::services::rollback::CompensatingRollback;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateSaleRequest {
    pub location_id: Uuid,
    pub product_id: Uuid,

    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,

    pub unit_price: Decimal,

    #[validate(length(equal = 3, message = "Currency must be a 3-letter ISO 4217 code"))]
    pub currency: String,

    /// Defaults to now when omitted.
    pub sale_date: Option<DateTime<Utc>>,
}

/// One line of the per-batch breakdown returned by sales and transfers.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchDeduction {
    pub batch_number: String,
    pub quantity: i32,
    pub expiry_date: NaiveDate,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SaleResponse {
    pub sale_id: Uuid,
    pub location_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub deductions: Vec<BatchDeduction>,
}

pub(crate) fn plan_breakdown(plan: &AllocationPlan) -> Vec<BatchDeduction> {
    plan.deductions
        .iter()
        .map(|d| BatchDeduction {
            batch_number: d.batch_number.clone(),
            quantity: d.quantity,
            expiry_date: d.expiry_date,
        })
        .collect()
}

/// Point-of-sale orchestrator: validate → allocate → deduct → record.
///
/// The ledger write is the last step and is not itself rolled back to stock:
/// a failure there is surfaced as [`ServiceError::TerminalInconsistency`] and
/// flagged for manual reconciliation instead.
#[derive(Clone)]
pub struct SaleService {
    store: Arc<dyn BatchStore>,
    event_sender: Arc<EventSender>,
}

impl SaleService {
    pub fn new(store: Arc<dyn BatchStore>, event_sender: Arc<EventSender>) -> Self {
        Self {
            store,
            event_sender,
        }
    }

    #[instrument(
        skip(self, request, user),
        fields(
            location_id = %request.location_id,
            product_id = %request.product_id,
            quantity = request.quantity,
        )
    )]
    pub async fn create_sale(
        &self,
        request: CreateSaleRequest,
        user: &AuthUser,
    ) -> Result<SaleResponse, ServiceError> {
        let result = self.execute(request, user).await;
        match &result {
            Ok(_) => metrics::SALES_COMPLETED.inc(),
            Err(_) => metrics::SALES_FAILED.inc(),
        }
        result
    }

    async fn execute(
        &self,
        request: CreateSaleRequest,
        user: &AuthUser,
    ) -> Result<SaleResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(format!("Invalid input: {}", e)))?;

        if !user.can_access_location(request.location_id) {
            return Err(ServiceError::Forbidden(format!(
                "No access to location {}",
                request.location_id
            )));
        }

        let candidates = self
            .store
            .available_batches(request.location_id, request.product_id)
            .await?;

        // InsufficientStock propagates as-is: nothing has been mutated yet.
        let plan = plan_fifo(&candidates, request.quantity)?;

        let executor = DeductionExecutor::new(self.store.clone());
        let undo = match executor.apply(&plan).await {
            Ok(undo) => undo,
            Err(failure) => {
                let rollback = CompensatingRollback::new(self.store.clone());
                let failed_steps = rollback.undo(&failure.applied).await;
                let _ = self
                    .event_sender
                    .send(Event::StockRolledBack {
                        operation: "sale".to_string(),
                        location_id: request.location_id,
                        product_id: request.product_id,
                        steps_undone: failure.applied.len() - failed_steps,
                        steps_failed: failed_steps,
                    })
                    .await;
                return Err(ServiceError::StepFailure(format!(
                    "Sale deduction failed after {} of {} steps: {}",
                    failure.applied.len(),
                    plan.deductions.len(),
                    failure.error
                )));
            }
        };

        let sale_date = request.sale_date.unwrap_or_else(Utc::now);
        let sale = match self
            .store
            .record_sale(NewSaleRecord {
                location_id: request.location_id,
                product_id: request.product_id,
                quantity: request.quantity,
                unit_price: request.unit_price,
                currency: request.currency.clone(),
                sale_date,
                sold_by: user.user_id.clone(),
            })
            .await
        {
            Ok(sale) => sale,
            Err(e) => {
                // Stock is already durably deducted; the divergence is
                // flagged for manual reconciliation, not unwound.
                metrics::LEDGER_DIVERGENCES.inc();
                error!(
                    location_id = %request.location_id,
                    product_id = %request.product_id,
                    quantity = request.quantity,
                    error = %e,
                    "Sale ledger write failed after stock deduction"
                );
                let _ = self
                    .event_sender
                    .send(Event::LedgerDivergence {
                        location_id: request.location_id,
                        product_id: request.product_id,
                        quantity: request.quantity,
                        detail: e.to_string(),
                    })
                    .await;
                return Err(ServiceError::TerminalInconsistency(format!(
                    "Stock deducted but the sale ledger write failed: {}",
                    e
                )));
            }
        };

        for record in &undo {
            let batch_id = record.batch_id();
            if let Ok(Some(batch)) = self.store.find_batch(batch_id).await {
                if batch.quantity_on_hand == 0 {
                    let _ = self
                        .event_sender
                        .send(Event::BatchDepleted {
                            batch_id,
                            batch_number: batch.batch_number.clone(),
                            location_id: batch.location_id,
                        })
                        .await;
                }
            }
        }

        let _ = self
            .event_sender
            .send(Event::SaleCompleted {
                sale_id: sale.id,
                location_id: request.location_id,
                product_id: request.product_id,
                quantity: request.quantity,
                sale_date,
            })
            .await;

        info!(
            sale_id = %sale.id,
            batches = plan.deductions.len(),
            "Sale recorded"
        );

        Ok(SaleResponse {
            sale_id: sale.id,
            location_id: request.location_id,
            product_id: request.product_id,
            quantity: request.quantity,
            deductions: plan_breakdown(&plan),
        })
    }
}
