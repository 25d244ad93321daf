use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// A point-of-sale deduction completed and the ledger row was written.
    SaleCompleted {
        sale_id: Uuid,
        location_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        sale_date: DateTime<Utc>,
    },

    /// A transfer deducted at the source and credited the destination.
    StockTransferred {
        from_location_id: Uuid,
        to_location_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        batches_touched: usize,
    },

    /// Compensating rollback ran after a mid-operation failure.
    StockRolledBack {
        operation: String,
        location_id: Uuid,
        product_id: Uuid,
        steps_undone: usize,
        steps_failed: usize,
    },

    /// Stock was deducted but the sale ledger write failed; stock and ledger
    /// state have diverged and need manual reconciliation.
    LedgerDivergence {
        location_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        detail: String,
    },

    /// A batch reached zero quantity-on-hand through allocation.
    BatchDepleted {
        batch_id: Uuid,
        batch_number: String,
        location_id: Uuid,
    },
}

/// Background loop draining the event channel. Events are currently consumed
/// by structured logging; LedgerDivergence is logged at error level so
/// reconciliation tooling can alert on it.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::SaleCompleted {
                sale_id,
                location_id,
                product_id,
                quantity,
                ..
            } => {
                info!(
                    sale_id = %sale_id,
                    location_id = %location_id,
                    product_id = %product_id,
                    quantity = %quantity,
                    "Sale completed"
                );
            }
            Event::StockTransferred {
                from_location_id,
                to_location_id,
                product_id,
                quantity,
                batches_touched,
            } => {
                info!(
                    from = %from_location_id,
                    to = %to_location_id,
                    product_id = %product_id,
                    quantity = %quantity,
                    batches = %batches_touched,
                    "Stock transferred"
                );
            }
            Event::StockRolledBack {
                operation,
                location_id,
                product_id,
                steps_undone,
                steps_failed,
            } => {
                warn!(
                    operation = %operation,
                    location_id = %location_id,
                    product_id = %product_id,
                    steps_undone = %steps_undone,
                    steps_failed = %steps_failed,
                    "Compensating rollback executed"
                );
            }
            Event::LedgerDivergence {
                location_id,
                product_id,
                quantity,
                detail,
            } => {
                error!(
                    location_id = %location_id,
                    product_id = %product_id,
                    quantity = %quantity,
                    detail = %detail,
                    "Ledger divergence: stock deducted without a sale record"
                );
            }
            Event::BatchDepleted {
                batch_id,
                batch_number,
                location_id,
            } => {
                info!(
                    batch_id = %batch_id,
                    batch_number = %batch_number,
                    location_id = %location_id,
                    "Batch fully consumed"
                );
            }
        }
    }

    info!("Event processing loop stopped");
}
