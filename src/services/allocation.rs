use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::entities::stock_batch;
use crate::errors::ServiceError;

/// One step of an allocation plan: take `quantity` units from `batch_id`.
/// Carries the batch attributes a transfer credit needs to reproduce the
/// batch at the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedDeduction {
    pub batch_id: Uuid,
    pub batch_number: String,
    pub quantity: i32,
    pub unit_cost: Decimal,
    pub manufactured_date: NaiveDate,
    pub expiry_date: NaiveDate,
}

/// An ordered deduction plan covering exactly the requested quantity.
/// In-memory only; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPlan {
    pub requested: i32,
    pub deductions: Vec<PlannedDeduction>,
}

impl AllocationPlan {
    pub fn total(&self) -> i32 {
        self.deductions.iter().map(|d| d.quantity).sum()
    }
}

/// Computes a FIFO-by-expiry deduction plan.
///
/// `candidates` must already be filtered to allocatable batches and sorted by
/// expiry date ascending (insertion order as tie-break), the shape
/// [`super::batch_store::BatchStore::available_batches`] returns. The walk is
/// deterministic: the same candidate list and quantity always produce the
/// same plan, so replanning during a retry is reproducible.
pub fn plan_fifo(
    candidates: &[stock_batch::Model],
    requested: i32,
) -> Result<AllocationPlan, ServiceError> {
    if requested <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "Requested quantity must be positive, got {}",
            requested
        )));
    }

    let mut remaining = requested;
    let mut deductions = Vec::new();

    for batch in candidates {
        if remaining == 0 {
            break;
        }
        let take = batch.quantity_on_hand.min(remaining);
        if take <= 0 {
            continue;
        }
        deductions.push(PlannedDeduction {
            batch_id: batch.id,
            batch_number: batch.batch_number.clone(),
            quantity: take,
            unit_cost: batch.unit_cost,
            manufactured_date: batch.manufactured_date,
            expiry_date: batch.expiry_date,
        });
        remaining -= take;
    }

    if remaining > 0 {
        let available: i32 = candidates.iter().map(|b| b.quantity_on_hand).sum();
        return Err(ServiceError::InsufficientStock {
            requested,
            available,
        });
    }

    Ok(AllocationPlan {
        requested,
        deductions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::stock_batch::QualityStatus;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn batch(qty: i32, expiry: &str, batch_no: &str, age_secs: i64) -> stock_batch::Model {
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
            + Duration::seconds(age_secs);
        stock_batch::Model {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            batch_number: batch_no.to_string(),
            quantity_on_hand: qty,
            quantity_reserved: 0,
            unit_cost: dec!(2.5000),
            manufactured_date: NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
            expiry_date: expiry.parse().unwrap(),
            quality_status: QualityStatus::Ok.as_str().to_string(),
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn drains_batches_in_expiry_order() {
        let a = batch(5, "2025-01-01", "B-A", 0);
        let b = batch(10, "2025-02-01", "B-B", 1);
        let plan = plan_fifo(&[a.clone(), b.clone()], 8).expect("plan");

        assert_eq!(plan.deductions.len(), 2);
        assert_eq!(plan.deductions[0].batch_id, a.id);
        assert_eq!(plan.deductions[0].quantity, 5);
        assert_eq!(plan.deductions[1].batch_id, b.id);
        assert_eq!(plan.deductions[1].quantity, 3);
        assert_eq!(plan.total(), 8);
    }

    #[test]
    fn never_touches_a_later_batch_while_an_earlier_one_remains() {
        let a = batch(10, "2025-01-01", "B-A", 0);
        let b = batch(10, "2025-02-01", "B-B", 1);
        let plan = plan_fifo(&[a.clone(), b], 7).expect("plan");

        assert_eq!(plan.deductions.len(), 1);
        assert_eq!(plan.deductions[0].batch_id, a.id);
        assert_eq!(plan.deductions[0].quantity, 7);
    }

    #[test]
    fn shortfall_is_reported_with_exact_availability() {
        let a = batch(5, "2025-01-01", "B-A", 0);
        let b = batch(10, "2025-02-01", "B-B", 1);
        let err = plan_fifo(&[a, b], 20).unwrap_err();

        match err {
            ServiceError::InsufficientStock {
                requested,
                available,
            } => {
                assert_eq!(requested, 20);
                assert_eq!(available, 15);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[test]
    fn exact_fit_consumes_every_batch() {
        let plan = plan_fifo(
            &[batch(5, "2025-01-01", "B-A", 0), batch(10, "2025-02-01", "B-B", 1)],
            15,
        )
        .expect("plan");
        assert_eq!(plan.total(), 15);
        assert_eq!(plan.deductions.len(), 2);
    }

    #[test]
    fn replanning_is_deterministic() {
        let candidates = vec![
            batch(4, "2025-03-01", "B-C", 2),
            batch(6, "2025-03-01", "B-D", 3),
            batch(9, "2025-04-01", "B-E", 4),
        ];
        let first = plan_fifo(&candidates, 12).expect("plan");
        let second = plan_fifo(&candidates, 12).expect("plan");
        assert_eq!(first, second);
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        let candidates = vec![batch(5, "2025-01-01", "B-A", 0)];
        assert!(matches!(
            plan_fifo(&candidates, 0),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            plan_fifo(&candidates, -3),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn empty_candidate_list_reports_zero_availability() {
        let err = plan_fifo(&[], 1).unwrap_err();
        match err {
            ServiceError::InsufficientStock {
                requested,
                available,
            } => {
                assert_eq!(requested, 1);
                assert_eq!(available, 0);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }
}
