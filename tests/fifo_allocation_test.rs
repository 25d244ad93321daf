//! Property-based tests for the FIFO allocation planner.
//!
//! These verify the allocator's invariants across a wide range of batch
//! configurations, beyond the fixed scenarios in the unit tests.

mod common;

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use uuid::Uuid;

use freshstock_api::entities::stock_batch;
use freshstock_api::errors::ServiceError;
use freshstock_api::services::allocation::plan_fifo;

use common::make_batch;

/// Batches with strictly increasing expiry dates and insertion order.
fn candidate_batches(quantities: &[i32]) -> Vec<stock_batch::Model> {
    let location = Uuid::new_v4();
    let product = Uuid::new_v4();
    let base = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    quantities
        .iter()
        .enumerate()
        .map(|(i, &qty)| {
            let expiry = (base + Duration::days(i as i64)).to_string();
            make_batch(
                location,
                product,
                &format!("LOT-{:03}", i),
                qty,
                &expiry,
                i as i64,
            )
        })
        .collect()
}

fn quantities_strategy() -> impl Strategy<Value = Vec<i32>> {
    prop::collection::vec(1i32..50, 1..8)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn plans_cover_exactly_the_requested_quantity(
        quantities in quantities_strategy(),
        fraction in 0.0f64..1.0,
    ) {
        let total: i32 = quantities.iter().sum();
        let requested = ((total as f64 * fraction) as i32).max(1);
        let candidates = candidate_batches(&quantities);

        let plan = plan_fifo(&candidates, requested).expect("plan is feasible");
        prop_assert_eq!(plan.total(), requested);
        prop_assert_eq!(plan.requested, requested);
    }

    #[test]
    fn plans_drain_strictly_in_expiry_order(
        quantities in quantities_strategy(),
        fraction in 0.0f64..1.0,
    ) {
        let total: i32 = quantities.iter().sum();
        let requested = ((total as f64 * fraction) as i32).max(1);
        let candidates = candidate_batches(&quantities);

        let plan = plan_fifo(&candidates, requested).expect("plan is feasible");

        // Every step except the last must fully drain its batch, and steps
        // must follow candidate order with no skips.
        for (i, step) in plan.deductions.iter().enumerate() {
            prop_assert_eq!(step.batch_id, candidates[i].id);
            if i + 1 < plan.deductions.len() {
                prop_assert_eq!(step.quantity, candidates[i].quantity_on_hand);
            } else {
                prop_assert!(step.quantity <= candidates[i].quantity_on_hand);
            }
        }
    }

    #[test]
    fn oversubscription_reports_the_exact_availability(
        quantities in quantities_strategy(),
        excess in 1i32..100,
    ) {
        let total: i32 = quantities.iter().sum();
        let candidates = candidate_batches(&quantities);

        let err = plan_fifo(&candidates, total + excess).unwrap_err();
        match err {
            ServiceError::InsufficientStock { requested, available } => {
                prop_assert_eq!(requested, total + excess);
                prop_assert_eq!(available, total);
            }
            other => prop_assert!(false, "expected InsufficientStock, got {other:?}"),
        }
    }

    #[test]
    fn replanning_the_same_candidates_is_bit_identical(
        quantities in quantities_strategy(),
        fraction in 0.0f64..1.0,
    ) {
        let total: i32 = quantities.iter().sum();
        let requested = ((total as f64 * fraction) as i32).max(1);
        let candidates = candidate_batches(&quantities);

        let first = plan_fifo(&candidates, requested).expect("plan");
        let second = plan_fifo(&candidates, requested).expect("plan");
        prop_assert_eq!(first, second);
    }
}
