//! Reconciling a desired ladder against what is actually resting on the
//! exchange (§4.7 step 6).
//!
//! For every live order: if a desired order sits at the same price and its
//! volume is within `tolerance`, the live order is kept and that desired
//! order is considered already satisfied. Otherwise the live order is
//! "crowded": walk the desired orders strictly price-inward of it (bids:
//! higher price; asks: lower price), nearest first, attempting to place
//! each through the OPE, dropping each success from the pending desired
//! set. The walk stops at the first placement failure. The live order is
//! cancelled unless at least one inward placement succeeded without a
//! failure along the way — eagerly replacing a crowded live order, but
//! never tearing one down over a transient placement failure that left
//! nothing new actually resting in its place. Whatever remains of the
//! desired set once every live order has been visited is placed outright.

use tracing::warn;

use crate::domain::{DesiredOrder, LiveOrder, PriceTick, Side};
use crate::error::OpeError;

pub enum Action {
    Cancel(LiveOrder),
    Place(DesiredOrder),
}

/// The placement/cancellation surface reconciliation drives. Implemented by
/// `Ope` for real use; mockable in tests so the decision logic can be
/// exercised without a Gate behind it.
pub trait Executor {
    fn place(&self, side: Side, order: DesiredOrder) -> Result<(), OpeError>;
    fn cancel(&self, oid: &str) -> Result<(), OpeError>;
}

impl Executor for crate::ope::Ope {
    fn place(&self, side: Side, order: DesiredOrder) -> Result<(), OpeError> {
        match side {
            Side::Buy => self.bid(order.price, order.quote_amount).map(|_| ()),
            // DesiredOrder carries its size in quote units throughout the
            // ladder pipeline, but `Ope::ask` takes a base-asset amount
            // (§4.6's literal `ask(pair, base-amount, ...)` contract) — convert
            // here rather than changing what unit the ladder works in.
            Side::Sell => {
                let price_f64: f64 = order
                    .price
                    .to_decimal_string(self.price_decimals())
                    .parse()
                    .unwrap_or(0.0);
                let base_amount = order.quote_amount / price_f64.max(f64::EPSILON);
                self.ask(order.price, base_amount).map(|_| ())
            }
        }
    }

    fn cancel(&self, oid: &str) -> Result<(), OpeError> {
        crate::ope::Ope::cancel(self, oid)
    }
}

/// True if `candidate` is price-inward of `old` on `side`: closer to the
/// touch (bids: higher price; asks: lower price). Open Question (b): the
/// literal walk uses strict inequality, excluding a desired order at
/// exactly `old`'s price from being tried as a replacement before falling
/// through to cancellation; `replace_equal_price` (default `false`, the
/// strict reading) opts into treating equal price as inward too.
fn is_inward(side: Side, candidate: PriceTick, old: PriceTick, replace_equal_price: bool) -> bool {
    match side {
        Side::Buy => candidate > old || (replace_equal_price && candidate == old),
        Side::Sell => candidate < old || (replace_equal_price && candidate == old),
    }
}

/// Distance from `old` for sorting inward candidates nearest-first.
fn inward_distance(side: Side, candidate: PriceTick, old: PriceTick) -> i64 {
    match side {
        Side::Buy => candidate.0 - old.0,
        Side::Sell => old.0 - candidate.0,
    }
}

fn volume_within_tolerance(live: f64, desired: f64, tolerance: f64) -> bool {
    if live <= 0.0 {
        return desired <= 0.0;
    }
    ((live - desired).abs() / live) <= tolerance
}

/// Runs reconciliation for one side, executing cancels and places through
/// `executor` as it goes, and returns the actions taken for logging/testing.
pub fn reconcile(
    desired: &[DesiredOrder],
    live: &[LiveOrder],
    side: Side,
    price_to_volume: impl Fn(PriceTick, f64) -> f64,
    tolerance: f64,
    replace_equal_price: bool,
    executor: &impl Executor,
) -> Vec<Action> {
    let mut remaining: Vec<DesiredOrder> = desired.to_vec();
    let mut actions = Vec::new();

    for old in live {
        if let Some(pos) = remaining.iter().position(|d| d.price == old.price) {
            let desired_volume = price_to_volume(remaining[pos].price, remaining[pos].quote_amount);
            if volume_within_tolerance(old.volume, desired_volume, tolerance) {
                remaining.remove(pos);
                continue;
            }
        }

        let mut inward: Vec<usize> = remaining
            .iter()
            .enumerate()
            .filter(|(_, d)| is_inward(side, d.price, old.price, replace_equal_price))
            .map(|(i, _)| i)
            .collect();
        inward.sort_by_key(|&i| inward_distance(side, remaining[i].price, old.price));

        let mut placed_any = false;
        let mut failed = false;
        let mut placed_positions = Vec::new();
        for &i in &inward {
            match executor.place(side, remaining[i]) {
                Ok(()) => {
                    placed_any = true;
                    placed_positions.push(i);
                }
                Err(e) => {
                    warn!(error = %e, price = %remaining[i].price, "inward replacement failed");
                    failed = true;
                    break;
                }
            }
        }
        placed_positions.sort_unstable_by(|a, b| b.cmp(a));
        for i in placed_positions {
            actions.push(Action::Place(remaining.remove(i)));
        }

        if failed || !placed_any {
            if let Err(e) = executor.cancel(&old.oid) {
                warn!(error = %e, oid = %old.oid, "cancel failed");
            }
            actions.push(Action::Cancel(old.clone()));
        }
    }

    for d in remaining {
        match executor.place(side, d) {
            Ok(()) => actions.push(Action::Place(d)),
            Err(e) => warn!(error = %e, price = %d.price, "place failed"),
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn flat_rate(_price: PriceTick, quote: f64) -> f64 {
        quote / 100.0
    }

    /// Records every call it receives instead of hitting a real Gate;
    /// `fail_prices` makes `place` fail for specific prices so the
    /// first-failure-stops-the-walk behavior can be exercised.
    struct MockExecutor {
        fail_prices: Vec<PriceTick>,
        placed: RefCell<Vec<PriceTick>>,
        cancelled: RefCell<Vec<String>>,
    }

    impl MockExecutor {
        fn new(fail_prices: Vec<PriceTick>) -> Self {
            Self {
                fail_prices,
                placed: RefCell::new(Vec::new()),
                cancelled: RefCell::new(Vec::new()),
            }
        }
    }

    impl Executor for MockExecutor {
        fn place(&self, _side: Side, order: DesiredOrder) -> Result<(), OpeError> {
            if self.fail_prices.contains(&order.price) {
                return Err(OpeError::Rejected("mock rejection".to_string()));
            }
            self.placed.borrow_mut().push(order.price);
            Ok(())
        }

        fn cancel(&self, oid: &str) -> Result<(), OpeError> {
            self.cancelled.borrow_mut().push(oid.to_string());
            Ok(())
        }
    }

    #[test]
    fn matching_price_and_volume_needs_no_action() {
        let desired = vec![DesiredOrder::new(100.0, PriceTick::new(1000))];
        let live = vec![LiveOrder::new("o1", PriceTick::new(1000), 1.0)];
        let exec = MockExecutor::new(vec![]);
        let actions = reconcile(&desired, &live, Side::Buy, flat_rate, 0.15, false, &exec);
        assert!(actions.is_empty());
        assert!(exec.cancelled.borrow().is_empty());
        assert!(exec.placed.borrow().is_empty());
    }

    #[test]
    fn mismatched_volume_places_inward_successfully_and_keeps_old() {
        // Desired is inward (higher price, for a bid) of the live order and
        // places successfully; since nothing failed along the walk, `old`
        // survives — only a failed or empty inward walk cancels it.
        let desired = vec![DesiredOrder::new(100.0, PriceTick::new(1001))];
        let live = vec![LiveOrder::new("o1", PriceTick::new(1000), 5.0)];
        let exec = MockExecutor::new(vec![]);
        let actions = reconcile(&desired, &live, Side::Buy, flat_rate, 0.15, false, &exec);
        assert!(exec.cancelled.borrow().is_empty());
        assert_eq!(exec.placed.borrow().as_slice(), [PriceTick::new(1001)]);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], Action::Place(_)));
    }

    #[test]
    fn failed_inward_placement_still_cancels_old() {
        let desired = vec![DesiredOrder::new(100.0, PriceTick::new(1001))];
        let live = vec![LiveOrder::new("o1", PriceTick::new(1000), 5.0)];
        let exec = MockExecutor::new(vec![PriceTick::new(1001)]);
        let actions = reconcile(&desired, &live, Side::Buy, flat_rate, 0.15, false, &exec);
        assert_eq!(exec.cancelled.borrow().as_slice(), ["o1".to_string()]);
        assert!(exec.placed.borrow().is_empty());
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], Action::Cancel(_)));
    }

    #[test]
    fn no_inward_candidates_cancels_old() {
        let desired: Vec<DesiredOrder> = vec![];
        let live = vec![LiveOrder::new("o1", PriceTick::new(999), 1.0)];
        let exec = MockExecutor::new(vec![]);
        let actions = reconcile(&desired, &live, Side::Buy, flat_rate, 0.15, false, &exec);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], Action::Cancel(_)));
    }

    #[test]
    fn unmatched_desired_order_is_placed_outright() {
        let desired = vec![DesiredOrder::new(100.0, PriceTick::new(1000))];
        let live: Vec<LiveOrder> = vec![];
        let exec = MockExecutor::new(vec![]);
        let actions = reconcile(&desired, &live, Side::Buy, flat_rate, 0.15, false, &exec);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], Action::Place(_)));
        assert_eq!(exec.placed.borrow().as_slice(), [PriceTick::new(1000)]);
    }

    #[test]
    fn inward_candidates_are_tried_nearest_first_and_all_successes_keep_old() {
        // Two candidates inward of `old`; the nearer one (1001) must be
        // attempted before the farther one (1002). Since both succeed
        // without a failure along the way, `old` is not torn down — only a
        // failed or empty walk triggers its cancellation.
        let desired = vec![
            DesiredOrder::new(50.0, PriceTick::new(1002)),
            DesiredOrder::new(50.0, PriceTick::new(1001)),
        ];
        let live = vec![LiveOrder::new("o1", PriceTick::new(1000), 5.0)];
        let exec = MockExecutor::new(vec![]);
        reconcile(&desired, &live, Side::Buy, flat_rate, 0.15, false, &exec);
        assert_eq!(
            exec.placed.borrow().as_slice(),
            [PriceTick::new(1001), PriceTick::new(1002)]
        );
        assert!(exec.cancelled.borrow().is_empty());
    }
}
