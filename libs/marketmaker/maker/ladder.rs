//! Ladder generation ("dumbot", §4.7 step 5): walk real book depth from the
//! profitable touch outward, accumulating volume until it covers this
//! round's resilience threshold, then spread the round's deployable funds
//! across that walked prefix weighted by how much depth sits in front of
//! each level.
//!
//! Level `i`'s share is `11/6` times the cumulative volume walked through
//! level `i` — since cumulative volume only grows with depth, share grows
//! with depth too. The head (level 0, the touch) is always kept regardless
//! of its share rank (Open Question a: a market-maker with nothing resting
//! at the touch isn't making a market); the remaining slots, up to
//! `max_orders`, go to the deepest-share levels within the walked prefix.
//! Each kept level's price sits one tick inside the real book level it was
//! grounded on, so every output price equals some input price ± one tick.
//! `funds` is divided across the kept set strictly proportional to share —
//! no level is floored or dropped for being under some minimum order size,
//! since §8's testable property requires allocated amounts to sum to
//! `funds` exactly (within float error); that is for the reconciliation
//! layer's OPE calls to cope with, not the ladder generator to pre-empt.

use crate::domain::{BookLevel, DesiredOrder, PriceTick, Side};

/// Geometric share weight applied to cumulative depth at each walked level.
const SHARE_RATIO: f64 = 11.0 / 6.0;

/// Builds a one-sided ladder from real book `levels` (best price first,
/// i.e. already walked forward to the profitable touch by the caller).
///
/// Walks `levels` accumulating volume until the running total reaches
/// `resilience` (inclusive of the level that crosses it) or `levels` runs
/// out, giving a prefix of `n` levels. Keeps the head plus the
/// `min(max_orders, n) - 1` highest-share levels from the rest of that
/// prefix and divides `funds` across the kept set proportional to share.
pub fn dumbot_oneside(
    side: Side,
    levels: &[BookLevel],
    funds: f64,
    resilience: f64,
    max_orders: usize,
) -> Vec<DesiredOrder> {
    if max_orders == 0 || levels.is_empty() || funds <= 0.0 {
        return Vec::new();
    }

    let mut cumulative = Vec::new();
    let mut running = 0.0;
    for level in levels {
        running += level.volume;
        cumulative.push(running);
        if running >= resilience {
            break;
        }
    }
    let n = cumulative.len();
    let shares: Vec<f64> = cumulative.iter().map(|c| SHARE_RATIO * c).collect();

    let keep = max_orders.min(n).saturating_sub(1);
    let mut rest: Vec<usize> = (1..n).collect();
    rest.sort_by(|&a, &b| shares[b].partial_cmp(&shares[a]).unwrap());
    rest.truncate(keep);

    let mut relevant: Vec<usize> = std::iter::once(0).chain(rest).collect();
    relevant.sort_unstable();

    let share_sum: f64 = relevant.iter().map(|&i| shares[i]).sum();
    if share_sum <= 0.0 {
        return Vec::new();
    }

    let mut orders: Vec<DesiredOrder> = relevant
        .into_iter()
        .map(|i| {
            let quote_amount = funds * (shares[i] / share_sum);
            let price = match side {
                Side::Buy => levels[i].price.plus_one(),
                Side::Sell => levels[i].price.minus_one(),
            };
            DesiredOrder::new(quote_amount, price)
        })
        .collect();

    match side {
        Side::Buy => orders.sort_by(|a, b| b.price.cmp(&a.price)),
        Side::Sell => orders.sort_by(|a, b| a.price.cmp(&b.price)),
    }
    orders
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: i64, volume: f64) -> BookLevel {
        BookLevel::new(PriceTick::new(price), volume)
    }

    #[test]
    fn head_level_always_present() {
        let levels = vec![level(1000, 0.001), level(999, 5.0), level(998, 5.0)];
        let ladder = dumbot_oneside(Side::Buy, &levels, 100.0, 4.0, 5);
        assert_eq!(ladder[0].price, PriceTick::new(1001));
    }

    #[test]
    fn prices_are_one_tick_inside_real_levels() {
        let levels = vec![level(1000, 3.0), level(1002, 3.0)];
        let ladder = dumbot_oneside(Side::Sell, &levels, 1000.0, 10.0, 5);
        let level_prices: Vec<i64> = levels.iter().map(|l| l.price.0).collect();
        for order in &ladder {
            assert!(level_prices
                .iter()
                .any(|p| (order.price.0 - p).abs() == 1));
        }
    }

    #[test]
    fn stops_walking_once_resilience_is_covered() {
        // resilience of 4.0 is crossed by the second level (1.0 + 4.0 = 5.0),
        // so the third level must never be reached even though max_orders
        // would otherwise allow it.
        let levels = vec![level(1000, 1.0), level(999, 4.0), level(998, 1000.0)];
        let ladder = dumbot_oneside(Side::Buy, &levels, 1000.0, 4.0, 10);
        assert!(ladder.iter().all(|o| o.price != PriceTick::new(997)));
    }

    #[test]
    fn deeper_levels_get_larger_shares_than_shallower_ones() {
        // Cumulative volume only grows with depth, so share_i is
        // monotonically non-decreasing; the deepest walked level must
        // never receive a smaller amount than a shallower one ahead of it.
        let levels = vec![level(1000, 1.0), level(999, 1.0), level(998, 1.0)];
        let ladder = dumbot_oneside(Side::Buy, &levels, 1000.0, 3.0, 3);
        assert_eq!(ladder.len(), 3);
        let amounts: Vec<f64> = {
            let mut by_price = ladder.clone();
            by_price.sort_by(|a, b| b.price.cmp(&a.price));
            by_price.iter().map(|o| o.quote_amount).collect()
        };
        assert!(amounts[2] >= amounts[1]);
        assert!(amounts[1] >= amounts[0]);
    }

    #[test]
    fn respects_max_orders() {
        let levels = vec![level(1000, 1.0), level(999, 1.0), level(998, 1.0)];
        let ladder = dumbot_oneside(Side::Buy, &levels, 1000.0, 0.0, 2);
        assert!(ladder.len() <= 2);
    }

    #[test]
    fn zero_max_orders_yields_empty_ladder() {
        let levels = vec![level(1000, 1.0)];
        let ladder = dumbot_oneside(Side::Buy, &levels, 1000.0, 1.0, 0);
        assert!(ladder.is_empty());
    }

    #[test]
    fn empty_book_yields_empty_ladder() {
        let ladder = dumbot_oneside(Side::Sell, &[], 1000.0, 1.0, 5);
        assert!(ladder.is_empty());
    }

    #[test]
    fn allocated_amounts_sum_to_funds() {
        let levels = vec![
            level(1000, 0.5),
            level(999, 2.0),
            level(998, 3.0),
            level(997, 1.5),
        ];
        let funds = 1234.5;
        let ladder = dumbot_oneside(Side::Buy, &levels, funds, 5.0, 3);
        let sum: f64 = ladder.iter().map(|o| o.quote_amount).sum();
        assert!((sum - funds).abs() < 1e-6, "sum {sum} != funds {funds}");
    }
}
