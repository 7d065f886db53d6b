//! Cleaning the raw public book before it drives sizing decisions (§4.7
//! steps 3-4): strip the agent's own resting orders out of the levels it
//! reads back, then walk inward from the best bid/ask until the spread is
//! profitable net of fees.

use crate::domain::{BookLevel, LiveOrder, PriceTick};

/// Levels within this much volume of a live order of ours are assumed to be
/// that order (public book volume and our own reported volume can differ by
/// float noise even when nothing else is resting at that price).
const IGNORE_EPSILON: f64 = 1e-3;

/// Removes (or shrinks) book levels that are actually our own resting
/// orders, so the cleaned book reflects only other participants' liquidity.
pub fn ignore_mine(levels: &[BookLevel], mine: &[LiveOrder]) -> Vec<BookLevel> {
    levels
        .iter()
        .filter_map(|level| {
            let ours_at_price: f64 = mine
                .iter()
                .filter(|o| o.price == level.price)
                .map(|o| o.volume)
                .sum();
            let remaining = level.volume - ours_at_price;
            if remaining > IGNORE_EPSILON {
                Some(BookLevel::new(level.price, remaining))
            } else {
                None
            }
        })
        .collect()
}

/// Ratio of ask to bid net of a round-trip fee: what a maker nets buying at
/// `bid` and selling at `ask`, each side paying `fee_pct` percent.
pub fn profit_margin(bid: f64, ask: f64, fee_pct: f64) -> f64 {
    if bid <= 0.0 {
        return 0.0;
    }
    (ask / bid) * (1.0 - fee_pct / 100.0)
}

/// Walks inward from the best bid and ask, dropping levels on the tighter
/// side until the remaining spread clears `profit_margin >= 1.0`, i.e. the
/// round trip is never a guaranteed loss after fees.
///
/// Ties (the walk could narrow either side) favor narrowing the side with
/// the thinner remaining volume, since it costs the agent less resting
/// depth to give up.
pub fn cross_to_profitable(
    bids: &[BookLevel],
    asks: &[BookLevel],
    fee_pct: f64,
) -> (Option<PriceTick>, Option<PriceTick>) {
    let mut bid_idx = 0usize;
    let mut ask_idx = 0usize;

    loop {
        let bid = bids.get(bid_idx);
        let ask = asks.get(ask_idx);
        let (bid, ask) = match (bid, ask) {
            (Some(b), Some(a)) => (b, a),
            _ => break,
        };

        // Margin is checked one tick inside each touch, not at the raw
        // top-of-book prices. The ratio of two PriceTicks equals the ratio
        // of the real prices they represent regardless of decimal scale, so
        // there is no need to convert back to a decimal string here.
        let bid_price = bid.price.plus_one().0 as f64;
        let ask_price = ask.price.minus_one().0 as f64;
        if profit_margin(bid_price, ask_price, fee_pct) >= 1.0 {
            break;
        }

        if bid.volume == ask.volume {
            bid_idx += 1;
            ask_idx += 1;
        } else if bid.volume < ask.volume {
            bid_idx += 1;
        } else {
            ask_idx += 1;
        }

        if bid_idx >= bids.len() || ask_idx >= asks.len() {
            break;
        }
    }

    (
        bids.get(bid_idx).map(|l| l.price),
        asks.get(ask_idx).map(|l| l.price),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PriceTick;

    fn level(price: i64, volume: f64) -> BookLevel {
        BookLevel::new(PriceTick::new(price), volume)
    }

    fn live(price: i64, volume: f64) -> LiveOrder {
        LiveOrder::new("o1", PriceTick::new(price), volume)
    }

    #[test]
    fn ignore_mine_strips_our_own_volume() {
        let levels = vec![level(100, 5.0), level(99, 3.0)];
        let mine = vec![live(100, 5.0)];
        let cleaned = ignore_mine(&levels, &mine);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].price, PriceTick::new(99));
    }

    #[test]
    fn ignore_mine_shrinks_partially_ours() {
        let levels = vec![level(100, 5.0)];
        let mine = vec![live(100, 2.0)];
        let cleaned = ignore_mine(&levels, &mine);
        assert_eq!(cleaned.len(), 1);
        assert!((cleaned[0].volume - 3.0).abs() < 1e-9);
    }

    #[test]
    fn profit_margin_above_one_means_profitable() {
        assert!(profit_margin(100.0, 101.0, 0.0) > 1.0);
        assert!(profit_margin(100.0, 100.05, 0.16) < 1.0);
    }

    #[test]
    fn cross_to_profitable_stops_once_margin_clears() {
        // One tick inside the first touch (bid+1=101, ask-1=100) is still
        // crossed, so the walk must step past it before margin clears at
        // the second pair (bid+1=100, ask-1=102).
        let bids = vec![level(100, 1.0), level(99, 1.0)];
        let asks = vec![level(101, 1.0), level(103, 1.0)];
        let (bid, ask) = cross_to_profitable(&bids, &asks, 0.0);
        assert_eq!(bid, Some(PriceTick::new(99)));
        assert_eq!(ask, Some(PriceTick::new(103)));
    }
}
