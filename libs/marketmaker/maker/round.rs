//! One round of market-making (§4.7): snapshot the world, size the round,
//! clean the book, cross to a profitable spread, generate a ladder for each
//! side, and reconcile each side's ladder against what's actually resting.

use tracing::warn;

use crate::account_tracker::AccountTrackerHandle;
use crate::book_tracker::BookTrackerHandle;
use crate::domain::{LiveOrder, PriceTick, Side};
use crate::ope::Ope;
use crate::trades_tracker::TradesTrackerHandle;

use super::book_clean::{cross_to_profitable, ignore_mine};
use super::ladder::dumbot_oneside;
use super::reconcile::{reconcile, Action};
use super::sizing::size_round;

pub struct RoundConfig {
    pub pair: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub price_decimals: u32,
    pub resilience_factor: f64,
    pub fund_factor: f64,
    pub targeting_factor: f64,
    pub fee_pct: f64,
    pub max_orders: usize,
    pub reconcile_tolerance: f64,
    pub replace_equal_price: bool,
    /// How far back `rate` (the base/quote conversion VWAP) looks, in seconds.
    pub vwap_window_secs: f64,
}

/// What a round needs to read before it can act: the cleaned book, the
/// agent's own live orders on each side, its current balances, and the
/// trade-derived inputs sizing depends on (§4.7 steps 1-2).
pub struct RoundInputs {
    pub bids: Vec<crate::domain::BookLevel>,
    pub asks: Vec<crate::domain::BookLevel>,
    pub live_bids: Vec<LiveOrder>,
    pub live_asks: Vec<LiveOrder>,
    pub base_balance: f64,
    pub quote_balance: f64,
    /// Largest trade currently in TradesTracker's window, or `0.0` if none.
    pub max_recent_trade: f64,
    /// VWAP over the last `vwap_window_secs`, used as a base/quote
    /// conversion rate. `0.0` (sizing treats this as "no rate available")
    /// if the window has had no trades.
    pub rate: f64,
    /// Realized buy/sell VWAP from AccountTracker, folded over every fill
    /// on this pair. `None` if the agent has no fills on that side yet.
    pub buy_vwap: Option<f64>,
    pub sell_vwap: Option<f64>,
}

pub fn gather_inputs(
    book: &BookTrackerHandle,
    account: &AccountTrackerHandle,
    trades: &TradesTrackerHandle,
    cfg: &RoundConfig,
    now: f64,
    live_bids: Vec<LiveOrder>,
    live_asks: Vec<LiveOrder>,
) -> RoundInputs {
    let max_recent_trade = trades.max().map(|t| t.volume).unwrap_or(0.0);
    let since = now - cfg.vwap_window_secs;
    let rate = trades.vwap(Some(since), None).unwrap_or(0.0);
    let buy_vwap = account.vwap(Side::Buy, &cfg.pair);
    let sell_vwap = account.vwap(Side::Sell, &cfg.pair);
    RoundInputs {
        bids: book.bids(),
        asks: book.asks(),
        live_bids,
        live_asks,
        base_balance: account.balance(&cfg.base_asset),
        quote_balance: account.balance(&cfg.quote_asset),
        max_recent_trade,
        rate,
        buy_vwap,
        sell_vwap,
    }
}

/// Runs one full round: sizing, cleaning, crossing, ladder generation, and
/// reconciliation for both sides. Returns the actions taken (for logging /
/// testing); actually executing them against the exchange happens here too,
/// via `ope`, since a round that computed actions but didn't apply them
/// would leave the agent's live state silently stale until the next tick.
pub fn run_round(inputs: &RoundInputs, cfg: &RoundConfig, ope: &Ope) -> Vec<Action> {
    let cleaned_bids = ignore_mine(&inputs.bids, &inputs.live_bids);
    let cleaned_asks = ignore_mine(&inputs.asks, &inputs.live_asks);

    let (bid_touch, ask_touch) = cross_to_profitable(&cleaned_bids, &cleaned_asks, cfg.fee_pct);
    let (bid_touch, ask_touch) = match (bid_touch, ask_touch) {
        (Some(b), Some(a)) => (b, a),
        _ => {
            warn!("no profitable spread this round, skipping");
            return Vec::new();
        }
    };

    // `cross_to_profitable` may have walked past index 0 on either side; the
    // ladder must only ever see the levels from the resolved touch outward,
    // never the crossed-away levels ahead of it.
    let bid_levels = levels_from(&cleaned_bids, bid_touch);
    let ask_levels = levels_from(&cleaned_asks, ask_touch);

    if cfg.rate <= 0.0 {
        warn!("no trades-derived conversion rate yet, skipping round");
        return Vec::new();
    }

    let sizing = size_round(
        inputs.base_balance,
        inputs.quote_balance,
        cfg.rate,
        inputs.max_recent_trade,
        cfg.resilience_factor,
        cfg.fund_factor,
        cfg.targeting_factor,
    );
    let deploy_ask_quote = sizing.deploy_base * cfg.rate;

    let bid_ladder = dumbot_oneside(
        Side::Buy,
        bid_levels,
        sizing.deploy_quote,
        sizing.resilience,
        cfg.max_orders,
    );
    let ask_ladder = dumbot_oneside(
        Side::Sell,
        ask_levels,
        deploy_ask_quote,
        sizing.resilience,
        cfg.max_orders,
    );

    let price_to_volume = |price: PriceTick, quote: f64| -> f64 {
        let p = price.0 as f64 / 10f64.powi(cfg.price_decimals as i32);
        quote / p.max(f64::EPSILON)
    };

    let bid_actions = reconcile(
        &bid_ladder,
        &inputs.live_bids,
        Side::Buy,
        price_to_volume,
        cfg.reconcile_tolerance,
        cfg.replace_equal_price,
        ope,
    );
    let ask_actions = reconcile(
        &ask_ladder,
        &inputs.live_asks,
        Side::Sell,
        price_to_volume,
        cfg.reconcile_tolerance,
        cfg.replace_equal_price,
        ope,
    );

    bid_actions.into_iter().chain(ask_actions).collect()
}

/// Slices `levels` (best price first) down to the sub-slice starting at
/// `touch`, the price `cross_to_profitable` actually resolved for this
/// side. Falls back to the full slice if `touch` isn't found (shouldn't
/// happen: `touch` always came from one of these levels), rather than
/// silently dropping the round's whole ladder over a lookup fluke.
fn levels_from(levels: &[crate::domain::BookLevel], touch: PriceTick) -> &[crate::domain::BookLevel] {
    match levels.iter().position(|l| l.price == touch) {
        Some(idx) => &levels[idx..],
        None => levels,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_book_produces_no_actions_without_ope() {
        let inputs = RoundInputs {
            bids: vec![],
            asks: vec![],
            live_bids: vec![],
            live_asks: vec![],
            base_balance: 0.0,
            quote_balance: 0.0,
            max_recent_trade: 0.0,
            rate: 0.0,
            buy_vwap: None,
            sell_vwap: None,
        };
        let (bid, ask) = cross_to_profitable(&inputs.bids, &inputs.asks, 0.16);
        assert!(bid.is_none() && ask.is_none());
    }

    #[test]
    fn levels_from_slices_at_the_resolved_touch() {
        use crate::domain::BookLevel;
        let levels = vec![
            BookLevel::new(PriceTick::new(1000), 1.0),
            BookLevel::new(PriceTick::new(999), 1.0),
            BookLevel::new(PriceTick::new(998), 1.0),
        ];
        let sliced = levels_from(&levels, PriceTick::new(999));
        assert_eq!(sliced.len(), 2);
        assert_eq!(sliced[0].price, PriceTick::new(999));
    }
}
