//! The Maker: the actor that actually runs the market-making strategy,
//! once per `round_interval_secs`, by pulling from every tracker and
//! driving the OPE (§4.7).

mod book_clean;
mod ladder;
mod reconcile;
mod round;
mod sizing;

pub use reconcile::Action;
pub use round::{gather_inputs, run_round, RoundConfig, RoundInputs};

use std::panic::AssertUnwindSafe;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::account_tracker::AccountTrackerHandle;
use crate::book_tracker::BookTrackerHandle;
use crate::domain::LiveOrder;
use crate::gate::{GateHandle, GateRequest};
use crate::ope::Ope;
use crate::trades_tracker::TradesTrackerHandle;

/// Pauses BookTracker and TradesTracker for as long as it lives, resuming
/// both on drop (including on panic unwind) so a round can never leave them
/// paused past its own window.
struct Quiesce<'a> {
    book: &'a BookTrackerHandle,
    trades: &'a TradesTrackerHandle,
}

impl<'a> Quiesce<'a> {
    fn new(book: &'a BookTrackerHandle, trades: &'a TradesTrackerHandle) -> Self {
        book.pause(true);
        trades.pause(true);
        Self { book, trades }
    }
}

impl Drop for Quiesce<'_> {
    fn drop(&mut self) {
        self.book.pause(false);
        self.trades.pause(false);
    }
}

pub struct Maker {
    _round_loop: JoinHandle<()>,
}

impl Maker {
    /// Spawns the round loop. The Maker has no externally-visible handle:
    /// nothing queries it, it only acts, so unlike the trackers it does not
    /// need a reply-channel API of its own.
    pub fn spawn(
        gate: GateHandle,
        book: BookTrackerHandle,
        account: AccountTrackerHandle,
        trades: TradesTrackerHandle,
        ope: Ope,
        cfg: RoundConfig,
        round_interval: Duration,
    ) -> std::io::Result<Self> {
        let round_loop = std::thread::Builder::new()
            .name("maker".to_string())
            .spawn(move || loop {
                let round = AssertUnwindSafe(|| {
                    match fetch_live_orders(&gate, &cfg.pair, cfg.price_decimals) {
                        Ok((live_bids, live_asks)) => {
                            let now = std::time::SystemTime::now()
                                .duration_since(std::time::UNIX_EPOCH)
                                .map(|d| d.as_secs_f64())
                                .unwrap_or(0.0);
                            let inputs = gather_inputs(
                                &book, &account, &trades, &cfg, now, live_bids, live_asks,
                            );
                            // Both trackers go quiet for the reconciliation window
                            // so nothing else gets served a stale or mid-update
                            // view of the book or trade window while this round
                            // is busy placing and cancelling orders against them.
                            let actions = {
                                let _quiesce = Quiesce::new(&book, &trades);
                                run_round(&inputs, &cfg, &ope)
                            };
                            info!(
                                count = actions.len(),
                                at = %chrono::Utc::now().to_rfc3339(),
                                "round complete"
                            );
                        }
                        Err(e) => warn!(error = %e, "maker could not fetch open orders this round"),
                    }
                });
                // A round that panics (an invariant violation surfacing as a
                // Rust panic rather than a returned error) must not take the
                // whole Maker down with it; the next tick tries again fresh,
                // same as the restart-on-death contract every other actor gets
                // from `supervisor::supervise`.
                if std::panic::catch_unwind(round).is_err() {
                    error!("maker round panicked, continuing at next tick");
                }
                std::thread::sleep(round_interval);
            })?;

        Ok(Self {
            _round_loop: round_loop,
        })
    }
}

fn fetch_live_orders(
    gate: &GateHandle,
    pair: &str,
    price_decimals: u32,
) -> Result<(Vec<LiveOrder>, Vec<LiveOrder>), crate::error::ExchangeError> {
    let reply = gate.request(GateRequest::OpenOrders);
    if !reply.errors.is_empty() {
        return Err(crate::error::ExchangeError::Api(reply.errors));
    }
    let value = reply
        .value
        .ok_or_else(|| crate::error::ExchangeError::Decode("missing open orders".to_string()))?;
    let open: crate::exchange::OpenOrdersResponse =
        serde_json::from_value(value).map_err(|e| crate::error::ExchangeError::Decode(e.to_string()))?;

    let mut bids = Vec::new();
    let mut asks = Vec::new();
    for (txid, order) in open.open {
        if order.descr.pair != pair {
            continue;
        }
        let price = match crate::domain::parse_price(&order.descr.price, price_decimals) {
            Ok(p) => p,
            Err(_) => continue,
        };
        let vol: f64 = order.vol.parse().unwrap_or(0.0);
        let vol_exec: f64 = order.vol_exec.parse().unwrap_or(0.0);
        let remaining = (vol - vol_exec).max(0.0);
        let live = LiveOrder::new(txid, price, remaining);
        match order.descr.side.as_str() {
            "buy" => bids.push(live),
            "sell" => asks.push(live),
            _ => {}
        }
    }
    Ok((bids, asks))
}
