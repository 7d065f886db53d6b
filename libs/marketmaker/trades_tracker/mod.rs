//! TradesTracker: maintains a rolling window of recent public trades and
//! answers `max`/`vwap` queries against it.
//!
//! An updater thread polls the public Trades endpoint on an interval and
//! forwards newly seen trades to a worker thread, which owns the window and
//! answers queries. This mirrors the teacher's split between a polling
//! updater and a query-answering worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{error, warn};

use crate::domain::{ingest_trade, Side, TradeEvent};
use crate::exchange::ExchangeClient;
use crate::supervisor::supervise;

enum WorkerMsg {
    NewTrades(Vec<TradeEvent>),
    Max {
        reply: Sender<Option<TradeEvent>>,
    },
    Vwap {
        since: Option<f64>,
        side: Option<Side>,
        reply: Sender<Option<f64>>,
    },
}

#[derive(Clone)]
pub struct TradesTrackerHandle {
    tx: Sender<WorkerMsg>,
    paused: Arc<AtomicBool>,
}

impl TradesTrackerHandle {
    /// The single largest trade currently in the window, if any.
    pub fn max(&self) -> Option<TradeEvent> {
        let (reply, rx) = unbounded();
        if self.tx.send(WorkerMsg::Max { reply }).is_err() {
            return None;
        }
        rx.recv().ok().flatten()
    }

    /// Volume-weighted average price over trades at or after `since`
    /// (unix seconds), optionally filtered to one side. `None` for `since`
    /// means the whole window. Fails (returns `None`) rather than producing
    /// NaN when the filtered set is empty.
    pub fn vwap(&self, since: Option<f64>, side: Option<Side>) -> Option<f64> {
        let (reply, rx) = unbounded();
        if self
            .tx
            .send(WorkerMsg::Vwap { since, side, reply })
            .is_err()
        {
            return None;
        }
        rx.recv().ok().flatten()
    }

    /// Suspends (or resumes) the updater's polling loop without tearing
    /// down either thread.
    pub fn pause(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }
}

pub struct TradesTracker {
    pub handle: TradesTrackerHandle,
    _updater: JoinHandle<()>,
    _worker: JoinHandle<()>,
}

impl TradesTracker {
    pub fn spawn(
        base_url: impl Into<String>,
        pair: impl Into<String>,
        poll_interval: Duration,
        price_decimals: u32,
        max_age_secs: Option<f64>,
    ) -> std::io::Result<Self> {
        let (worker_tx, worker_rx) = unbounded::<WorkerMsg>();
        let pair = pair.into();
        let base_url = base_url.into();
        let paused = Arc::new(AtomicBool::new(false));

        let updater_tx = worker_tx.clone();
        let updater_pair = pair.clone();
        let updater_paused = Arc::clone(&paused);
        let updater = std::thread::Builder::new()
            .name("trades-tracker-updater".to_string())
            .spawn(move || {
                run_updater(
                    base_url,
                    updater_pair,
                    poll_interval,
                    price_decimals,
                    updater_tx,
                    updater_paused,
                )
            })?;

        let worker_paused = Arc::clone(&paused);
        let worker = supervise("trades-tracker-worker", worker_rx, move |rx| {
            run_worker(rx, max_age_secs, Arc::clone(&worker_paused))
        });

        Ok(Self {
            handle: TradesTrackerHandle {
                tx: worker_tx,
                paused,
            },
            _updater: updater,
            _worker: worker,
        })
    }
}

fn run_updater(
    base_url: String,
    pair: String,
    poll_interval: Duration,
    price_decimals: u32,
    tx: Sender<WorkerMsg>,
    paused: Arc<AtomicBool>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "trades-tracker updater failed to build runtime");
            return;
        }
    };
    let client = match ExchangeClient::new(base_url) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "trades-tracker updater failed to build http client");
            return;
        }
    };

    let mut since: Option<String> = None;
    loop {
        if !paused.load(Ordering::Relaxed) {
            match runtime.block_on(client.trades(&pair, since.as_deref())) {
                Ok(resp) => {
                    let events: Vec<TradeEvent> = resp
                        .trades
                        .iter()
                        .filter_map(|t| raw_to_event(t, price_decimals))
                        .collect();
                    since = Some(resp.last);
                    if !events.is_empty() && tx.send(WorkerMsg::NewTrades(events)).is_err() {
                        return;
                    }
                }
                Err(e) => warn!(error = %e, "trades-tracker poll failed"),
            }
        }
        std::thread::sleep(poll_interval);
    }
}

fn raw_to_event(raw: &crate::exchange::RawTrade, price_decimals: u32) -> Option<TradeEvent> {
    let tick = crate::domain::parse_price(&raw.price, price_decimals).ok()?;
    let price: f64 = tick.to_decimal_string(price_decimals).parse().ok()?;
    let volume: f64 = raw.volume.parse().ok()?;
    let side = match raw.side.as_str() {
        "b" => Side::Buy,
        "s" => Side::Sell,
        _ => return None,
    };
    Some(TradeEvent::new(raw.time, volume, price, side, raw.kind.clone(), ""))
}

fn run_worker(rx: Receiver<WorkerMsg>, max_age_secs: Option<f64>, paused: Arc<AtomicBool>) -> bool {
    let mut window: Vec<TradeEvent> = Vec::new();
    for msg in rx.iter() {
        match msg {
            WorkerMsg::NewTrades(events) => {
                for e in events {
                    ingest_trade(&mut window, e);
                }
                if let Some(max_age) = max_age_secs {
                    // `window` is newest-first (ingest_trade prepends), so
                    // the front holds the newest timestamp to age others against.
                    if let Some(newest) = window.first().map(|t| t.timestamp) {
                        window.retain(|t| newest - t.timestamp <= max_age);
                    }
                }
            }
            WorkerMsg::Max { reply } => {
                // While paused the tracker goes quiet until the next
                // control message arrives, per the quiescence contract.
                if paused.load(Ordering::Relaxed) {
                    let _ = reply.send(None);
                    continue;
                }
                let max = window
                    .iter()
                    .cloned()
                    .max_by(|a, b| a.volume.partial_cmp(&b.volume).unwrap());
                let _ = reply.send(max);
            }
            WorkerMsg::Vwap { since, side, reply } => {
                if paused.load(Ordering::Relaxed) {
                    let _ = reply.send(None);
                    continue;
                }
                let filtered: Vec<&TradeEvent> = window
                    .iter()
                    .filter(|t| since.map_or(true, |s| t.timestamp >= s))
                    .filter(|t| side.map_or(true, |s| t.side == s))
                    .collect();
                let total_volume: f64 = filtered.iter().map(|t| t.volume).sum();
                let result = if total_volume <= 0.0 {
                    None
                } else {
                    let total_cost: f64 = filtered.iter().map(|t| t.cost).sum();
                    Some(total_cost / total_volume)
                };
                let _ = reply.send(result);
            }
        }
    }
    true
}
