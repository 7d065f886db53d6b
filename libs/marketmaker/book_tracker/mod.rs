//! BookTracker: maintains the current public order book and answers
//! snapshot-on-demand queries for each side.
//!
//! Same updater/worker split as TradesTracker: the updater polls the public
//! Depth endpoint, the worker owns the last-seen book and replies to
//! `bids`/`asks` queries with a fresh snapshot, never a stale cached one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{error, warn};

use crate::domain::{parse_price, BookLevel};
use crate::exchange::{ExchangeClient, RawBookLevel};
use crate::supervisor::supervise;

enum WorkerMsg {
    NewBook {
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
    },
    Bids(Sender<Vec<BookLevel>>),
    Asks(Sender<Vec<BookLevel>>),
}

#[derive(Clone)]
pub struct BookTrackerHandle {
    tx: Sender<WorkerMsg>,
    paused: Arc<AtomicBool>,
}

impl BookTrackerHandle {
    /// Bid levels, best price first. Empty if no book has been seen yet.
    pub fn bids(&self) -> Vec<BookLevel> {
        let (reply, rx) = unbounded();
        if self.tx.send(WorkerMsg::Bids(reply)).is_err() {
            return Vec::new();
        }
        rx.recv().unwrap_or_default()
    }

    /// Ask levels, best price first.
    pub fn asks(&self) -> Vec<BookLevel> {
        let (reply, rx) = unbounded();
        if self.tx.send(WorkerMsg::Asks(reply)).is_err() {
            return Vec::new();
        }
        rx.recv().unwrap_or_default()
    }

    pub fn pause(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }
}

pub struct BookTracker {
    pub handle: BookTrackerHandle,
    _updater: JoinHandle<()>,
    _worker: JoinHandle<()>,
}

impl BookTracker {
    pub fn spawn(
        base_url: impl Into<String>,
        pair: impl Into<String>,
        poll_interval: Duration,
        price_decimals: u32,
        depth_count: Option<u32>,
    ) -> std::io::Result<Self> {
        let (worker_tx, worker_rx) = unbounded::<WorkerMsg>();
        let base_url = base_url.into();
        let pair = pair.into();
        let paused = Arc::new(AtomicBool::new(false));

        let updater_tx = worker_tx.clone();
        let updater_paused = Arc::clone(&paused);
        let updater = std::thread::Builder::new()
            .name("book-tracker-updater".to_string())
            .spawn(move || {
                run_updater(
                    base_url,
                    pair,
                    poll_interval,
                    price_decimals,
                    depth_count,
                    updater_tx,
                    updater_paused,
                )
            })?;

        let worker_paused = Arc::clone(&paused);
        let worker = supervise("book-tracker-worker", worker_rx, move |rx| {
            run_worker(rx, Arc::clone(&worker_paused))
        });

        Ok(Self {
            handle: BookTrackerHandle {
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
    depth_count: Option<u32>,
    tx: Sender<WorkerMsg>,
    paused: Arc<AtomicBool>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "book-tracker updater failed to build runtime");
            return;
        }
    };
    let client = match ExchangeClient::new(base_url) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "book-tracker updater failed to build http client");
            return;
        }
    };

    loop {
        if !paused.load(Ordering::Relaxed) {
            match runtime.block_on(client.depth(&pair, depth_count)) {
                Ok(resp) => {
                    let bids = convert_levels(&resp.bids, price_decimals);
                    let asks = convert_levels(&resp.asks, price_decimals);
                    if tx.send(WorkerMsg::NewBook { bids, asks }).is_err() {
                        return;
                    }
                }
                Err(e) => warn!(error = %e, "book-tracker poll failed"),
            }
        }
        std::thread::sleep(poll_interval);
    }
}

fn convert_levels(raw: &[RawBookLevel], price_decimals: u32) -> Vec<BookLevel> {
    raw.iter()
        .filter_map(|RawBookLevel(price, volume, _ts)| {
            let price = parse_price(price, price_decimals).ok()?;
            let volume: f64 = volume.parse().ok()?;
            Some(BookLevel::new(price, volume))
        })
        .collect()
}

fn run_worker(rx: Receiver<WorkerMsg>, paused: Arc<AtomicBool>) -> bool {
    let mut bids: Vec<BookLevel> = Vec::new();
    let mut asks: Vec<BookLevel> = Vec::new();
    for msg in rx.iter() {
        match msg {
            WorkerMsg::NewBook { bids: b, asks: a } => {
                bids = b;
                asks = a;
            }
            WorkerMsg::Bids(reply) => {
                let snapshot = if paused.load(Ordering::Relaxed) { Vec::new() } else { bids.clone() };
                let _ = reply.send(snapshot);
            }
            WorkerMsg::Asks(reply) => {
                let snapshot = if paused.load(Ordering::Relaxed) { Vec::new() } else { asks.clone() };
                let _ = reply.send(snapshot);
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_levels_skips_malformed_rows() {
        let raw = vec![
            RawBookLevel("100.5".to_string(), "1.0".to_string(), 0.0),
            RawBookLevel("not-a-number".to_string(), "1.0".to_string(), 0.0),
        ];
        let levels = convert_levels(&raw, 1);
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].volume, 1.0);
    }
}
