//! ExecutionTracker ("lictor"): pulls the authenticated fill history through
//! the Gate and keeps a complete, ordered record of this agent's executions.
//!
//! TradesHistory is paginated; the exchange reports a total `count` alongside
//! each page. The update algorithm (spec.md §4.4) is:
//!
//! 1. Issue `raw-history(since, until=None)` and read back `{count, trades}`.
//! 2. If `count` is 0, there is nothing new this chunk.
//! 3. Otherwise pin `until` to the txid of the first returned fill, then
//!    loop issuing `raw-history(since, until, ofs=len(accum))` until the
//!    accumulated trade count reaches `count`, sleeping `delay` between
//!    requests to respect the rate budget. Pinning `until` keeps the result
//!    set stable across the whole walk even if new fills land mid-chunk.
//! 4. Every page must report the same `count`; a mismatch means the
//!    exchange's view shifted under the walk, which is a programmer-level
//!    invariant violation and kills the actor thread rather than risk
//!    silently missing fills.
//! 5. On success, sort the chunk ascending by timestamp and hand it to the
//!    worker, which appends each trade to the front of its list and
//!    advances `since` to the newest trade's txid.

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::error;

use crate::domain::{Execution, Side};
use crate::error::InvariantError;
use crate::exchange::TradesHistoryResponse;
use crate::gate::{GateHandle, GateRequest};
use crate::supervisor::supervise;

enum WorkerMsg {
    Poll,
    All(Sender<Vec<Execution>>),
    Since(Sender<Option<String>>),
}

#[derive(Clone)]
pub struct ExecutionTrackerHandle {
    tx: Sender<WorkerMsg>,
}

impl ExecutionTrackerHandle {
    /// All executions known so far, oldest first.
    pub fn all(&self) -> Vec<Execution> {
        let (reply, rx) = unbounded();
        if self.tx.send(WorkerMsg::All(reply)).is_err() {
            return Vec::new();
        }
        rx.recv().unwrap_or_default()
    }

    /// The txid cursor executions are pulled since, or `None` before the
    /// first successful chunk.
    pub fn since(&self) -> Option<String> {
        let (reply, rx) = unbounded();
        if self.tx.send(WorkerMsg::Since(reply)).is_err() {
            return None;
        }
        rx.recv().ok().flatten()
    }
}

pub struct ExecutionTracker {
    pub handle: ExecutionTrackerHandle,
    _updater: JoinHandle<()>,
    _worker: JoinHandle<()>,
}

impl ExecutionTracker {
    pub fn spawn(
        gate: GateHandle,
        poll_interval: Duration,
        page_delay: Duration,
    ) -> std::io::Result<Self> {
        let (worker_tx, worker_rx) = unbounded::<WorkerMsg>();

        let ticker_tx = worker_tx.clone();
        let updater = std::thread::Builder::new()
            .name("execution-tracker-updater".to_string())
            .spawn(move || loop {
                if ticker_tx.send(WorkerMsg::Poll).is_err() {
                    return;
                }
                std::thread::sleep(poll_interval);
            })?;

        let worker = supervise("execution-tracker-worker", worker_rx, move |rx| {
            run_worker(rx, gate.clone(), page_delay)
        });

        Ok(Self {
            handle: ExecutionTrackerHandle { tx: worker_tx },
            _updater: updater,
            _worker: worker,
        })
    }
}

fn run_worker(rx: Receiver<WorkerMsg>, gate: GateHandle, page_delay: Duration) -> bool {
    let mut executions: Vec<Execution> = Vec::new();
    let mut since: Option<String> = None;

    for msg in rx.iter() {
        match msg {
            WorkerMsg::Poll => match pull_new_chunk(&gate, since.as_deref(), page_delay) {
                Ok(new) => {
                    for execution in new {
                        since = Some(execution.txid.clone());
                        executions.insert(0, execution);
                    }
                }
                Err(e) => {
                    error!(error = %e, "execution tracker invariant violated, thread exiting");
                    return false;
                }
            },
            WorkerMsg::All(reply) => {
                let _ = reply.send(executions.clone());
            }
            WorkerMsg::Since(reply) => {
                let _ = reply.send(since.clone());
            }
        }
    }
    true
}

/// Fetches and pages through one chunk of new fills since `since`, following
/// spec.md §4.4's protocol exactly. Returns the chunk sorted ascending by
/// timestamp, ready for the worker to fold in one at a time.
fn pull_new_chunk(
    gate: &GateHandle,
    since: Option<&str>,
    page_delay: Duration,
) -> Result<Vec<Execution>, InvariantError> {
    let first = match request_page(gate, since, None, 0) {
        Some(p) => p,
        None => return Ok(Vec::new()),
    };
    if first.count == 0 {
        return Ok(Vec::new());
    }
    let count = first.count;
    let until = first.trades.keys().next().cloned();

    let mut accum: Vec<Execution> = first
        .trades
        .iter()
        .map(|(txid, raw)| raw_to_execution(txid, raw))
        .collect();

    while accum.len() < count {
        std::thread::sleep(page_delay);
        let page = match request_page(gate, since, until.as_deref(), accum.len()) {
            Some(p) => p,
            None => return Ok(Vec::new()),
        };
        if page.count != count {
            return Err(InvariantError::PageCountMismatch {
                expected: count,
                got: page.count,
            });
        }
        accum.extend(page.trades.iter().map(|(txid, raw)| raw_to_execution(txid, raw)));
    }

    accum.sort_by(|a, b| a.timestamp.partial_cmp(&b.timestamp).unwrap());
    Ok(accum)
}

/// `None` means a transient exchange error or malformed response — the
/// caller gives up on this chunk and retries on the next poll tick, rather
/// than treating it as the fatal invariant violation a page-count mismatch is.
fn request_page(
    gate: &GateHandle,
    since: Option<&str>,
    until: Option<&str>,
    ofs: usize,
) -> Option<TradesHistoryResponse> {
    let reply = gate.request(GateRequest::TradesHistory {
        since: since.map(str::to_string),
        until: until.map(str::to_string),
        ofs,
    });
    if !reply.errors.is_empty() {
        return None;
    }
    serde_json::from_value(reply.value?).ok()
}

fn raw_to_execution(txid: &str, raw: &crate::exchange::RawExecution) -> Execution {
    let price: f64 = raw.price.parse().unwrap_or(0.0);
    let volume: f64 = raw.vol.parse().unwrap_or(0.0);
    let cost: f64 = raw.cost.parse().unwrap_or(0.0);
    let fee: f64 = raw.fee.parse().unwrap_or(0.0);
    let side = if raw.side == "buy" { Side::Buy } else { Side::Sell };
    Execution {
        oid: raw.ordertxid.clone(),
        txid: txid.to_string(),
        timestamp: raw.time,
        side,
        pair: raw.pair.clone(),
        price,
        volume,
        cost,
        fee,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::RawExecution;

    fn raw(ordertxid: &str, time: f64, side: &str) -> RawExecution {
        RawExecution {
            ordertxid: ordertxid.to_string(),
            pair: "XBTUSD".to_string(),
            time,
            side: side.to_string(),
            price: "100.5".to_string(),
            cost: "10.05".to_string(),
            fee: "0.01".to_string(),
            vol: "0.1".to_string(),
        }
    }

    #[test]
    fn raw_to_execution_parses_numeric_strings_and_preserves_txid() {
        let e = raw_to_execution("t1", &raw("o1", 100.0, "buy"));
        assert_eq!(e.txid, "t1");
        assert_eq!(e.oid, "o1");
        assert_eq!(e.side, Side::Buy);
        assert!((e.price - 100.5).abs() < 1e-9);
        assert!((e.volume - 0.1).abs() < 1e-9);
    }

    #[test]
    fn raw_to_execution_unparseable_side_defaults_to_sell() {
        let e = raw_to_execution("t2", &raw("o2", 100.0, "garbage"));
        assert_eq!(e.side, Side::Sell);
    }
}
