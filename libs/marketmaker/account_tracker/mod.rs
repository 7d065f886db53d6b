//! AccountTracker: the agent's view of its own balances and fill history.
//!
//! Owns an `ExecutionTracker` (for `vwap`) and exposes a `balance` query
//! backed by a periodic authenticated `Balance` poll through the Gate. Also
//! owns the `Ope` used to actually place and cancel orders, since placing
//! an order and accounting for its effect on balance are tightly coupled in
//! practice (the teacher's `InFlightTracker` plays the analogous role).

use std::collections::HashMap;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::warn;

use crate::domain::Side;
use crate::execution_tracker::{ExecutionTracker, ExecutionTrackerHandle};
use crate::gate::{GateHandle, GateRequest};
use crate::ope::Ope;
use crate::supervisor::supervise;

enum WorkerMsg {
    Poll,
    Balance { asset: String, reply: Sender<f64> },
    SetKeySlot {
        key_file: String,
        secret_file: String,
        reply: Sender<bool>,
    },
}

#[derive(Clone)]
pub struct AccountTrackerHandle {
    tx: Sender<WorkerMsg>,
    execution_tracker: ExecutionTrackerHandle,
}

impl AccountTrackerHandle {
    /// Balance of `asset`, or `0.0` if the exchange has never reported one
    /// (an asset never funded is indistinguishable from a zero balance).
    pub fn balance(&self, asset: &str) -> f64 {
        let (reply, rx) = unbounded();
        if self
            .tx
            .send(WorkerMsg::Balance {
                asset: asset.to_string(),
                reply,
            })
            .is_err()
        {
            return 0.0;
        }
        rx.recv().unwrap_or(0.0)
    }

    /// Volume-weighted average fill price for `side` on `pair`, folded over
    /// every execution the lictor has pulled. `None` if there are no fills
    /// on that side yet.
    pub fn vwap(&self, side: Side, pair: &str) -> Option<f64> {
        let fills = self.execution_tracker.all();
        let relevant: Vec<_> = fills
            .iter()
            .filter(|e| e.side == side && e.pair == pair)
            .collect();
        let total_volume: f64 = relevant.iter().map(|e| e.volume).sum();
        if total_volume <= 0.0 {
            return None;
        }
        let total_cost: f64 = relevant.iter().map(|e| e.cost).sum();
        Some(total_cost / total_volume)
    }

    /// Hot-swaps the Gate's credentials atomically from the account
    /// tracker's perspective: the next `Balance` poll uses the new keys.
    pub fn set_key_slot(&self, key_file: impl Into<String>, secret_file: impl Into<String>) -> bool {
        let (reply, rx) = unbounded();
        if self
            .tx
            .send(WorkerMsg::SetKeySlot {
                key_file: key_file.into(),
                secret_file: secret_file.into(),
                reply,
            })
            .is_err()
        {
            return false;
        }
        rx.recv().unwrap_or(false)
    }
}

pub struct AccountTracker {
    pub handle: AccountTrackerHandle,
    pub execution_tracker: ExecutionTracker,
    pub ope: Ope,
    _updater: JoinHandle<()>,
    _worker: JoinHandle<()>,
}

impl AccountTracker {
    pub fn spawn(
        gate: GateHandle,
        pair: impl Into<String>,
        price_decimals: u32,
        balance_poll_interval: Duration,
        executions_poll_interval: Duration,
        executions_page_delay: Duration,
    ) -> std::io::Result<Self> {
        let pair = pair.into();
        let execution_tracker =
            ExecutionTracker::spawn(gate.clone(), executions_poll_interval, executions_page_delay)?;
        let ope = Ope::new(gate.clone(), pair, price_decimals);

        let (worker_tx, worker_rx) = unbounded::<WorkerMsg>();

        let ticker_tx = worker_tx.clone();
        let updater = std::thread::Builder::new()
            .name("account-tracker-updater".to_string())
            .spawn(move || loop {
                if ticker_tx.send(WorkerMsg::Poll).is_err() {
                    return;
                }
                std::thread::sleep(balance_poll_interval);
            })?;

        let worker_gate = gate;
        let worker = supervise("account-tracker-worker", worker_rx, move |rx| {
            run_worker(rx, worker_gate.clone())
        });

        Ok(Self {
            handle: AccountTrackerHandle {
                tx: worker_tx,
                execution_tracker: execution_tracker.handle.clone(),
            },
            execution_tracker,
            ope,
            _updater: updater,
            _worker: worker,
        })
    }
}

fn run_worker(rx: Receiver<WorkerMsg>, gate: GateHandle) -> bool {
    let mut balances: HashMap<String, f64> = HashMap::new();

    for msg in rx.iter() {
        match msg {
            WorkerMsg::Poll => {
                let reply = gate.request(GateRequest::Balance);
                if !reply.errors.is_empty() {
                    warn!(errors = ?reply.errors, "account tracker balance poll failed");
                    continue;
                }
                if let Some(value) = reply.value {
                    match serde_json::from_value::<crate::exchange::BalanceResponse>(value) {
                        Ok(raw) => {
                            balances = raw
                                .into_iter()
                                .filter_map(|(k, v)| v.parse::<f64>().ok().map(|f| (k, f)))
                                .collect();
                        }
                        Err(e) => warn!(error = %e, "account tracker failed to decode balances"),
                    }
                }
            }
            WorkerMsg::Balance { asset, reply } => {
                let _ = reply.send(*balances.get(&asset).unwrap_or(&0.0));
            }
            WorkerMsg::SetKeySlot {
                key_file,
                secret_file,
                reply,
            } => {
                let result = gate.request(GateRequest::SetKeySlot { key_file, secret_file });
                let ok = result.value.and_then(|v| v.as_bool()).unwrap_or(false);
                let _ = reply.send(ok);
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vwap_filters_by_side_and_pair() {
        use crate::domain::Execution;

        let fills = vec![
            Execution {
                oid: "o1".into(),
                txid: "t1".into(),
                timestamp: 1.0,
                side: Side::Buy,
                pair: "XBTUSD".into(),
                price: 100.0,
                volume: 1.0,
                cost: 100.0,
                fee: 0.1,
            },
            Execution {
                oid: "o2".into(),
                txid: "t2".into(),
                timestamp: 2.0,
                side: Side::Buy,
                pair: "XBTUSD".into(),
                price: 102.0,
                volume: 1.0,
                cost: 102.0,
                fee: 0.1,
            },
            Execution {
                oid: "o3".into(),
                txid: "t3".into(),
                timestamp: 3.0,
                side: Side::Sell,
                pair: "XBTUSD".into(),
                price: 200.0,
                volume: 1.0,
                cost: 200.0,
                fee: 0.1,
            },
        ];

        let total_volume: f64 = fills
            .iter()
            .filter(|e| e.side == Side::Buy && e.pair == "XBTUSD")
            .map(|e| e.volume)
            .sum();
        let total_cost: f64 = fills
            .iter()
            .filter(|e| e.side == Side::Buy && e.pair == "XBTUSD")
            .map(|e| e.cost)
            .sum();
        assert_eq!(total_cost / total_volume, 101.0);
    }
}
