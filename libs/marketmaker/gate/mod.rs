//! The Gate: the single serializer in front of the signed HTTP transport.
//!
//! One worker thread owns the `ExchangeClient` and `Credentials`. Every
//! authenticated call in the system — from ExecutionTracker, AccountTracker,
//! and the OPE — goes through a `GateHandle`, so at most one signed request
//! is ever in flight. Public market data (Trades, Depth) bypasses the Gate
//! entirely; TradesTracker and BookTracker hold their own `ExchangeClient`.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{error, info, warn};

use crate::error::ExchangeError;
use crate::exchange::{AddOrderRequest, Credentials, ExchangeClient};
use crate::supervisor::supervise;

/// What the Gate can be asked to do. `SetKeySlot` hot-swaps credentials
/// without restarting the worker thread or losing queued requests.
pub enum GateRequest {
    Balance,
    OpenOrders,
    AddOrder(AddOrderRequest),
    CancelOrder { txid: String },
    TradesHistory {
        since: Option<String>,
        until: Option<String>,
        ofs: usize,
    },
    SetKeySlot { key_file: String, secret_file: String },
}

/// A JSON-ish reply plus any error strings the exchange attached to it.
/// `value` is `None` exactly when `errors` is non-empty.
pub struct GateReply {
    pub value: Option<serde_json::Value>,
    pub errors: Vec<String>,
}

impl GateReply {
    fn ok<T: serde::Serialize>(value: T) -> Self {
        Self {
            value: serde_json::to_value(value).ok(),
            errors: Vec::new(),
        }
    }

    fn err(e: ExchangeError) -> Self {
        let errors = match e {
            ExchangeError::Api(errs) => errs,
            other => vec![other.to_string()],
        };
        Self {
            value: None,
            errors,
        }
    }
}

struct Envelope {
    request: GateRequest,
    reply: Sender<GateReply>,
}

/// Cloneable handle callers hold; the worker thread is the only owner of
/// the receiving end.
#[derive(Clone)]
pub struct GateHandle {
    tx: Sender<Envelope>,
}

impl GateHandle {
    /// Builds a handle backed by a fake in-process responder instead of a
    /// real Gate worker, so callers like the OPE can be exercised against
    /// canned exchange replies without a Gate or HTTP transport behind them.
    #[cfg(test)]
    pub(crate) fn fake(mut respond: impl FnMut(GateRequest) -> GateReply + Send + 'static) -> Self {
        let (tx, rx) = unbounded::<Envelope>();
        std::thread::spawn(move || {
            for envelope in rx.iter() {
                let _ = envelope.reply.send(respond(envelope.request));
            }
        });
        Self { tx }
    }

    /// Blocks until the worker thread answers. Call from actor threads only
    /// (never from inside the Gate's own worker loop).
    pub fn request(&self, request: GateRequest) -> GateReply {
        let (reply_tx, reply_rx) = unbounded();
        if self
            .tx
            .send(Envelope {
                request,
                reply: reply_tx,
            })
            .is_err()
        {
            return GateReply {
                value: None,
                errors: vec!["gate worker is gone".to_string()],
            };
        }
        reply_rx
            .recv()
            .unwrap_or_else(|_| GateReply {
                value: None,
                errors: vec!["gate worker dropped reply channel".to_string()],
            })
    }
}

/// Spawns the Gate's worker thread. `pair` is unused by the Gate itself but
/// kept so the exchange base URL and credentials are all configured in one
/// place at startup.
pub struct Gate {
    pub handle: GateHandle,
    _supervisor: JoinHandle<()>,
}

impl Gate {
    pub fn spawn(
        base_url: impl Into<String>,
        key_file: impl Into<String>,
        secret_file: impl Into<String>,
        min_request_interval: Duration,
    ) -> std::io::Result<Self> {
        let (tx, rx) = unbounded::<Envelope>();
        let base_url = base_url.into();
        let key_file = key_file.into();
        let secret_file = secret_file.into();

        let supervisor = supervise("gate", rx, move |rx| {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build()
            {
                Ok(r) => r,
                Err(e) => {
                    error!(error = %e, "gate failed to build tokio runtime, worker exiting");
                    return false;
                }
            };

            let mut client = match ExchangeClient::new(base_url.clone()) {
                Ok(c) => c,
                Err(e) => {
                    error!(error = %e, "gate failed to build http client, worker exiting");
                    return false;
                }
            };
            let mut creds = load_credentials(&key_file, &secret_file);
            let mut key_slot = key_file.clone();
            let mut secret_slot = secret_file.clone();
            let mut limiter = RateLimiter::new(min_request_interval);

            info!("gate worker started");
            // `run_worker` only returns once its `for envelope in rx.iter()`
            // loop runs dry, i.e. every `Sender` is gone — an ordinary
            // shutdown, never an early return.
            run_worker(
                &rx,
                &runtime,
                &mut client,
                &mut creds,
                &mut key_slot,
                &mut secret_slot,
                &mut limiter,
            );
            warn!("gate worker exiting, channel closed");
            true
        });

        Ok(Self {
            handle: GateHandle { tx },
            _supervisor: supervisor,
        })
    }
}

/// Per-key rate budget (§3 Gate invariant): the worker never starts an
/// outbound HTTP call sooner than `min_interval` after the previous one.
struct RateLimiter {
    min_interval: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: None,
        }
    }

    /// Blocks, if needed, so the next call starts no sooner than
    /// `min_interval` after the previous one, then records the new start.
    fn wait(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        self.last_request = Some(Instant::now());
    }
}

fn load_credentials(key_file: &str, secret_file: &str) -> Option<Arc<Credentials>> {
    match Credentials::load_from_files(key_file, secret_file) {
        Ok(c) => Some(Arc::new(c)),
        Err(e) => {
            warn!(error = %e, key_file, secret_file, "gate could not load credentials yet");
            None
        }
    }
}

fn run_worker(
    rx: &Receiver<Envelope>,
    runtime: &tokio::runtime::Runtime,
    client: &mut ExchangeClient,
    creds: &mut Option<Arc<Credentials>>,
    key_file: &mut String,
    secret_file: &mut String,
    limiter: &mut RateLimiter,
) {
    for envelope in rx.iter() {
        let reply = match envelope.request {
            GateRequest::SetKeySlot {
                key_file: new_key,
                secret_file: new_secret,
            } => {
                *key_file = new_key;
                *secret_file = new_secret;
                *creds = load_credentials(key_file, secret_file);
                GateReply {
                    value: Some(serde_json::Value::Bool(creds.is_some())),
                    errors: Vec::new(),
                }
            }
            other => match creds.clone() {
                None => GateReply {
                    value: None,
                    errors: vec!["no credentials loaded".to_string()],
                },
                Some(creds) => {
                    limiter.wait();
                    runtime.block_on(dispatch(client, &creds, other))
                }
            },
        };
        let _ = envelope.reply.send(reply);
    }
}

async fn dispatch(
    client: &ExchangeClient,
    creds: &Credentials,
    request: GateRequest,
) -> GateReply {
    match request {
        GateRequest::Balance => client
            .balance(creds)
            .await
            .map(GateReply::ok)
            .unwrap_or_else(GateReply::err),
        GateRequest::OpenOrders => client
            .open_orders(creds)
            .await
            .map(GateReply::ok)
            .unwrap_or_else(GateReply::err),
        GateRequest::AddOrder(req) => client
            .add_order(creds, &req)
            .await
            .map(GateReply::ok)
            .unwrap_or_else(GateReply::err),
        GateRequest::CancelOrder { txid } => client
            .cancel_order(creds, &txid)
            .await
            .map(GateReply::ok)
            .unwrap_or_else(GateReply::err),
        GateRequest::TradesHistory { since, until, ofs } => client
            .trades_history(creds, since.as_deref(), until.as_deref(), ofs)
            .await
            .map(GateReply::ok)
            .unwrap_or_else(GateReply::err),
        GateRequest::SetKeySlot { .. } => unreachable!("handled before dispatch"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_first_call_never_waits() {
        let mut limiter = RateLimiter::new(Duration::from_millis(500));
        let start = Instant::now();
        limiter.wait();
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn rate_limiter_spaces_consecutive_calls() {
        let mut limiter = RateLimiter::new(Duration::from_millis(50));
        limiter.wait();
        let start = Instant::now();
        limiter.wait();
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn err_unpacks_api_error_list() {
        let reply = GateReply::err(ExchangeError::Api(vec!["Unknown order".to_string()]));
        assert!(reply.value.is_none());
        assert_eq!(reply.errors, vec!["Unknown order".to_string()]);
    }
}
