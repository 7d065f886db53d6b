//! Thin REST client over the exchange's six endpoints.
//!
//! Public endpoints (`assets`, `asset_pairs`, `trades`, `depth`) need no
//! credentials and are called directly by TradesTracker/BookTracker.
//! Private endpoints (`balance`, `open_orders`, `add_order`, `cancel_order`,
//! `trades_history`) are only ever called from inside the Gate's worker
//! thread, which owns the signer and serializes access.

use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::Client;

use super::signer::{Credentials, Signer};
use super::types::*;
use crate::error::ExchangeError;

const USER_AGENT: &str = "marketmaker/0.1";

/// Builds a single, reusable HTTP client with sane defaults. Rebuilt by the
/// caller (never internally) if it ever starts erroring on every request.
pub fn build_http_client() -> Result<Client, ExchangeError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .map_err(|e| ExchangeError::Transport(e.to_string()))
}

pub struct ExchangeClient {
    http: Client,
    base_url: String,
}

impl ExchangeClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ExchangeError> {
        Ok(Self {
            http: build_http_client()?,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_public<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let resp = self
            .http
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        decode::<T>(resp).await
    }

    pub async fn assets(&self) -> Result<AssetsResponse, ExchangeError> {
        self.get_public("/public/Assets", &[]).await
    }

    pub async fn asset_pairs(&self) -> Result<AssetPairsResponse, ExchangeError> {
        self.get_public("/public/AssetPairs", &[]).await
    }

    pub async fn trades(
        &self,
        pair: &str,
        since: Option<&str>,
    ) -> Result<TradesResponse, ExchangeError> {
        let mut q = vec![("pair".to_string(), pair.to_string())];
        if let Some(s) = since {
            q.push(("since".to_string(), s.to_string()));
        }
        let q: Vec<(&str, String)> = q.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        self.get_public("/public/Trades", &q).await
    }

    pub async fn depth(
        &self,
        pair: &str,
        count: Option<u32>,
    ) -> Result<DepthResponse, ExchangeError> {
        let mut q = vec![("pair".to_string(), pair.to_string())];
        if let Some(c) = count {
            q.push(("count".to_string(), c.to_string()));
        }
        let q: Vec<(&str, String)> = q.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        self.get_public("/public/Depth", &q).await
    }

    async fn post_private<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        creds: &Credentials,
        mut form: Vec<(String, String)>,
    ) -> Result<T, ExchangeError> {
        let nonce = nonce_millis();
        form.push(("nonce".to_string(), nonce.clone()));
        let body = encode_form(&form);
        let message = format!("{path}{nonce}{body}");
        let signature = creds.signer.sign(message.as_bytes());

        let resp = self
            .http
            .post(self.url(path))
            .header("API-Key", &creds.api_key)
            .header("API-Sign", signature)
            .form(&form)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        decode::<T>(resp).await
    }

    pub async fn balance(&self, creds: &Credentials) -> Result<BalanceResponse, ExchangeError> {
        self.post_private("/private/Balance", creds, vec![]).await
    }

    pub async fn open_orders(
        &self,
        creds: &Credentials,
    ) -> Result<OpenOrdersResponse, ExchangeError> {
        self.post_private("/private/OpenOrders", creds, vec![])
            .await
    }

    pub async fn add_order(
        &self,
        creds: &Credentials,
        req: &AddOrderRequest,
    ) -> Result<AddOrderResponse, ExchangeError> {
        let mut form = vec![
            ("pair".to_string(), req.pair.clone()),
            ("type".to_string(), req.side.clone()),
            ("ordertype".to_string(), req.ordertype.clone()),
            ("volume".to_string(), req.volume.clone()),
            ("price".to_string(), req.price.clone()),
            ("validate".to_string(), req.validate.to_string()),
        ];
        if let Some(flags) = &req.oflags {
            form.push(("oflags".to_string(), flags.clone()));
        }
        self.post_private("/private/AddOrder", creds, form).await
    }

    pub async fn cancel_order(
        &self,
        creds: &Credentials,
        txid: &str,
    ) -> Result<CancelOrderResponse, ExchangeError> {
        self.post_private(
            "/private/CancelOrder",
            creds,
            vec![("txid".to_string(), txid.to_string())],
        )
        .await
    }

    /// `since`/`until` accept either a unix timestamp or a txid, same as the
    /// exchange's own `start`/`end` fields — ExecutionTracker pins `until` to
    /// a txid once it knows one, so a chunk's page count can't drift out
    /// from under it while paging.
    pub async fn trades_history(
        &self,
        creds: &Credentials,
        since: Option<&str>,
        until: Option<&str>,
        ofs: usize,
    ) -> Result<TradesHistoryResponse, ExchangeError> {
        let mut form = vec![("ofs".to_string(), ofs.to_string())];
        if let Some(s) = since {
            form.push(("start".to_string(), s.to_string()));
        }
        if let Some(u) = until {
            form.push(("end".to_string(), u.to_string()));
        }
        self.post_private("/private/TradesHistory", creds, form)
            .await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ExchangeError> {
    let text = resp
        .text()
        .await
        .map_err(|e| ExchangeError::Transport(e.to_string()))?;
    let envelope: Envelope<T> =
        serde_json::from_str(&text).map_err(|e| ExchangeError::Decode(e.to_string()))?;
    if !envelope.error.is_empty() {
        return Err(ExchangeError::Api(envelope.error));
    }
    envelope
        .result
        .ok_or_else(|| ExchangeError::Decode("missing result field".to_string()))
}

/// Encodes form pairs the same way reqwest's `.form()` does, so the signed
/// message matches the body actually sent on the wire.
fn encode_form(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn nonce_millis() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis()
        .to_string()
}
