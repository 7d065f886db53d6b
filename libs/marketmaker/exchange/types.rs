//! Wire types for the six exchange endpoints named in spec.md §6.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Generic envelope every endpoint replies with: a list of error strings and
/// (on success) a result payload. Mirrors the exchange's own convention of
/// always returning both fields rather than an HTTP status split.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub error: Vec<String>,
    #[serde(default)]
    pub result: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetInfo {
    pub altname: String,
    pub decimals: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetPairInfo {
    pub altname: String,
    pub base: String,
    pub quote: String,
    pub pair_decimals: u32,
    pub lot_decimals: u32,
}

pub type AssetsResponse = HashMap<String, AssetInfo>;
pub type AssetPairsResponse = HashMap<String, AssetPairInfo>;

#[derive(Debug, Clone, Deserialize)]
pub struct RawTrade {
    pub price: String,
    pub volume: String,
    pub time: f64,
    pub side: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradesResponse {
    pub trades: Vec<RawTrade>,
    pub last: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBookLevel(pub String, pub String, pub f64);

#[derive(Debug, Clone, Deserialize)]
pub struct DepthResponse {
    pub bids: Vec<RawBookLevel>,
    pub asks: Vec<RawBookLevel>,
}

pub type BalanceResponse = HashMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrder {
    pub descr: OpenOrderDescr,
    pub vol: String,
    pub vol_exec: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrderDescr {
    pub pair: String,
    #[serde(rename = "type")]
    pub side: String,
    pub price: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrdersResponse {
    pub open: HashMap<String, OpenOrder>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddOrderRequest {
    pub pair: String,
    #[serde(rename = "type")]
    pub side: String,
    pub ordertype: String,
    pub volume: String,
    pub price: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oflags: Option<String>,
    pub validate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddOrderResponse {
    pub txid: Vec<String>,
    pub descr: AddOrderDescr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddOrderDescr {
    pub order: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrderResponse {
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawExecution {
    pub ordertxid: String,
    pub pair: String,
    pub time: f64,
    #[serde(rename = "type")]
    pub side: String,
    pub price: String,
    pub cost: String,
    pub fee: String,
    pub vol: String,
}

/// `trades` preserves the exchange's response order so ExecutionTracker can
/// pin `until` to "the txid of the first returned fill" (spec.md §4.4 step
/// 3) — a plain `HashMap` would make "first" meaningless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradesHistoryResponse {
    pub trades: indexmap::IndexMap<String, RawExecution>,
    pub count: usize,
}
