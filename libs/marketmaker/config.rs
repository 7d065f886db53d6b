//! Runtime configuration for the market-maker.

use serde::{Deserialize, Serialize};

/// Top-level configuration, loadable from YAML with `#[serde(default)]`
/// throughout so a partial file still produces a usable config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Market this agent quotes.
    pub pair: String,
    /// Price precision for `pair`.
    pub price_decimals: u32,

    // === Timing ===
    pub round_interval_secs: u64,
    pub trades_poll_secs: u64,
    pub book_poll_secs: u64,
    pub balance_poll_secs: u64,
    pub executions_poll_secs: u64,
    /// Delay between successive `TradesHistory` pages within one chunk
    /// (spec.md §4.4 step 3's "Between requests, sleep `delay`").
    pub executions_page_delay_ms: u64,
    /// Minimum spacing between outbound Gate requests, enforcing the
    /// exchange-declared rate budget (§3 Gate invariant).
    pub gate_min_request_interval_ms: u64,

    // === Sizing (spec.md §4.7 step 2) ===
    pub resilience_factor: f64,
    pub fund_factor: f64,
    pub targeting_factor: f64,
    /// How far back the base/quote conversion rate's VWAP looks, in
    /// seconds (spec.md step 1's "VWAP over the last 4 hours").
    pub vwap_window_secs: f64,

    // === Fees & profitability ===
    pub fee_pct: f64,

    // === Ladder generation (§4.7 step 5) ===
    pub max_orders: usize,

    // === Reconciliation (§4.7 step 6) ===
    /// Relative volume tolerance below which a live order is considered
    /// to already satisfy a desired quote at the same price.
    pub reconcile_tolerance: f64,
    /// Open Question (b): whether an inward desired order at exactly the
    /// same price as a live order may replace it during reconciliation.
    pub replace_equal_price: bool,

    // === Unbounded tracker growth (Design Note, §9) ===
    /// Optional cap on TradesTracker/ExecutionTracker history age, in seconds.
    /// `None` reproduces the unbounded behavior spec.md describes.
    pub tracker_max_age_secs: Option<f64>,

    /// Credential file paths (spec.md §6): each file's first line is the secret.
    pub key_file: String,
    pub secret_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pair: "XBTUSD".to_string(),
            price_decimals: 1,
            round_interval_secs: 10,
            trades_poll_secs: 15,
            book_poll_secs: 2,
            balance_poll_secs: 20,
            executions_poll_secs: 15,
            executions_page_delay_ms: 250,
            gate_min_request_interval_ms: 1000,
            resilience_factor: 3.0,
            fund_factor: 0.8,
            targeting_factor: 1.0,
            vwap_window_secs: 14_400.0,
            fee_pct: 0.16,
            max_orders: 5,
            reconcile_tolerance: 0.15,
            replace_equal_price: false,
            tracker_max_age_secs: None,
            key_file: "kraken.key".to_string(),
            secret_file: "kraken.secret".to_string(),
        }
    }
}

impl Config {
    pub fn from_yaml_str(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = Config::default();
        assert_eq!(c.pair, "XBTUSD");
        assert!(c.reconcile_tolerance > 0.0 && c.reconcile_tolerance < 1.0);
        assert!(!c.replace_equal_price);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let c = Config::from_yaml_str("pair: ETHUSD\nmax_orders: 8\n").unwrap();
        assert_eq!(c.pair, "ETHUSD");
        assert_eq!(c.max_orders, 8);
        assert_eq!(c.round_interval_secs, 10);
    }
}
