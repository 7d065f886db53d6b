//! Market metadata, immutable after bootstrap.

use serde::{Deserialize, Serialize};

/// A tradeable pair on the exchange. Loaded once from `AssetPairs` at startup
/// and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub symbol: String,
    pub price_decimals: u32,
    pub base_asset: String,
    pub quote_asset: String,
}

impl Market {
    pub fn new(
        symbol: impl Into<String>,
        price_decimals: u32,
        base_asset: impl Into<String>,
        quote_asset: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price_decimals,
            base_asset: base_asset.into(),
            quote_asset: quote_asset.into(),
        }
    }
}
