//! Core data model: plain types shared by every actor, no I/O.

mod market;
mod order;
mod price;
mod trade;

pub use market::Market;
pub use order::{BookLevel, DesiredOrder, Execution, LiveOrder, Side};
pub use price::{parse_price, ParsePriceError, PriceTick};
pub use trade::{ingest as ingest_trade, TradeEvent, COALESCE_WINDOW_SECS};
