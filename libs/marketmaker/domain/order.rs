//! Order-side data model: book levels, the agent's own fills, and ladders.

use super::price::PriceTick;

/// Direction of a resting order or a public trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// One level of a public order book: a price and the aggregate volume resting there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookLevel {
    pub price: PriceTick,
    pub volume: f64,
}

impl BookLevel {
    pub fn new(price: PriceTick, volume: f64) -> Self {
        Self { price, volume }
    }
}

/// One of the agent's own realized fills.
#[derive(Debug, Clone)]
pub struct Execution {
    pub oid: String,
    pub txid: String,
    pub timestamp: f64,
    pub side: Side,
    pub pair: String,
    pub price: f64,
    pub volume: f64,
    pub cost: f64,
    pub fee: f64,
}

/// A quote the ladder generator wants resting on the exchange.
#[derive(Debug, Clone, Copy)]
pub struct DesiredOrder {
    pub quote_amount: f64,
    pub price: PriceTick,
}

impl DesiredOrder {
    pub fn new(quote_amount: f64, price: PriceTick) -> Self {
        Self { quote_amount, price }
    }
}

/// An order actually resting on the exchange, as last observed.
#[derive(Debug, Clone)]
pub struct LiveOrder {
    pub oid: String,
    pub price: PriceTick,
    pub volume: f64,
}

impl LiveOrder {
    pub fn new(oid: impl Into<String>, price: PriceTick, volume: f64) -> Self {
        Self { oid: oid.into(), price, volume }
    }
}
