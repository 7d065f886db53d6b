//! Fixed-point price representation.
//!
//! A price is never carried as `f64` once it enters the ladder pipeline.
//! `PriceTick` is an integer in units of 10^-decimals of the quote currency;
//! every comparison, hash, and book key uses it directly.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::fmt;

/// Price expressed as an integer tick (10^-decimals of quote currency).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PriceTick(pub i64);

impl PriceTick {
    pub fn new(ticks: i64) -> Self {
        Self(ticks)
    }

    /// One tick towards a higher price (used to place a bid one tick inside the book).
    pub fn plus_one(self) -> Self {
        Self(self.0 + 1)
    }

    /// One tick towards a lower price (used to place an ask one tick inside the book).
    pub fn minus_one(self) -> Self {
        Self(self.0 - 1)
    }

    /// Render as a decimal string with `decimals` fractional digits, for the exchange boundary.
    pub fn to_decimal_string(self, decimals: u32) -> String {
        let scale = 10i64.pow(decimals);
        let whole = self.0 / scale;
        let frac = (self.0 % scale).abs();
        if decimals == 0 {
            whole.to_string()
        } else {
            format!("{whole}.{frac:0width$}", width = decimals as usize)
        }
    }
}

impl fmt::Display for PriceTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse an exchange decimal string into a `PriceTick` at `decimals` precision.
///
/// Truncates (never rounds) so that the integer ordering of ticks matches the
/// lexical/numeric ordering of the original decimal string exactly — rounding
/// could otherwise flip the relative order of two adjacent prices.
pub fn parse_price(s: &str, decimals: u32) -> Result<PriceTick, ParsePriceError> {
    let d: Decimal = s.trim().parse().map_err(|_| ParsePriceError::NotADecimal(s.to_string()))?;
    let scale = Decimal::from(10i64.pow(decimals));
    let scaled = (d * scale).trunc();
    let ticks = scaled.to_i64().ok_or(ParsePriceError::OutOfRange(s.to_string()))?;
    Ok(PriceTick(ticks))
}

#[derive(Debug, thiserror::Error)]
pub enum ParsePriceError {
    #[error("not a decimal number: {0}")]
    NotADecimal(String),
    #[error("price out of i64 tick range: {0}")]
    OutOfRange(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_truncates_not_rounds() {
        // 0.12349 at 4 decimals must truncate to 1234, not round to 1235.
        let p = parse_price("0.12349", 4).unwrap();
        assert_eq!(p.0, 1234);
    }

    #[test]
    fn parse_matches_scale() {
        assert_eq!(parse_price("100.5", 2).unwrap().0, 10050);
        assert_eq!(parse_price("0.01", 2).unwrap().0, 1);
    }

    #[test]
    fn round_trip_identity() {
        for raw in ["1.2300", "0.0001", "9999.9999", "0.0000"] {
            let tick = parse_price(raw, 4).unwrap();
            let back = tick.to_decimal_string(4);
            let reparsed = parse_price(&back, 4).unwrap();
            assert_eq!(tick, reparsed);
        }
    }

    #[test]
    fn ordering_matches_decimal_ordering() {
        let a = parse_price("10.01", 2).unwrap();
        let b = parse_price("10.02", 2).unwrap();
        assert!(a < b);
    }

    #[test]
    fn plus_minus_one_tick() {
        let p = PriceTick::new(100);
        assert_eq!(p.plus_one().0, 101);
        assert_eq!(p.minus_one().0, 99);
    }
}
