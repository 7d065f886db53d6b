//! Order Placement Engine (§4.6): turns a desired (side, price, quote amount)
//! into a resting limit order, through the Gate, with the PostLimit retry
//! ladder the exchange's own volume validation forces on callers.
//!
//! `AddOrder` is rejected outright if the computed base volume fails the
//! pair's lot-size/minimum-volume check; the message names the offending
//! field as `"volume"`. Two escalating retries exist before the engine gives
//! up and reports the order as simply unplaced this round:
//!
//! 1. If the rejected request did not yet request quote-denominated volume
//!    (`oflags=viqc`), retry once with volume replaced by `volume · price`
//!    and `viqc` added — the base-asset volume the caller computed likely
//!    just missed the pair's lot size; asking the exchange to size from the
//!    quote amount directly sidesteps that.
//! 2. If the request already had `viqc` set and is still rejected on
//!    volume, bump the volume up by a fixed floor (`VOLUME_FLOOR_BUMP`) and
//!    retry once more.
//!
//! Cancellation is idempotent: an exchange complaint containing `"Unknown
//! order"` means the order is already gone, which OPE treats as success.

use tracing::warn;

use crate::domain::{PriceTick, Side};
use crate::error::OpeError;
use crate::exchange::{AddOrderRequest, AddOrderResponse};
use crate::gate::{GateHandle, GateRequest};

/// Volume nudge applied on the first PostLimit retry, in base-asset units.
const VOLUME_FLOOR_BUMP: f64 = 0.01;

pub struct Ope {
    gate: GateHandle,
    pair: String,
    price_decimals: u32,
}

/// The id the caller should remember for this resting order: always the
/// first txid the exchange returned, even when `AddOrder` reports several
/// (partial fills against resting orders can split a single request).
pub struct PlacedOrder {
    pub oid: String,
}

impl Ope {
    pub fn new(gate: GateHandle, pair: impl Into<String>, price_decimals: u32) -> Self {
        Self {
            gate,
            pair: pair.into(),
            price_decimals,
        }
    }

    /// Places a bid. `quote_amount` is denominated in the quote asset; the
    /// base-asset volume `AddOrder` needs is derived from it via `price`.
    pub fn bid(&self, price: PriceTick, quote_amount: f64) -> Result<PlacedOrder, OpeError> {
        let price_f64 = self.price_f64(price);
        let volume = quote_amount / price_f64.max(f64::EPSILON);
        self.place(Side::Buy, price, price_f64, volume)
    }

    /// Places an ask. Unlike `bid`, `base_amount` is already in base-asset
    /// units — it is the order's volume directly, with no conversion.
    pub fn ask(&self, price: PriceTick, base_amount: f64) -> Result<PlacedOrder, OpeError> {
        let price_f64 = self.price_f64(price);
        self.place(Side::Sell, price, price_f64, base_amount)
    }

    /// Decimal precision this engine renders prices at, for callers that need
    /// to convert between quote- and base-denominated amounts themselves.
    pub fn price_decimals(&self) -> u32 {
        self.price_decimals
    }

    fn price_f64(&self, price: PriceTick) -> f64 {
        price
            .to_decimal_string(self.price_decimals)
            .parse()
            .unwrap_or(0.0)
    }

    fn place(&self, side: Side, price: PriceTick, price_f64: f64, volume: f64) -> Result<PlacedOrder, OpeError> {
        let price_str = price.to_decimal_string(self.price_decimals);
        let mut volume = volume;
        let mut viqc = false;

        for attempt in 0..3 {
            let oflags = if viqc { "post,viqc" } else { "post" };
            let req = AddOrderRequest {
                pair: self.pair.clone(),
                side: side_str(side).to_string(),
                ordertype: "limit".to_string(),
                volume: format!("{volume:.8}"),
                price: price_str.clone(),
                oflags: Some(oflags.to_string()),
                validate: false,
            };
            let reply = self.gate.request(GateRequest::AddOrder(req));
            match reply.value {
                Some(value) if reply.errors.is_empty() => {
                    let resp: AddOrderResponse = serde_json::from_value(value)
                        .map_err(|e| OpeError::Rejected(e.to_string()))?;
                    let oid = resp
                        .txid
                        .first()
                        .cloned()
                        .ok_or_else(|| OpeError::Rejected("no txid in response".to_string()))?;
                    return Ok(PlacedOrder { oid });
                }
                _ => {
                    let rejected_on_volume = reply.errors.iter().any(|e| e.contains("volume"));
                    if !rejected_on_volume || attempt == 2 {
                        return Err(OpeError::Rejected(reply.errors.join("; ")));
                    }
                    warn!(attempt, volume, viqc, "order rejected on volume, retrying");
                    if viqc {
                        volume += VOLUME_FLOOR_BUMP;
                    } else {
                        volume *= price_f64.max(f64::EPSILON);
                        viqc = true;
                    }
                }
            }
        }
        Err(OpeError::Rejected("exhausted volume retry ladder".to_string()))
    }

    /// Cancels a live order by id. Treats "the exchange already doesn't know
    /// about it" as success, since that is exactly the end state a cancel
    /// is trying to reach.
    pub fn cancel(&self, oid: &str) -> Result<(), OpeError> {
        let reply = self.gate.request(GateRequest::CancelOrder {
            txid: oid.to_string(),
        });
        if reply.errors.is_empty() {
            return Ok(());
        }
        if reply.errors.iter().any(|e| e.contains("Unknown order")) {
            return Ok(());
        }
        Err(OpeError::Rejected(reply.errors.join("; ")))
    }
}

fn side_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::AddOrderDescr;
    use crate::gate::{GateHandle, GateReply};
    use std::sync::{Arc, Mutex};

    #[test]
    fn side_str_matches_exchange_vocabulary() {
        assert_eq!(side_str(Side::Buy), "buy");
        assert_eq!(side_str(Side::Sell), "sell");
    }

    #[test]
    fn volume_rejection_retries_with_viqc_and_quote_denominated_volume() {
        let seen: Arc<Mutex<Vec<AddOrderRequest>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let gate = GateHandle::fake(move |request| match request {
            GateRequest::AddOrder(req) => {
                let attempt = {
                    let mut seen = recorder.lock().unwrap();
                    seen.push(req.clone());
                    seen.len()
                };
                if attempt == 1 {
                    GateReply {
                        value: None,
                        errors: vec!["EGeneral:Invalid arguments:volume".to_string()],
                    }
                } else {
                    GateReply {
                        value: serde_json::to_value(AddOrderResponse {
                            txid: vec!["OID1".to_string()],
                            descr: AddOrderDescr { order: "buy".to_string() },
                        })
                        .ok(),
                        errors: vec![],
                    }
                }
            }
            _ => GateReply {
                value: None,
                errors: vec!["unexpected request".to_string()],
            },
        });

        let ope = Ope::new(gate, "XBTUSD", 1);
        let placed = ope
            .bid(PriceTick::new(1000), 100.0)
            .expect("second attempt should place");
        assert_eq!(placed.oid, "OID1");

        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].oflags.as_deref().unwrap_or("").contains("viqc"));

        let first_volume: f64 = requests[0].volume.parse().unwrap();
        let price: f64 = requests[0].price.parse().unwrap();
        let second = &requests[1];
        assert!(second.oflags.as_deref().unwrap_or("").contains("viqc"));
        let second_volume: f64 = second.volume.parse().unwrap();
        assert!((second_volume - first_volume * price).abs() < 1e-6);
    }

    #[test]
    fn cancel_on_unknown_order_is_treated_as_success() {
        let gate = GateHandle::fake(|request| match request {
            GateRequest::CancelOrder { .. } => GateReply {
                value: None,
                errors: vec!["EOrder:Unknown order".to_string()],
            },
            _ => GateReply {
                value: None,
                errors: vec!["unexpected request".to_string()],
            },
        });

        let ope = Ope::new(gate, "XBTUSD", 1);
        assert!(ope.cancel("already-gone").is_ok());
    }
}
