//! The signed HTTP transport. Every actor above the Gate talks to the
//! exchange only through the types exported here.

mod client;
mod signer;
mod types;

pub use client::{build_http_client, ExchangeClient};
pub use signer::{Credentials, HmacSigner, Signer};
pub use types::{
    AddOrderDescr, AddOrderRequest, AddOrderResponse, AssetInfo, AssetPairInfo,
    AssetPairsResponse, AssetsResponse, BalanceResponse, CancelOrderResponse, DepthResponse,
    Envelope, OpenOrder, OpenOrderDescr, OpenOrdersResponse, RawBookLevel, RawExecution,
    RawTrade, TradesHistoryResponse, TradesResponse,
};
