//! Entry point: construct a Gate bound to the two credential files, spawn
//! every tracker, and hand them all to a Maker (§6).

use std::time::Duration;

use anyhow::{Context, Result};
use marketmaker::account_tracker::AccountTracker;
use marketmaker::book_tracker::BookTracker;
use marketmaker::domain::Market;
use marketmaker::exchange::ExchangeClient;
use marketmaker::maker::{Maker, RoundConfig};
use marketmaker::ope::Ope;
use marketmaker::trades_tracker::TradesTracker;
use marketmaker::{Config, Gate};

const EXCHANGE_BASE_URL: &str = "https://api.kraken.com/0";

fn main() -> Result<()> {
    marketmaker::logging::init_tracing_with_level(
        &std::env::var("MARKETMAKER_LOG").unwrap_or_else(|_| "info".to_string()),
    );

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "marketmaker.yaml".to_string());
    let config = load_config(&config_path)?;

    tracing::info!(pair = %config.pair, "starting market-maker");

    let gate = Gate::spawn(
        EXCHANGE_BASE_URL,
        config.key_file.clone(),
        config.secret_file.clone(),
        Duration::from_millis(config.gate_min_request_interval_ms),
    )
    .context("failed to spawn gate")?;

    let trades = TradesTracker::spawn(
        EXCHANGE_BASE_URL,
        config.pair.clone(),
        Duration::from_secs(config.trades_poll_secs),
        config.price_decimals,
        config.tracker_max_age_secs,
    )
    .context("failed to spawn trades tracker")?;

    let book = BookTracker::spawn(
        EXCHANGE_BASE_URL,
        config.pair.clone(),
        Duration::from_secs(config.book_poll_secs),
        config.price_decimals,
        None,
    )
    .context("failed to spawn book tracker")?;

    let account = AccountTracker::spawn(
        gate.handle.clone(),
        config.pair.clone(),
        config.price_decimals,
        Duration::from_secs(config.balance_poll_secs),
        Duration::from_secs(config.executions_poll_secs),
        Duration::from_millis(config.executions_page_delay_ms),
    )
    .context("failed to spawn account tracker")?;

    let market = bootstrap_market(&config.pair, config.price_decimals)?;
    tracing::info!(
        base = %market.base_asset,
        quote = %market.quote_asset,
        decimals = market.price_decimals,
        "market bootstrapped"
    );
    let round_cfg = RoundConfig {
        pair: config.pair.clone(),
        base_asset: market.base_asset,
        quote_asset: market.quote_asset,
        price_decimals: market.price_decimals,
        resilience_factor: config.resilience_factor,
        fund_factor: config.fund_factor,
        targeting_factor: config.targeting_factor,
        fee_pct: config.fee_pct,
        max_orders: config.max_orders,
        reconcile_tolerance: config.reconcile_tolerance,
        replace_equal_price: config.replace_equal_price,
        vwap_window_secs: config.vwap_window_secs,
    };

    let ope = Ope::new(gate.handle.clone(), config.pair.clone(), config.price_decimals);
    let _maker = Maker::spawn(
        gate.handle.clone(),
        book.handle.clone(),
        account.handle.clone(),
        trades.handle.clone(),
        ope,
        round_cfg,
        Duration::from_secs(config.round_interval_secs),
    )
    .context("failed to spawn maker")?;

    // Every actor runs on its own thread and keeps running once spawned;
    // these bindings just need to outlive the park loop below so their
    // destructors don't run early.
    let _guards = (gate, trades, book, account);
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}

fn load_config(path: &str) -> Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Config::from_yaml_str(&contents).context("failed to parse config file"),
        Err(_) => {
            tracing::warn!(path, "no config file found, using defaults");
            Ok(Config::default())
        }
    }
}

/// Loads `Market` from the exchange's `AssetPairs` endpoint (§3, §6) rather
/// than guessing base/quote from the pair string. Falls back to an even
/// split of `pair` and the configured `price_decimals` if the pair can't be
/// found or the endpoint is unreachable, so a transient network hiccup at
/// startup doesn't keep the agent from ever coming up.
fn bootstrap_market(pair: &str, price_decimals: u32) -> Result<Market> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build bootstrap runtime")?;
    let client = ExchangeClient::new(EXCHANGE_BASE_URL).context("failed to build http client")?;

    match runtime.block_on(client.asset_pairs()) {
        Ok(pairs) => {
            let found = pairs
                .iter()
                .find(|(key, info)| key.as_str() == pair || info.altname == pair);
            match found {
                Some((_, info)) => Ok(Market::new(pair, info.pair_decimals, &info.base, &info.quote)),
                None => {
                    tracing::warn!(pair, "pair not found in AssetPairs, falling back to a guessed split");
                    Ok(guess_market(pair, price_decimals))
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "AssetPairs unreachable, falling back to a guessed split");
            Ok(guess_market(pair, price_decimals))
        }
    }
}

/// Splits a pair like "XBTUSD" into its base and quote assets using the
/// known 3-or-4-letter asset codes the config's `pair` field is expected to
/// combine; falls back to an even split if neither length matches.
fn guess_market(pair: &str, price_decimals: u32) -> Market {
    let (base, quote) = {
        let mut split = None;
        for base_len in [4usize, 3] {
            if pair.len() > base_len {
                split = Some((pair[..base_len].to_string(), pair[base_len..].to_string()));
                break;
            }
        }
        split.unwrap_or_else(|| {
            let mid = pair.len() / 2;
            (pair[..mid].to_string(), pair[mid..].to_string())
        })
    };
    Market::new(pair, price_decimals, base, quote)
}
