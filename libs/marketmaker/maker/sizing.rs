//! Round sizing (§4.7 steps 1-2): the resilience threshold the ladder walks
//! the book to, and how much of the agent's balances to deploy this round.

/// Output of sizing one round.
pub struct Sizing {
    /// Cumulative book volume the ladder generator walks past before it
    /// stops adding levels (§4.7 step 5).
    pub resilience: f64,
    /// Base-currency amount to deploy on the ask side this round.
    pub deploy_base: f64,
    /// Quote-currency amount to deploy on the bid side this round.
    pub deploy_quote: f64,
}

/// Sizes a round from the agent's balances, the largest recent trade, and a
/// base/quote conversion rate (VWAP over a recent window).
///
/// `resilience` scales with how large trades have recently printed: a
/// market that just saw a big trade needs a deeper ladder to avoid being
/// picked off by the next print of similar size.
///
/// `invested` is the fraction of total net worth (base balance plus the
/// base-equivalent of the quote balance, converted through `rate`)
/// currently sitting in the base asset. `targeting_factor` controls how
/// strongly that skew feeds into sizing: at `targeting_factor = 1.0`, a
/// fully base-invested agent (`invested = 1.0`) deploys nothing further on
/// the ask side and its full fund factor on the bid side, and vice versa
/// for a fully quote-invested agent.
pub fn size_round(
    base_balance: f64,
    quote_balance: f64,
    rate: f64,
    max_recent_trade: f64,
    resilience_factor: f64,
    fund_factor: f64,
    targeting_factor: f64,
) -> Sizing {
    let resilience = resilience_factor * max_recent_trade;
    let rate = rate.max(f64::EPSILON);
    let total = base_balance + quote_balance / rate;
    let invested = if total > 0.0 {
        (base_balance / total).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let fund_factor = fund_factor.clamp(0.0, 1.0);

    let deploy_base = (base_balance * fund_factor * invested * targeting_factor).max(0.0);
    let deploy_quote =
        (quote_balance * fund_factor * (1.0 - invested * targeting_factor)).max(0.0);

    Sizing {
        resilience,
        deploy_base,
        deploy_quote,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resilience_scales_with_max_recent_trade() {
        let s = size_round(10.0, 1000.0, 100.0, 2.0, 3.0, 1.0, 1.0);
        assert_eq!(s.resilience, 6.0);
    }

    #[test]
    fn fully_base_invested_agent_deploys_nothing_on_bid_side() {
        // base=10 @ rate=100 is worth 1000 quote, matching quote_balance=0,
        // so invested == 1.0 and targeting_factor == 1.0 zeroes deploy_quote.
        let s = size_round(10.0, 0.0, 100.0, 1.0, 3.0, 1.0, 1.0);
        assert_eq!(s.deploy_quote, 0.0);
        assert!(s.deploy_base > 0.0);
    }

    #[test]
    fn fully_quote_invested_agent_deploys_nothing_on_ask_side() {
        let s = size_round(0.0, 1000.0, 100.0, 1.0, 3.0, 1.0, 1.0);
        assert_eq!(s.deploy_base, 0.0);
        assert!(s.deploy_quote > 0.0);
    }

    #[test]
    fn fund_factor_scales_both_sides() {
        let full = size_round(10.0, 1000.0, 100.0, 1.0, 3.0, 1.0, 1.0);
        let half = size_round(10.0, 1000.0, 100.0, 1.0, 3.0, 0.5, 1.0);
        assert!((half.deploy_base - full.deploy_base / 2.0).abs() < 1e-9);
        assert!((half.deploy_quote - full.deploy_quote / 2.0).abs() < 1e-9);
    }

    #[test]
    fn zero_total_net_worth_deploys_nothing_and_never_divides_by_zero() {
        let s = size_round(0.0, 0.0, 100.0, 1.0, 3.0, 1.0, 1.0);
        assert_eq!(s.deploy_base, 0.0);
        assert_eq!(s.deploy_quote, 0.0);
        assert!(s.resilience.is_finite());
    }
}
