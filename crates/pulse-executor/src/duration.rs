//! Contract duration policy.

use pulse_core::{ContractDuration, MarketClass, Signal};

/// Duration heuristic by market class: synthetic indices settle on
/// 1-minute contracts, majors on 5, everything else on 3.
pub fn duration_for_market(market: &str) -> ContractDuration {
    match MarketClass::of(market) {
        MarketClass::Synthetic => ContractDuration::minutes(1),
        MarketClass::Forex => ContractDuration::minutes(5),
        MarketClass::Other => ContractDuration::minutes(3),
    }
}

/// Like `duration_for_market`, but unclassified markets use the
/// configured default instead of the built-in 3 minutes.
pub fn duration_for_market_or(market: &str, default: ContractDuration) -> ContractDuration {
    match MarketClass::of(market) {
        MarketClass::Synthetic => ContractDuration::minutes(1),
        MarketClass::Forex => ContractDuration::minutes(5),
        MarketClass::Other => default,
    }
}

/// The signal's own duration wins; otherwise fall back to the market
/// heuristic.
pub fn duration_for_signal(signal: &Signal) -> ContractDuration {
    signal
        .duration
        .unwrap_or_else(|| duration_for_market(&signal.market))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::SignalKind;

    #[test]
    fn test_market_heuristic() {
        assert_eq!(duration_for_market("R_100").value, 1);
        assert_eq!(duration_for_market("1HZ10V").value, 1);
        assert_eq!(duration_for_market("frxEURUSD").value, 5);
        assert_eq!(duration_for_market("frxUSDJPY").value, 5);
        assert_eq!(duration_for_market("cryBTCLTC").value, 3);
    }

    #[test]
    fn test_signal_duration_wins() {
        let signal = Signal::new(SignalKind::Call, "R_100", 0.8, "test")
            .with_duration(ContractDuration::minutes(10));
        assert_eq!(duration_for_signal(&signal).value, 10);

        let bare = Signal::new(SignalKind::Call, "R_100", 0.8, "test");
        assert_eq!(duration_for_signal(&bare).value, 1);
    }
}
