//! Stake sizing at execution time.

use rust_decimal::Decimal;

/// Default stake policy for orders.
#[derive(Debug, Clone)]
pub struct StakePolicy {
    pub base: Decimal,
    pub min: Decimal,
    pub max: Decimal,
    /// Scale the base by the signal confidence (floored at 0.5).
    pub confidence_mult: bool,
}

impl Default for StakePolicy {
    fn default() -> Self {
        Self {
            base: Decimal::from(10),
            min: Decimal::ONE,
            max: Decimal::from(100),
            confidence_mult: true,
        }
    }
}

impl StakePolicy {
    /// Compute the stake for a signal confidence, clamped to
    /// `[min, max]` and rounded to cents.
    pub fn stake_for(&self, confidence: Option<f64>) -> Decimal {
        let mut stake = self.base;
        if self.confidence_mult {
            if let Some(confidence) = confidence {
                let factor = Decimal::try_from(confidence.max(0.5)).unwrap_or(Decimal::ONE);
                stake *= factor;
            }
        }
        self.clamp(stake)
    }

    /// Clamp an externally supplied stake into policy bounds.
    pub fn clamp(&self, stake: Decimal) -> Decimal {
        stake.max(self.min).min(self.max).round_dp(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_confidence_scaling() {
        let policy = StakePolicy::default();
        assert_eq!(policy.stake_for(Some(0.8)), dec!(8.00));
        assert_eq!(policy.stake_for(Some(1.0)), dec!(10.00));
        // Confidence below 0.5 floors at half the base.
        assert_eq!(policy.stake_for(Some(0.2)), dec!(5.00));
        assert_eq!(policy.stake_for(None), dec!(10.00));
    }

    #[test]
    fn test_scaling_disabled() {
        let policy = StakePolicy {
            confidence_mult: false,
            ..Default::default()
        };
        assert_eq!(policy.stake_for(Some(0.8)), dec!(10.00));
    }

    #[test]
    fn test_clamping() {
        let policy = StakePolicy {
            base: dec!(500),
            ..Default::default()
        };
        assert_eq!(policy.stake_for(Some(1.0)), dec!(100.00));

        let policy = StakePolicy {
            base: dec!(0.5),
            ..Default::default()
        };
        assert_eq!(policy.stake_for(Some(0.5)), dec!(1.00));
    }
}
