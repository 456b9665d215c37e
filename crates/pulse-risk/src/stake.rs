//! Recommended stake sizing.

use pulse_core::{RiskProfileParams, UserRiskState};
use rust_decimal::Decimal;

/// Recommend a stake for a user under a profile.
///
/// Starts from `base * profile.stake_multiplier`, then applies linear
/// reductions once more than half of a budget is consumed: at a ratio r
/// past 0.5 the stake is scaled by `2 * (1 - r)`, for drawdown and daily
/// loss independently. Floored at 1 and rounded to cents.
pub fn recommended_stake(
    base: Decimal,
    profile: &RiskProfileParams,
    user_risk: &UserRiskState,
) -> Decimal {
    let mut stake = base * profile.stake_multiplier;

    let half = Decimal::new(5, 1);
    let two = Decimal::TWO;

    let drawdown_ratio = user_risk.drawdown_ratio();
    if drawdown_ratio > half {
        stake *= two * (Decimal::ONE - drawdown_ratio).max(Decimal::ZERO);
    }
    let loss_ratio = user_risk.loss_ratio();
    if loss_ratio > half {
        stake *= two * (Decimal::ONE - loss_ratio).max(Decimal::ZERO);
    }

    stake.max(Decimal::ONE).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn profile(mult: Decimal) -> RiskProfileParams {
        RiskProfileParams {
            stake_multiplier: mult,
            min_confidence: 0.65,
        }
    }

    fn risk(drawdown: Decimal, max_drawdown: Decimal, loss: Decimal, max_loss: Decimal) -> UserRiskState {
        UserRiskState {
            max_drawdown,
            current_drawdown: drawdown,
            max_daily_loss: max_loss,
            current_daily_loss: loss,
            ..Default::default()
        }
    }

    #[test]
    fn test_base_times_profile() {
        let stake = recommended_stake(
            dec!(10),
            &profile(dec!(1.5)),
            &risk(dec!(0), dec!(200), dec!(0), dec!(100)),
        );
        assert_eq!(stake, dec!(15.00));
    }

    #[test]
    fn test_no_reduction_at_half_budget() {
        let stake = recommended_stake(
            dec!(10),
            &profile(dec!(1)),
            &risk(dec!(100), dec!(200), dec!(0), dec!(100)),
        );
        assert_eq!(stake, dec!(10.00));
    }

    #[test]
    fn test_drawdown_reduction_past_half() {
        // 75% of drawdown consumed: scale by 2 * (1 - 0.75) = 0.5.
        let stake = recommended_stake(
            dec!(10),
            &profile(dec!(1)),
            &risk(dec!(150), dec!(200), dec!(0), dec!(100)),
        );
        assert_eq!(stake, dec!(5.00));
    }

    #[test]
    fn test_both_reductions_compound() {
        // drawdown 75% -> x0.5, loss 80% -> x0.4, 10 * 0.5 * 0.4 = 2.
        let stake = recommended_stake(
            dec!(10),
            &profile(dec!(1)),
            &risk(dec!(150), dec!(200), dec!(80), dec!(100)),
        );
        assert_eq!(stake, dec!(2.00));
    }

    #[test]
    fn test_floor_at_one() {
        // Budgets essentially exhausted: the reduction collapses the stake
        // below 1, which floors.
        let stake = recommended_stake(
            dec!(10),
            &profile(dec!(0.5)),
            &risk(dec!(199), dec!(200), dec!(99), dec!(100)),
        );
        assert_eq!(stake, dec!(1.00));
    }

    #[test]
    fn test_rounding_to_cents() {
        // 10 * 1 * 2*(1-0.666...) produces a long fraction.
        let stake = recommended_stake(
            dec!(10),
            &profile(dec!(1)),
            &risk(dec!(200), dec!(300), dec!(0), dec!(100)),
        );
        assert_eq!(stake, dec!(6.67));
    }
}
