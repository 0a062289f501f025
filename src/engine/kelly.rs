//! Kelly criterion stake sizing for American-odds wagers.

use super::odds::american_to_decimal;
use super::probability::check_probability;
use crate::error::OddsError;

/// Hard cap on any recommended stake, as a fraction of bankroll.
pub const MAX_BANKROLL_FRACTION: f64 = 0.10;

/// Compute the Kelly-optimal stake.
///
/// - `american`: offered price
/// - `true_probability`: estimated win probability (0–1)
/// - `bankroll`: available balance
///
/// Returns a stake in `[0, 0.10 * bankroll]`. Zero when the edge is zero or
/// negative, or when the bankroll is not positive.
pub fn kelly_stake(american: i32, true_probability: f64, bankroll: f64) -> Result<f64, OddsError> {
    check_probability(true_probability)?;
    let decimal = american_to_decimal(american)?;

    if !bankroll.is_finite() || bankroll <= 0.0 {
        return Ok(0.0);
    }

    let p = true_probability;
    let q = 1.0 - p;
    let b = decimal - 1.0;

    // f* = (b*p - q) / b
    let f_star = (b * p - q) / b;

    let stake = (f_star * bankroll).min(bankroll * MAX_BANKROLL_FRACTION);
    Ok(stake.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moderate_edge_uncapped() {
        // +100, p=0.52 → b=1, f* = (0.52 - 0.48) / 1 = 0.04
        // stake = 0.04 * 1000 = 40
        let stake = kelly_stake(100, 0.52, 1000.0).unwrap();
        assert!((stake - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_strong_edge_capped_at_ten_percent() {
        // +200, p=0.60 → b=2, f* = (1.2 - 0.4) / 2 = 0.40 → capped at 0.10
        let stake = kelly_stake(200, 0.60, 1000.0).unwrap();
        assert!((stake - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_edge_returns_zero() {
        // -110, p=0.50 → b=0.909, f* = (0.4545 - 0.5) / 0.909 < 0
        let stake = kelly_stake(-110, 0.50, 1000.0).unwrap();
        assert_eq!(stake, 0.0);
    }

    #[test]
    fn test_zero_edge_returns_zero() {
        // +100 at exactly 50% is a fair coin
        let stake = kelly_stake(100, 0.50, 1000.0).unwrap();
        assert_eq!(stake, 0.0);
    }

    #[test]
    fn test_zero_or_negative_bankroll_returns_zero() {
        assert_eq!(kelly_stake(200, 0.6, 0.0).unwrap(), 0.0);
        assert_eq!(kelly_stake(200, 0.6, -500.0).unwrap(), 0.0);
        assert_eq!(kelly_stake(200, 0.6, f64::NAN).unwrap(), 0.0);
    }

    #[test]
    fn test_bounds_hold_across_inputs() {
        let odds = [-10_000, -500, -110, -100, 100, 150, 1000, 50_000];
        let bankrolls = [0.01, 1.0, 250.0, 1_000_000.0];
        for &a in &odds {
            for step in 0..=20 {
                let p = step as f64 / 20.0;
                for &bankroll in &bankrolls {
                    let stake = kelly_stake(a, p, bankroll).unwrap();
                    assert!(stake >= 0.0, "a={a} p={p} bankroll={bankroll}");
                    assert!(
                        stake <= bankroll * MAX_BANKROLL_FRACTION + 1e-12,
                        "a={a} p={p} bankroll={bankroll} stake={stake}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert_eq!(kelly_stake(50, 0.6, 100.0), Err(OddsError::InvalidOdds(50)));
        assert_eq!(
            kelly_stake(150, -0.1, 100.0),
            Err(OddsError::InvalidProbability(-0.1))
        );
    }
}
