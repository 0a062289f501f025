use super::odds::american_to_decimal;
use crate::error::OddsError;

/// Vig-free probabilities for a two-way market.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbabilityResult {
    pub fair_a: f64,
    pub fair_b: f64,
    /// Sum of raw implied probabilities minus 1 (the bookmaker's margin).
    pub overround: f64,
}

/// Convert American odds to implied probability.
/// Positive odds (e.g., +150): prob = 100 / (odds + 100)
/// Negative odds (e.g., -150): prob = |odds| / (|odds| + 100)
pub fn implied_probability(american: i32) -> Result<f64, OddsError> {
    Ok(1.0 / american_to_decimal(american)?)
}

/// Devig two-way odds to get fair probabilities.
pub fn remove_vig(odds_a: i32, odds_b: i32) -> Result<ProbabilityResult, OddsError> {
    remove_vig_market(&[odds_a, odds_b])
}

/// Devig a full market. Only two complementary outcomes are supported; three-way
/// markets (soccer 1X2) are rejected rather than normalized incorrectly.
pub fn remove_vig_market(prices: &[i32]) -> Result<ProbabilityResult, OddsError> {
    let [a, b] = prices else {
        return Err(OddsError::UnsupportedMarket {
            outcomes: prices.len(),
        });
    };
    let implied_a = implied_probability(*a)?;
    let implied_b = implied_probability(*b)?;
    let total = implied_a + implied_b;

    let fair_a = implied_a / total;
    Ok(ProbabilityResult {
        fair_a,
        fair_b: 1.0 - fair_a,
        overround: total - 1.0,
    })
}

/// Expected profit of staking `stake` at `american` odds when the outcome's
/// real chance is `true_probability`.
///
/// EV = stake * (p * decimal - 1). Positive means favorable. `stake` must be
/// finite and positive.
pub fn expected_value(american: i32, true_probability: f64, stake: f64) -> Result<f64, OddsError> {
    check_probability(true_probability)?;
    if !(stake.is_finite() && stake > 0.0) {
        return Err(OddsError::InvalidStake(stake));
    }
    let decimal = american_to_decimal(american)?;
    let payout = stake * decimal;
    Ok(true_probability * payout - stake)
}

pub(crate) fn check_probability(p: f64) -> Result<(), OddsError> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(OddsError::InvalidProbability(p))
    }
}
