//! Conversions between American and decimal odds.

use crate::error::OddsError;

/// True when `american` is a legal American-odds value (<= -100 or >= +100).
pub fn is_valid_american(american: i32) -> bool {
    american >= 100 || american <= -100
}

/// Convert American odds to decimal odds.
/// Positive odds (e.g., +150): decimal = 150/100 + 1 = 2.50
/// Negative odds (e.g., -150): decimal = 100/150 + 1 = 1.667
pub fn american_to_decimal(american: i32) -> Result<f64, OddsError> {
    if !is_valid_american(american) {
        return Err(OddsError::InvalidOdds(american));
    }
    if american > 0 {
        Ok(american as f64 / 100.0 + 1.0)
    } else {
        Ok(100.0 / (american as f64).abs() + 1.0)
    }
}

/// Convert decimal odds back to American odds, rounding half away from zero.
///
/// Decimal 2.0 maps to +100, so -100 does not survive a round trip (it comes
/// back as the equivalent +100). Every other valid value round-trips within
/// one unit.
pub fn decimal_to_american(decimal: f64) -> Result<i32, OddsError> {
    if !decimal.is_finite() || decimal <= 1.0 {
        return Err(OddsError::InvalidDecimal(decimal));
    }
    let american = if decimal >= 2.0 {
        ((decimal - 1.0) * 100.0).round()
    } else {
        (-100.0 / (decimal - 1.0)).round()
    };
    if american > i32::MAX as f64 || american < i32::MIN as f64 {
        return Err(OddsError::InvalidDecimal(decimal));
    }
    Ok(american as i32)
}
