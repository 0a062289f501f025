use thiserror::Error;

/// Input errors raised by the odds math. Callers either pre-check prices with
/// [`crate::engine::odds::is_valid_american`] or skip the affected quote.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OddsError {
    #[error("invalid American odds: {0} (must be <= -100 or >= +100)")]
    InvalidOdds(i32),

    #[error("invalid decimal odds: {0} (must be finite and > 1.0)")]
    InvalidDecimal(f64),

    #[error("invalid probability: {0} (must be within [0, 1])")]
    InvalidProbability(f64),

    #[error("invalid stake: {0} (must be finite and > 0)")]
    InvalidStake(f64),

    #[error("unsupported market: {outcomes} outcomes (only two-way markets can be devigged)")]
    UnsupportedMarket { outcomes: usize },
}

/// Failure modes of a single provider request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("provider rejected API key (401)")]
    Unauthorized,

    #[error("provider rate limited the request (429)")]
    RateLimited,

    #[error("provider returned HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode provider response: {0}")]
    Decode(String),
}

/// The only error `OddsClient::fetch_odds` surfaces. Everything else degrades
/// to an empty result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("odds provider rejected the configured API key")]
    InvalidApiKey,
}
