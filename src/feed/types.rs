use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cache::CachePayload;
use crate::engine::odds::is_valid_american;
use crate::error::OddsError;
use crate::validation::PayloadKind;

// Normalized internal types used by the engine (provider-agnostic).

/// Market a quote belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarketKey {
    Moneyline,
    Spread,
    Total,
    /// Player props, keyed by the provider's market name (e.g. `player_points`).
    Prop(String),
    Other(String),
}

impl MarketKey {
    /// Map a the-odds-api.com market key to our market.
    pub fn from_api_key(key: &str) -> Self {
        match key {
            "h2h" => MarketKey::Moneyline,
            "spreads" => MarketKey::Spread,
            "totals" => MarketKey::Total,
            k if k.starts_with("player_") => MarketKey::Prop(k.to_string()),
            k => MarketKey::Other(k.to_string()),
        }
    }

    pub fn api_key(&self) -> &str {
        match self {
            MarketKey::Moneyline => "h2h",
            MarketKey::Spread => "spreads",
            MarketKey::Total => "totals",
            MarketKey::Prop(k) | MarketKey::Other(k) => k,
        }
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_key())
    }
}

/// One bookmaker's price for one outcome of one market of one event.
#[derive(Debug, Clone, PartialEq)]
pub struct OddsQuote {
    pub event_id: String,
    pub market: MarketKey,
    pub outcome: String,
    /// Spread or total value, when the market has one.
    pub line: Option<f64>,
    /// American odds; always <= -100 or >= +100.
    pub price: i32,
    pub bookmaker: String,
    pub observed_at: DateTime<Utc>,
}

impl OddsQuote {
    pub fn new(
        event_id: impl Into<String>,
        market: MarketKey,
        outcome: impl Into<String>,
        line: Option<f64>,
        price: i32,
        bookmaker: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, OddsError> {
        if !is_valid_american(price) {
            return Err(OddsError::InvalidOdds(price));
        }
        Ok(Self {
            event_id: event_id.into(),
            market,
            outcome: outcome.into(),
            line,
            price,
            bookmaker: bookmaker.into(),
            observed_at,
        })
    }
}

/// the-odds-api.com v4 response: top-level array of events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsEvent {
    pub id: String,
    #[serde(default)]
    pub sport_key: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: String,
    #[serde(default)]
    pub bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmaker {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub last_update: String,
    #[serde(default)]
    pub markets: Vec<Market>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub key: String,
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub name: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point: Option<f64>,
    /// Player name for prop markets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl OddsEvent {
    /// Flatten this event into quotes. Outcomes with illegal or fractional
    /// prices are skipped; bookmaker timestamps that fail to parse fall back
    /// to `fetched_at`.
    pub fn to_quotes(&self, fetched_at: DateTime<Utc>) -> Vec<OddsQuote> {
        let mut quotes = Vec::new();
        for bm in &self.bookmakers {
            let observed_at = DateTime::parse_from_rfc3339(&bm.last_update)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(fetched_at);

            for market in &bm.markets {
                let key = MarketKey::from_api_key(&market.key);
                for outcome in &market.outcomes {
                    let name = match &outcome.description {
                        Some(player) => format!("{} {}", player, outcome.name),
                        None => outcome.name.clone(),
                    };
                    let Some(price) = whole_price(outcome.price) else {
                        tracing::debug!(
                            event = %self.id,
                            bookmaker = %bm.key,
                            "skipping outcome: fractional price {}", outcome.price
                        );
                        continue;
                    };
                    match OddsQuote::new(
                        self.id.clone(),
                        key.clone(),
                        name,
                        outcome.point,
                        price,
                        bm.key.clone(),
                        observed_at,
                    ) {
                        Ok(q) => quotes.push(q),
                        Err(e) => tracing::debug!(
                            event = %self.id,
                            bookmaker = %bm.key,
                            "skipping outcome: {}", e
                        ),
                    }
                }
            }
        }
        quotes
    }
}

/// American odds are whole numbers; anything else is not a quotable price.
fn whole_price(price: f64) -> Option<i32> {
    (price.fract() == 0.0 && price.abs() <= i32::MAX as f64).then_some(price as i32)
}

impl CachePayload for OddsEvent {
    const KIND: PayloadKind = PayloadKind::Game;
}

impl CachePayload for Vec<OddsEvent> {
    const KIND: PayloadKind = PayloadKind::Games;
}

impl CachePayload for Bookmaker {
    const KIND: PayloadKind = PayloadKind::Bookmaker;
}

/// API usage quota info extracted from response headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiQuota {
    pub requests_used: u64,
    pub requests_remaining: u64,
}
