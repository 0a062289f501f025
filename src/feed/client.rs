use chrono::Utc;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::types::{Bookmaker, MarketKey, OddsEvent, OddsQuote};
use super::OddsSource;
use crate::cache::FreshnessCache;
use crate::engine::best_price::{best_price, BestPrice};
use crate::error::{ClientError, FetchError};
use crate::feed::types::ApiQuota;
use crate::validation::{Payload, Validator};

/// TTL for anything that moves during a game (moneylines, spreads, totals).
pub const LIVE_ODDS_TTL_MS: u64 = 30_000;
/// TTL when every requested market is slow-moving (futures, player props).
pub const SLOW_MARKET_TTL_MS: u64 = 300_000;

/// Where a fetch is in its lifecycle. Terminal states drop back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Requesting,
    Success,
    RateLimited,
    NetworkError,
}

fn is_slow_market(market: &str) -> bool {
    market == "outrights" || market.starts_with("player_")
}

/// Cache TTL for a request over `markets`.
pub fn ttl_for_markets(markets: &[String]) -> u64 {
    if !markets.is_empty() && markets.iter().all(|m| is_slow_market(m)) {
        SLOW_MARKET_TTL_MS
    } else {
        LIVE_ODDS_TTL_MS
    }
}

fn normalize_markets(markets: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = markets
        .iter()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Cache key for a sport/markets request; market order does not matter.
pub fn cache_key(sport: &str, markets: &[String]) -> String {
    format!("odds:{}:{}", sport, markets.join(","))
}

/// Decrements the in-flight counter even if the fetch future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fetches odds through a [`FreshnessCache`] so repeated requests inside the
/// TTL never reach the metered provider.
///
/// Two concurrent misses for the same key both hit the network and the later
/// response overwrites the earlier one.
pub struct OddsClient<S> {
    source: S,
    cache: FreshnessCache<Vec<OddsEvent>>,
    validator: Validator,
    in_flight: AtomicUsize,
    last_outcome: Mutex<Option<FetchState>>,
}

impl<S: OddsSource> OddsClient<S> {
    pub fn new(source: S, cache: FreshnessCache<Vec<OddsEvent>>) -> Self {
        Self {
            source,
            cache,
            validator: Validator::new(),
            in_flight: AtomicUsize::new(0),
            last_outcome: Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &FreshnessCache<Vec<OddsEvent>> {
        &self.cache
    }

    pub fn last_quota(&self) -> Option<ApiQuota> {
        self.source.last_quota()
    }

    /// `Requesting` while any fetch is on the wire, otherwise `Idle`.
    pub fn state(&self) -> FetchState {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            FetchState::Requesting
        } else {
            FetchState::Idle
        }
    }

    /// Terminal state of the most recent network fetch, if any.
    pub fn last_outcome(&self) -> Option<FetchState> {
        self.last_outcome.lock().ok().and_then(|s| *s)
    }

    fn finish(&self, outcome: FetchState) {
        if let Ok(mut last) = self.last_outcome.lock() {
            *last = Some(outcome);
        }
    }

    /// Quotes for `sport` across `markets`.
    ///
    /// Never fails for network trouble: rate limiting, bad statuses and
    /// transport errors all yield an empty vec and leave the cache untouched.
    /// Only a rejected API key is returned as an error. There is no retry.
    pub async fn fetch_odds(&self, sport: &str, markets: &[&str]) -> Result<Vec<OddsQuote>, ClientError> {
        let markets = normalize_markets(markets);
        let key = cache_key(sport, &markets);

        if let Some(events) = self.cache.get(&key) {
            tracing::debug!(%key, events = events.len(), "serving odds from cache");
            return Ok(flatten(&events));
        }

        let result = {
            let _guard = InFlight::enter(&self.in_flight);
            self.source.fetch_events(sport, &markets).await
        };

        match result {
            Ok(raw) => {
                let events = self.accept(sport, raw);
                let ttl = ttl_for_markets(&markets);
                let mut tags: Vec<&str> = vec![sport];
                tags.extend(markets.iter().map(String::as_str));

                let quotes = flatten(&events);
                self.cache.set(&key, events, ttl, &tags);
                self.finish(FetchState::Success);
                tracing::info!(sport, quotes = quotes.len(), ttl_ms = ttl, "fetched odds");
                Ok(quotes)
            }
            Err(FetchError::RateLimited) => {
                tracing::warn!(sport, "odds provider rate limited request; not retrying");
                self.finish(FetchState::RateLimited);
                Ok(Vec::new())
            }
            Err(FetchError::Unauthorized) => {
                tracing::error!(sport, "odds provider rejected the API key");
                self.finish(FetchState::NetworkError);
                Err(ClientError::InvalidApiKey)
            }
            Err(e) => {
                tracing::warn!(sport, "odds fetch failed: {}", e);
                self.finish(FetchState::NetworkError);
                Ok(Vec::new())
            }
        }
    }

    /// Best price for one outcome of one event.
    pub async fn best_odds(
        &self,
        sport: &str,
        event_id: &str,
        market: &MarketKey,
        outcome: &str,
    ) -> Result<Option<BestPrice>, ClientError> {
        let quotes = self.fetch_odds(sport, &[market.api_key()]).await?;
        let event_quotes: Vec<OddsQuote> = quotes.into_iter().filter(|q| q.event_id == event_id).collect();
        Ok(best_price(&event_quotes, market, outcome))
    }

    /// Keep events without critical validation errors. Within a kept event,
    /// only the bookmakers that fail to decode are dropped.
    fn accept(&self, sport: &str, raw: Vec<Value>) -> Vec<OddsEvent> {
        let now = Utc::now();
        let total = raw.len();
        let mut events = Vec::with_capacity(total);

        for item in raw {
            let report = self.validator.validate_at(Payload::Game(&item), now);
            if report.has_critical() {
                let id = item.get("id").and_then(Value::as_str).unwrap_or("?");
                tracing::warn!(
                    sport,
                    event = id,
                    errors = ?report.errors.iter().map(|e| e.code.as_str()).collect::<Vec<_>>(),
                    "dropping event with critical validation errors"
                );
                continue;
            }
            if let Some(event) = decode_event(sport, item) {
                events.push(event);
            }
        }

        if events.len() < total {
            tracing::info!(sport, kept = events.len(), total, "filtered provider events");
        }
        events
    }
}

/// Decode one provider event, one bookmaker at a time, so a malformed book
/// does not take the rest of the event down with it.
fn decode_event(sport: &str, mut item: Value) -> Option<OddsEvent> {
    let obj = item.as_object_mut()?;
    let books = match obj.remove("bookmakers") {
        Some(Value::Array(books)) => books,
        _ => Vec::new(),
    };
    if obj.get("sport_key").is_some_and(|v| !v.is_string()) {
        obj.remove("sport_key");
    }

    let mut event = match serde_json::from_value::<OddsEvent>(item) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(sport, "dropping undecodable event: {}", e);
            return None;
        }
    };

    for (i, book) in books.into_iter().enumerate() {
        match serde_json::from_value::<Bookmaker>(book) {
            Ok(bm) => event.bookmakers.push(bm),
            Err(e) => tracing::warn!(
                sport,
                event = %event.id,
                index = i,
                "dropping malformed bookmaker: {}", e
            ),
        }
    }
    Some(event)
}

fn flatten(events: &[OddsEvent]) -> Vec<OddsQuote> {
    let now = Utc::now();
    events.iter().flat_map(|e| e.to_quotes(now)).collect()
}
