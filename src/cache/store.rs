use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::freshness::{is_past, FreshnessDescriptor};
use crate::validation::{PayloadKind, ValidationResult, Validator};

/// Anything the cache can hold: it must serialize (for validation and size
/// accounting) and declare which payload schema applies to it.
pub trait CachePayload: Serialize + Clone + Send + 'static {
    const KIND: PayloadKind;
}

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub ttl_ms: u64,
    /// Freshness as of the write.
    pub freshness: FreshnessDescriptor,
    pub validation: ValidationResult,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    pub tags: HashSet<String>,
    /// Serialized JSON size of `data`.
    pub size_bytes: usize,
}

impl<T> CacheEntry<T> {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        is_past(self.timestamp, self.ttl_ms, now)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses); 0 before any lookup.
    pub hit_rate: f64,
    /// Past TTL but not yet removed by a read or a sweep.
    pub expired_entries: usize,
    pub invalid_entries: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

struct Inner<T> {
    entries: HashMap<String, CacheEntry<T>>,
    hits: u64,
    misses: u64,
}

/// Keyed TTL store that validates every write and tracks access statistics.
///
/// Clones share the same underlying store. Expired entries are removed lazily
/// on `get` and in bulk by `sweep` / [`FreshnessCache::spawn_sweeper`].
pub struct FreshnessCache<T> {
    inner: Arc<Mutex<Inner<T>>>,
    validator: Validator,
}

impl<T> Clone for FreshnessCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            validator: self.validator,
        }
    }
}

impl<T: CachePayload> Default for FreshnessCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CachePayload> FreshnessCache<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
            })),
            validator: Validator::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // A panic elsewhere cannot leave an entry half-written, so keep serving.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, key: &str, data: T, ttl_ms: u64, tags: &[&str]) {
        self.set_at(key, data, ttl_ms, tags, Utc::now());
    }

    pub fn set_at(&self, key: &str, data: T, ttl_ms: u64, tags: &[&str], now: DateTime<Utc>) {
        let value = match serde_json::to_value(&data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key, "cache payload failed to serialize: {}", e);
                Value::Null
            }
        };
        let size_bytes = value.to_string().len();
        let validation = self.validator.validate_at(T::KIND.wrap(&value), now);

        if !validation.is_valid {
            tracing::warn!(
                key,
                quality = validation.data_quality,
                errors = validation.errors.len(),
                "caching payload that failed validation"
            );
        } else if !validation.errors.is_empty() {
            tracing::debug!(
                key,
                quality = validation.data_quality,
                errors = validation.errors.len(),
                "cached payload has validation findings"
            );
        }

        let entry = CacheEntry {
            data,
            timestamp: now,
            ttl_ms,
            freshness: FreshnessDescriptor::compute(now, ttl_ms, now),
            validation,
            access_count: 0,
            last_accessed: now,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            size_bytes,
        };
        self.lock().entries.insert(key.to_string(), entry);
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<T> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let Some(entry) = inner.entries.get_mut(key) else {
            inner.misses += 1;
            tracing::debug!(key, "cache miss");
            return None;
        };

        if entry.is_expired(now) {
            inner.entries.remove(key);
            inner.misses += 1;
            tracing::debug!(key, "cache entry expired on read");
            return None;
        }

        entry.access_count += 1;
        entry.last_accessed = now.max(entry.timestamp);
        inner.hits += 1;
        tracing::debug!(key, access_count = entry.access_count, "cache hit");
        Some(entry.data.clone())
    }

    /// Remove entries whose key matches `pattern` or that carry any of `tags`.
    /// A pattern is a substring, or a glob when it contains `*`. With no
    /// pattern and no tags nothing is removed.
    pub fn invalidate(&self, pattern: Option<&str>, tags: &[&str]) -> usize {
        if pattern.is_none() && tags.is_empty() {
            return 0;
        }
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|key, entry| {
            let key_match = pattern.is_some_and(|p| key_matches(p, key));
            let tag_match = tags.iter().any(|t| entry.tags.contains(*t));
            !(key_match || tag_match)
        });
        let removed = before - inner.entries.len();
        if removed > 0 {
            tracing::info!(?pattern, ?tags, removed, "invalidated cache entries");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> CacheStats {
        let inner = self.lock();
        let lookups = inner.hits + inner.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            inner.hits as f64 / lookups as f64
        };

        let entries = inner.entries.values();
        CacheStats {
            total_entries: inner.entries.len(),
            total_size_bytes: entries.clone().map(|e| e.size_bytes).sum(),
            hits: inner.hits,
            misses: inner.misses,
            hit_rate,
            expired_entries: entries.clone().filter(|e| e.is_expired(now)).count(),
            invalid_entries: entries.clone().filter(|e| !e.validation.is_valid).count(),
            oldest_entry: entries.clone().map(|e| e.timestamp).min(),
            newest_entry: entries.map(|e| e.timestamp).max(),
        }
    }

    /// Current freshness of `key`, without counting as an access.
    pub fn freshness(&self, key: &str) -> Option<FreshnessDescriptor> {
        self.freshness_at(key, Utc::now())
    }

    pub fn freshness_at(&self, key: &str, now: DateTime<Utc>) -> Option<FreshnessDescriptor> {
        self.lock()
            .entries
            .get(key)
            .map(|e| FreshnessDescriptor::compute(e.timestamp, e.ttl_ms, now))
    }

    /// Validation result recorded when `key` was written.
    pub fn validation(&self, key: &str) -> Option<ValidationResult> {
        self.lock().entries.get(key).map(|e| e.validation.clone())
    }

    /// Snapshot of the entry under `key`, without counting as an access.
    pub fn entry(&self, key: &str) -> Option<CacheEntry<T>> {
        self.lock().entries.get(key).cloned()
    }

    /// Drop every entry whose TTL has passed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| !e.is_expired(now));
        let removed = before - inner.entries.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = inner.entries.len(), "cache sweep");
        }
        removed
    }

    /// Sweep on a fixed interval in the background, independent of reads and
    /// writes. Requires a running tokio runtime; abort the handle to stop.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                cache.sweep();
            }
        })
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        let removed = inner.entries.len();
        inner.entries.clear();
        tracing::info!(removed, "cache cleared");
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

/// Substring match, or `*` glob match when the pattern contains a wildcard.
fn key_matches(pattern: &str, key: &str) -> bool {
    if !pattern.contains('*') {
        return key.contains(pattern);
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !key.starts_with(first) {
        return false;
    }

    let mut rest = &key[first.len()..];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::{Bookmaker, OddsEvent};
    use crate::validation::ErrorCode;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn ms(n: i64) -> chrono::Duration {
        chrono::Duration::milliseconds(n)
    }

    fn event(id: &str, home: &str, away: &str) -> OddsEvent {
        OddsEvent {
            id: id.to_string(),
            sport_key: "basketball_nba".to_string(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            commence_time: "2026-10-20T23:30:00Z".to_string(),
            bookmakers: vec![],
        }
    }

    fn games() -> Vec<OddsEvent> {
        vec![event("e1", "Boston Celtics", "Los Angeles Lakers")]
    }

    #[test]
    fn test_set_then_get() {
        let cache: FreshnessCache<Vec<OddsEvent>> = FreshnessCache::new();
        cache.set_at("odds:nba", games(), 30_000, &["nba"], t0());
        assert_eq!(cache.get_at("odds:nba", t0() + ms(10)), Some(games()));

        let entry = cache.entry("odds:nba").unwrap();
        assert_eq!(entry.access_count, 1);
        assert_eq!(entry.last_accessed, t0() + ms(10));
        assert!(entry.validation.is_valid);
        assert!(entry.tags.contains("nba"));
        assert!(!entry.freshness.is_stale);
    }

    #[test]
    fn test_access_count_is_monotonic() {
        let cache: FreshnessCache<Vec<OddsEvent>> = FreshnessCache::new();
        cache.set_at("k", games(), 30_000, &[], t0());
        for i in 1..=5 {
            cache.get_at("k", t0() + ms(i));
            let entry = cache.entry("k").unwrap();
            assert_eq!(entry.access_count, i as u64);
            assert!(entry.last_accessed >= entry.timestamp);
        }
    }

    #[test]
    fn test_lazy_expiry_removes_entry() {
        let cache: FreshnessCache<Vec<OddsEvent>> = FreshnessCache::new();
        cache.set_at("k", games(), 100, &[], t0());

        // Exactly at TTL is still served.
        assert!(cache.get_at("k", t0() + ms(100)).is_some());
        assert!(cache.get_at("k", t0() + ms(101)).is_none());
        assert_eq!(cache.len(), 0);

        let stats = cache.stats_at(t0() + ms(101));
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[test]
    fn test_expiry_counts_partial_milliseconds() {
        let cache: FreshnessCache<Vec<OddsEvent>> = FreshnessCache::new();
        cache.set_at("k", games(), 100, &[], t0());

        let just_over = t0() + chrono::Duration::microseconds(100_900);
        assert!(cache.entry("k").unwrap().is_expired(just_over));
        assert!(cache.get_at("k", just_over).is_none());
    }

    #[test]
    fn test_single_game_and_bookmaker_payload_kinds() {
        let games: FreshnessCache<OddsEvent> = FreshnessCache::new();
        games.set_at("game:ok", event("e1", "Boston Celtics", "Los Angeles Lakers"), 30_000, &[], t0());
        games.set_at("game:dup", event("e2", "Lakers", "lakers"), 30_000, &[], t0());
        assert!(games.validation("game:ok").unwrap().is_valid);
        let dup = games.validation("game:dup").unwrap();
        assert!(!dup.is_valid);
        assert_eq!(dup.errors_with_code(ErrorCode::DuplicateTeams).count(), 1);

        let books: FreshnessCache<Bookmaker> = FreshnessCache::new();
        let empty = Bookmaker {
            key: "draftkings".to_string(),
            title: "DraftKings".to_string(),
            last_update: String::new(),
            markets: vec![],
        };
        books.set_at("book:dk", empty, 30_000, &[], t0());
        let report = books.validation("book:dk").unwrap();
        assert!(report.is_valid);
        assert_eq!(report.errors_with_code(ErrorCode::MissingMarkets).count(), 1);
        assert!(books.get_at("book:dk", t0()).is_some());
    }

    #[test]
    fn test_set_overwrites() {
        let cache: FreshnessCache<Vec<OddsEvent>> = FreshnessCache::new();
        cache.set_at("k", games(), 30_000, &["old"], t0());
        cache.get_at("k", t0());
        let replacement = vec![event("e2", "Miami Heat", "Chicago Bulls")];
        cache.set_at("k", replacement.clone(), 30_000, &["new"], t0() + ms(5));

        let entry = cache.entry("k").unwrap();
        assert_eq!(entry.data, replacement);
        assert_eq!(entry.access_count, 0);
        assert!(!entry.tags.contains("old"));
    }

    #[test]
    fn test_invalid_payload_still_cached_and_counted() {
        let cache: FreshnessCache<Vec<OddsEvent>> = FreshnessCache::new();
        cache.set_at("bad", vec![event("e1", "Lakers", "Lakers")], 30_000, &[], t0());
        cache.set_at("good", games(), 30_000, &[], t0());

        let validation = cache.validation("bad").unwrap();
        assert!(!validation.is_valid);
        assert_eq!(cache.stats_at(t0()).invalid_entries, 1);
        assert!(cache.get_at("bad", t0()).is_some());
    }

    #[test]
    fn test_invalidate_by_tag() {
        let cache: FreshnessCache<Vec<OddsEvent>> = FreshnessCache::new();
        cache.set_at("a", games(), 30_000, &["nfl"], t0());
        cache.set_at("b", games(), 30_000, &["nfl", "h2h"], t0());
        cache.set_at("c", games(), 30_000, &["nba"], t0());

        assert_eq!(cache.invalidate(None, &["nfl"]), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.entry("c").is_some());
    }

    #[test]
    fn test_invalidate_by_pattern() {
        let cache: FreshnessCache<Vec<OddsEvent>> = FreshnessCache::new();
        cache.set_at("odds:basketball_nba:h2h", games(), 30_000, &[], t0());
        cache.set_at("odds:basketball_nba:spreads", games(), 30_000, &[], t0());
        cache.set_at("odds:americanfootball_nfl:h2h", games(), 30_000, &[], t0());

        assert_eq!(cache.invalidate(Some("odds:*:h2h"), &[]), 2);
        assert_eq!(cache.invalidate(Some("basketball"), &[]), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_without_criteria_is_noop() {
        let cache: FreshnessCache<Vec<OddsEvent>> = FreshnessCache::new();
        cache.set_at("a", games(), 30_000, &["nfl"], t0());
        assert_eq!(cache.invalidate(None, &[]), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_key_matches() {
        assert!(key_matches("nba", "odds:basketball_nba:h2h"));
        assert!(key_matches("odds:*", "odds:x"));
        assert!(key_matches("*:h2h", "odds:x:h2h"));
        assert!(key_matches("a*b*c", "a-b-c"));
        assert!(!key_matches("a*b*c", "a-c-b"));
        assert!(!key_matches("ab*ba", "aba"));
        assert!(key_matches("*", "anything"));
    }

    #[test]
    fn test_stats() {
        let cache: FreshnessCache<Vec<OddsEvent>> = FreshnessCache::new();
        let empty = cache.stats_at(t0());
        assert_eq!(empty.total_entries, 0);
        assert_eq!(empty.hit_rate, 0.0);
        assert_eq!(empty.oldest_entry, None);

        cache.set_at("short", games(), 100, &[], t0());
        cache.set_at("long", games(), 60_000, &[], t0() + ms(50));

        let stats = cache.stats_at(t0() + ms(500));
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.expired_entries, 1);
        assert!(stats.total_size_bytes > 0);
        assert_eq!(stats.oldest_entry, Some(t0()));
        assert_eq!(stats.newest_entry, Some(t0() + ms(50)));
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let cache: FreshnessCache<Vec<OddsEvent>> = FreshnessCache::new();
        cache.set_at("short", games(), 100, &[], t0());
        cache.set_at("long", games(), 60_000, &[], t0());

        assert_eq!(cache.sweep_at(t0() + ms(50)), 0);
        assert_eq!(cache.sweep_at(t0() + ms(500)), 1);
        assert!(cache.entry("long").is_some());
        // Sweeping does not touch hit/miss counters.
        assert_eq!(cache.stats_at(t0()).misses, 0);
    }

    #[test]
    fn test_freshness_query_does_not_count_access() {
        let cache: FreshnessCache<Vec<OddsEvent>> = FreshnessCache::new();
        cache.set_at("k", games(), 1_000, &[], t0());

        let f = cache.freshness_at("k", t0() + ms(1_500)).unwrap();
        assert!(f.is_stale);
        assert_eq!(f.staleness, 1.0);
        assert_eq!(cache.entry("k").unwrap().access_count, 0);
        assert!(cache.freshness("missing").is_none());
    }

    #[test]
    fn test_clones_share_store() {
        let cache: FreshnessCache<Vec<OddsEvent>> = FreshnessCache::new();
        let other = cache.clone();
        other.set_at("k", games(), 30_000, &[], t0());
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(other.is_empty());
    }
}
