use chrono::{DateTime, Duration, Utc};

/// How old a cached value is relative to the maximum age it was stored with.
///
/// `is_stale` is strict: a value exactly `max_age_ms` old is still fresh, even
/// though its staleness ratio has already reached 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreshnessDescriptor {
    pub last_updated: DateTime<Utc>,
    pub max_age_ms: u64,
    pub is_stale: bool,
    /// age / max_age, clamped to [0, 1].
    pub staleness: f64,
    pub next_update: DateTime<Utc>,
}

impl FreshnessDescriptor {
    pub fn compute(last_updated: DateTime<Utc>, max_age_ms: u64, now: DateTime<Utc>) -> Self {
        let staleness = if max_age_ms == 0 {
            1.0
        } else {
            (age_ms(last_updated, now) / max_age_ms as f64).clamp(0.0, 1.0)
        };
        let next_update = last_updated
            .checked_add_signed(max_age(max_age_ms))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            last_updated,
            max_age_ms,
            is_stale: is_past(last_updated, max_age_ms, now),
            staleness,
            next_update,
        }
    }
}

fn max_age(max_age_ms: u64) -> Duration {
    Duration::milliseconds(i64::try_from(max_age_ms).unwrap_or(i64::MAX))
}

/// Milliseconds elapsed since `since`, with sub-millisecond precision; zero if
/// the clock went backwards.
fn age_ms(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - since)
        .num_microseconds()
        .map_or(f64::MAX, |us| us as f64 / 1000.0)
        .max(0.0)
}

/// True once strictly more than `max_age_ms` has passed since `since`.
/// Compared at full clock precision, so 100.9 ms is past a 100 ms limit.
pub(crate) fn is_past(since: DateTime<Utc>, max_age_ms: u64, now: DateTime<Utc>) -> bool {
    now - since > max_age(max_age_ms)
}
