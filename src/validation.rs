//! Schema checks for game and odds payloads received from the odds provider.
//!
//! Findings are returned as data, never as `Err`: a payload with one bad
//! bookmaker among ten good ones is still usable, so the caller decides what
//! to keep based on severity.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::fmt;

use crate::engine::odds::is_valid_american;

const PENALTY_MAJOR: f64 = 25.0;
const PENALTY_MINOR: f64 = 10.0;
const PENALTY_WARNING: f64 = 5.0;

const STALE_FIXTURE_DAYS: i64 = 7;
const FAR_FUTURE_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    MissingRequiredField,
    TypeMismatch,
    DuplicateTeams,
    InvalidDate,
    InvalidStructure,
    MissingBookmakerKey,
    MissingMarkets,
    InvalidPrice,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            ErrorCode::TypeMismatch => "TYPE_MISMATCH",
            ErrorCode::DuplicateTeams => "DUPLICATE_TEAMS",
            ErrorCode::InvalidDate => "INVALID_DATE",
            ErrorCode::InvalidStructure => "INVALID_STRUCTURE",
            ErrorCode::MissingBookmakerKey => "MISSING_BOOKMAKER_KEY",
            ErrorCode::MissingMarkets => "MISSING_MARKETS",
            ErrorCode::InvalidPrice => "INVALID_PRICE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
    pub severity: Severity,
    pub code: ErrorCode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    /// 0–100.
    pub data_quality: f64,
    pub validated_at: DateTime<Utc>,
}

impl ValidationResult {
    pub fn has_critical(&self) -> bool {
        self.errors.iter().any(|e| e.severity == Severity::Critical)
    }

    pub fn errors_with_code(&self, code: ErrorCode) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(move |e| e.code == code)
    }
}

/// What the caller says it is handing over. The validator never guesses.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Game(&'a Value),
    Games(&'a [Value]),
    Bookmaker(&'a Value),
}

/// Which [`Payload`] variant a cached type serializes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Game,
    Games,
    Bookmaker,
}

impl PayloadKind {
    /// Pair a serialized value with this kind. A `Games` kind over a non-array
    /// value is reported as a single structurally invalid game.
    pub fn wrap(self, value: &Value) -> Payload<'_> {
        match (self, value) {
            (PayloadKind::Games, Value::Array(items)) => Payload::Games(items),
            (PayloadKind::Games, other) => Payload::Game(other),
            (PayloadKind::Game, v) => Payload::Game(v),
            (PayloadKind::Bookmaker, v) => Payload::Bookmaker(v),
        }
    }
}

#[derive(Default)]
struct Findings {
    errors: Vec<ValidationError>,
    warnings: Vec<ValidationWarning>,
}

impl Findings {
    fn error(&mut self, path: String, severity: Severity, code: ErrorCode, message: impl Into<String>) {
        self.errors.push(ValidationError {
            path,
            message: message.into(),
            severity,
            code,
        });
    }

    fn warn(&mut self, path: String, message: impl Into<String>, suggestion: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path,
            message: message.into(),
            suggestion: suggestion.into(),
        });
    }

    fn has_critical(&self) -> bool {
        self.errors.iter().any(|e| e.severity == Severity::Critical)
    }

    /// Fixed-penalty quality score for a single object.
    fn quality(&self) -> f64 {
        if self.has_critical() {
            return 0.0;
        }
        let mut score = 100.0;
        for e in &self.errors {
            score -= match e.severity {
                Severity::Major => PENALTY_MAJOR,
                Severity::Minor => PENALTY_MINOR,
                Severity::Critical => 0.0,
            };
        }
        score -= PENALTY_WARNING * self.warnings.len() as f64;
        score.max(0.0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, payload: Payload<'_>) -> ValidationResult {
        self.validate_at(payload, Utc::now())
    }

    pub fn validate_at(&self, payload: Payload<'_>, now: DateTime<Utc>) -> ValidationResult {
        match payload {
            Payload::Game(value) => {
                let mut findings = Findings::default();
                check_game(value, "", now, &mut findings);
                single_result(findings, now)
            }
            Payload::Bookmaker(value) => {
                let mut findings = Findings::default();
                if value.is_object() {
                    check_bookmaker(value, "", &mut findings);
                } else {
                    findings.error(
                        String::new(),
                        Severity::Critical,
                        ErrorCode::InvalidStructure,
                        "bookmaker payload is not an object",
                    );
                }
                single_result(findings, now)
            }
            Payload::Games(items) => {
                let mut all = Findings::default();
                let mut clean = 0usize;
                for (i, item) in items.iter().enumerate() {
                    let mut findings = Findings::default();
                    check_game(item, &format!("[{}]", i), now, &mut findings);
                    if !findings.has_critical() {
                        clean += 1;
                    }
                    all.errors.extend(findings.errors);
                    all.warnings.extend(findings.warnings);
                }
                let data_quality = if items.is_empty() {
                    100.0
                } else {
                    100.0 * clean as f64 / items.len() as f64
                };
                ValidationResult {
                    is_valid: clean == items.len(),
                    errors: all.errors,
                    warnings: all.warnings,
                    data_quality,
                    validated_at: now,
                }
            }
        }
    }
}

fn single_result(findings: Findings, now: DateTime<Utc>) -> ValidationResult {
    let data_quality = findings.quality();
    ValidationResult {
        is_valid: !findings.has_critical(),
        errors: findings.errors,
        warnings: findings.warnings,
        data_quality,
        validated_at: now,
    }
}

fn join(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

/// Look up a required string field, recording missing/null and type errors.
fn required_str<'v>(obj: &'v Value, prefix: &str, field: &str, f: &mut Findings) -> Option<&'v str> {
    match obj.get(field) {
        None | Some(Value::Null) => {
            f.error(
                join(prefix, field),
                Severity::Critical,
                ErrorCode::MissingRequiredField,
                format!("required field '{}' is missing", field),
            );
            None
        }
        Some(Value::String(s)) => Some(s.as_str()),
        Some(other) => {
            f.error(
                join(prefix, field),
                Severity::Major,
                ErrorCode::TypeMismatch,
                format!("'{}' must be a string, got {}", field, type_name(other)),
            );
            None
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse the date formats seen from odds providers: RFC 3339, naive
/// `YYYY-MM-DDTHH:MM:SS` (taken as UTC), or a bare date.
pub fn parse_commence_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn check_game(value: &Value, prefix: &str, now: DateTime<Utc>, f: &mut Findings) {
    if !value.is_object() {
        f.error(
            prefix.to_string(),
            Severity::Critical,
            ErrorCode::InvalidStructure,
            format!("game must be an object, got {}", type_name(value)),
        );
        return;
    }

    required_str(value, prefix, "id", f);
    let home = required_str(value, prefix, "home_team", f);
    let away = required_str(value, prefix, "away_team", f);
    let commence = required_str(value, prefix, "commence_time", f);

    if let (Some(home), Some(away)) = (home, away) {
        if home.trim().eq_ignore_ascii_case(away.trim()) {
            f.error(
                join(prefix, "away_team"),
                Severity::Critical,
                ErrorCode::DuplicateTeams,
                format!("home and away team are both '{}'", home),
            );
        }
    }

    if let Some(raw) = commence {
        match parse_commence_time(raw) {
            None => f.error(
                join(prefix, "commence_time"),
                Severity::Major,
                ErrorCode::InvalidDate,
                format!("'{}' is not a valid date", raw),
            ),
            Some(start) => {
                if start < now - Duration::days(STALE_FIXTURE_DAYS) {
                    f.warn(
                        join(prefix, "commence_time"),
                        format!("game started more than {} days ago", STALE_FIXTURE_DAYS),
                        "filter out finished fixtures before display",
                    );
                } else if start > now + Duration::days(FAR_FUTURE_DAYS) {
                    f.warn(
                        join(prefix, "commence_time"),
                        format!("game is more than {} days in the future", FAR_FUTURE_DAYS),
                        "check the source for a possible data error",
                    );
                }
            }
        }
    }

    if let Some(v) = value.get("sport_key") {
        if !v.is_null() && !v.is_string() {
            f.error(
                join(prefix, "sport_key"),
                Severity::Major,
                ErrorCode::TypeMismatch,
                format!("'sport_key' must be a string, got {}", type_name(v)),
            );
        }
    }

    match value.get("bookmakers") {
        None | Some(Value::Null) => {}
        Some(Value::Array(books)) => {
            for (i, bm) in books.iter().enumerate() {
                let path = join(prefix, &format!("bookmakers[{}]", i));
                if bm.is_object() {
                    check_bookmaker(bm, &path, f);
                } else {
                    f.error(
                        path,
                        Severity::Major,
                        ErrorCode::TypeMismatch,
                        format!("bookmaker must be an object, got {}", type_name(bm)),
                    );
                }
            }
        }
        Some(other) => f.error(
            join(prefix, "bookmakers"),
            Severity::Major,
            ErrorCode::TypeMismatch,
            format!("'bookmakers' must be an array, got {}", type_name(other)),
        ),
    }
}

fn check_bookmaker(bm: &Value, prefix: &str, f: &mut Findings) {
    match bm.get("key") {
        None | Some(Value::Null) => f.error(
            join(prefix, "key"),
            Severity::Major,
            ErrorCode::MissingBookmakerKey,
            "bookmaker has no key",
        ),
        Some(Value::String(s)) if s.trim().is_empty() => f.error(
            join(prefix, "key"),
            Severity::Major,
            ErrorCode::MissingBookmakerKey,
            "bookmaker key is empty",
        ),
        Some(Value::String(_)) => {}
        Some(other) => f.error(
            join(prefix, "key"),
            Severity::Major,
            ErrorCode::TypeMismatch,
            format!("bookmaker key must be a string, got {}", type_name(other)),
        ),
    }

    let markets = match bm.get("markets") {
        Some(Value::Array(markets)) if !markets.is_empty() => markets,
        None | Some(Value::Null) | Some(Value::Array(_)) => {
            f.error(
                join(prefix, "markets"),
                Severity::Major,
                ErrorCode::MissingMarkets,
                "bookmaker has no markets",
            );
            return;
        }
        Some(other) => {
            f.error(
                join(prefix, "markets"),
                Severity::Major,
                ErrorCode::TypeMismatch,
                format!("'markets' must be an array, got {}", type_name(other)),
            );
            return;
        }
    };

    for (m, market) in markets.iter().enumerate() {
        let Some(outcomes) = market.get("outcomes").and_then(Value::as_array) else {
            continue;
        };
        for (o, outcome) in outcomes.iter().enumerate() {
            let price = outcome.get("price").and_then(Value::as_f64);
            let legal = price.is_some_and(|p| {
                p.fract() == 0.0 && p.abs() <= i32::MAX as f64 && is_valid_american(p as i32)
            });
            if !legal {
                f.error(
                    join(prefix, &format!("markets[{}].outcomes[{}].price", m, o)),
                    Severity::Minor,
                    ErrorCode::InvalidPrice,
                    format!("price {:?} is not valid American odds", price),
                );
            }
        }
    }
}
