use super::types::ApiQuota;
use super::OddsSource;
use crate::error::FetchError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Mutex;

pub struct TheOddsApi {
    client: Client,
    api_key: String,
    base_url: String,
    regions: String,
    bookmakers: String,
    last_quota: Mutex<Option<ApiQuota>>,
}

/// Map our internal sport key to the-odds-api.com sport key.
pub fn api_sport_key(sport: &str) -> &str {
    match sport {
        "basketball" => "basketball_nba",
        "american-football" => "americanfootball_nfl",
        "baseball" => "baseball_mlb",
        "ice-hockey" => "icehockey_nhl",
        "college-basketball" => "basketball_ncaab",
        "college-football" => "americanfootball_ncaaf",
        "soccer-epl" => "soccer_epl",
        "mma" => "mma_mixed_martial_arts",
        _ => sport,
    }
}

/// Parse a quota header that may be an integer or float (e.g. "14527.0").
fn parse_quota_header(headers: &reqwest::header::HeaderMap, name: &str) -> u64 {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v as u64)
        .unwrap_or(0)
}

fn quota_from(headers: &reqwest::header::HeaderMap) -> ApiQuota {
    ApiQuota {
        requests_used: parse_quota_header(headers, "x-requests-used"),
        requests_remaining: parse_quota_header(headers, "x-requests-remaining"),
    }
}

impl TheOddsApi {
    pub fn new(api_key: String, base_url: &str, regions: &str, bookmakers: &str) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            regions: regions.to_string(),
            bookmakers: bookmakers.to_string(),
            last_quota: Mutex::new(None),
        }
    }

    fn record_quota(&self, quota: ApiQuota) {
        if let Ok(mut last) = self.last_quota.lock() {
            *last = Some(quota);
        }
    }

    fn odds_url(&self, sport: &str, markets: &[String]) -> String {
        let mut url = format!(
            "{}/v4/sports/{}/odds?apiKey={}&regions={}&markets={}&oddsFormat=american",
            self.base_url,
            api_sport_key(sport),
            self.api_key,
            self.regions,
            markets.join(","),
        );
        if !self.bookmakers.is_empty() {
            url.push_str("&bookmakers=");
            url.push_str(&self.bookmakers);
        }
        url
    }

    /// Call the free `/v4/sports` endpoint to check quota without consuming usage credits.
    /// Returns an error if the key is invalid or quota is exhausted.
    pub async fn check_quota(&self) -> Result<ApiQuota> {
        let url = format!("{}/v4/sports?apiKey={}", self.base_url, self.api_key);

        let resp = self.client.get(&url).send().await
            .context("failed to reach the-odds-api for quota check")?;

        let status = resp.status();
        let quota = quota_from(resp.headers());

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("the-odds-api key validation failed ({}): {}", status, body);
        }

        self.record_quota(quota.clone());

        if quota.requests_remaining == 0 {
            anyhow::bail!("API quota exhausted ({} used, 0 remaining)", quota.requests_used);
        }

        Ok(quota)
    }
}

#[async_trait]
impl OddsSource for TheOddsApi {
    async fn fetch_events(&self, sport: &str, markets: &[String]) -> Result<Vec<Value>, FetchError> {
        let url = self.odds_url(sport, markets);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        // Extract quota from response headers
        let quota = quota_from(resp.headers());
        tracing::debug!(
            sport,
            used = quota.requests_used,
            remaining = quota.requests_remaining,
            "the-odds-api quota"
        );
        self.record_quota(quota);

        match resp.status() {
            StatusCode::UNAUTHORIZED => return Err(FetchError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => return Err(FetchError::RateLimited),
            status if !status.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                tracing::warn!(sport, %status, body = %body, "the-odds-api request failed");
                return Err(FetchError::Status(status.as_u16()));
            }
            _ => {}
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        match body {
            Value::Array(events) => Ok(events),
            other => Err(FetchError::Decode(format!(
                "expected an array of events, got {}",
                match other {
                    Value::Object(_) => "an object",
                    _ => "a scalar",
                }
            ))),
        }
    }

    fn last_quota(&self) -> Option<ApiQuota> {
        self.last_quota.lock().ok().and_then(|q| q.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sport_key_mapping() {
        assert_eq!(api_sport_key("basketball"), "basketball_nba");
        assert_eq!(api_sport_key("american-football"), "americanfootball_nfl");
        assert_eq!(api_sport_key("soccer_epl"), "soccer_epl");
    }

    #[test]
    fn test_odds_url() {
        let api = TheOddsApi::new("KEY".into(), "https://api.the-odds-api.com/", "us", "");
        let url = api.odds_url("basketball", &["h2h".to_string(), "spreads".to_string()]);
        assert_eq!(
            url,
            "https://api.the-odds-api.com/v4/sports/basketball_nba/odds?apiKey=KEY&regions=us&markets=h2h,spreads&oddsFormat=american"
        );

        let api = TheOddsApi::new("KEY".into(), "https://x", "us,uk", "fanduel,draftkings");
        let url = api.odds_url("mma", &["h2h".to_string()]);
        assert!(url.ends_with("&bookmakers=fanduel,draftkings"));
        assert!(url.contains("/mma_mixed_martial_arts/"));
    }

    #[test]
    fn test_quota_header_parsing() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-requests-used", "120".parse().unwrap());
        headers.insert("x-requests-remaining", "14527.0".parse().unwrap());
        let quota = quota_from(&headers);
        assert_eq!(quota.requests_used, 120);
        assert_eq!(quota.requests_remaining, 14527);

        assert_eq!(quota_from(&reqwest::header::HeaderMap::new()), ApiQuota::default());
    }

    #[test]
    fn test_no_quota_before_first_request() {
        let api = TheOddsApi::new("KEY".into(), "https://x", "us", "");
        assert!(api.last_quota().is_none());
    }
}
