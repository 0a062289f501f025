pub mod client;
pub mod the_odds_api;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::FetchError;
use types::ApiQuota;

/// Upstream odds provider. Returns the raw event array so the client can
/// validate it before anything is decoded or cached.
#[async_trait]
pub trait OddsSource: Send + Sync {
    async fn fetch_events(&self, sport: &str, markets: &[String]) -> Result<Vec<Value>, FetchError>;
    fn last_quota(&self) -> Option<ApiQuota>;
}

pub use client::{FetchState, OddsClient};
