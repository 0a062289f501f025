use anyhow::Result;
use odds_core::cache::FreshnessCache;
use odds_core::config::Config;
use odds_core::engine::best_price::{best_prices_by_outcome, market_hold};
use odds_core::engine::kelly::kelly_stake;
use odds_core::engine::probability::{expected_value, remove_vig};
use odds_core::feed::the_odds_api::{api_sport_key, TheOddsApi};
use odds_core::feed::types::{MarketKey, OddsEvent, OddsQuote};
use odds_core::feed::OddsClient;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEFAULT_BANKROLL: f64 = 1000.0;

/// Average vig-free probability per outcome across every book that quotes
/// both sides of a two-way market.
fn consensus_fair(quotes: &[OddsQuote], market: &MarketKey) -> BTreeMap<String, f64> {
    let mut by_book: BTreeMap<&str, Vec<&OddsQuote>> = BTreeMap::new();
    for q in quotes.iter().filter(|q| &q.market == market) {
        by_book.entry(q.bookmaker.as_str()).or_default().push(q);
    }

    let mut sums: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    for book_quotes in by_book.values() {
        let [a, b] = book_quotes.as_slice() else { continue };
        let Ok(fair) = remove_vig(a.price, b.price) else { continue };
        for (name, p) in [(&a.outcome, fair.fair_a), (&b.outcome, fair.fair_b)] {
            let slot = sums.entry(name.clone()).or_insert((0.0, 0));
            slot.0 += p;
            slot.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(name, (total, n))| (name, total / n as f64))
        .collect()
}

fn print_event(event_id: &str, quotes: &[OddsQuote], bankroll: f64) {
    let market = MarketKey::Moneyline;
    let board = best_prices_by_outcome(quotes, &market);
    if board.is_empty() {
        return;
    }
    let fair = consensus_fair(quotes, &market);

    let names: Vec<&str> = board.keys().map(String::as_str).collect();
    println!("  {}  [{}]", names.join(" vs "), event_id);
    if let Some(hold) = market_hold(quotes, &market) {
        println!("    hold at best prices: {:+.2}%", hold * 100.0);
    }

    let mut outcomes: Vec<_> = board.iter().collect();
    outcomes.sort_by(|a, b| a.0.cmp(b.0));
    for (name, best) in outcomes {
        let line = match fair.get(name) {
            Some(&p) => {
                let ev = expected_value(best.price, p, 100.0).unwrap_or(0.0);
                let stake = kelly_stake(best.price, p, bankroll).unwrap_or(0.0);
                format!("fair {:>5.1}%  EV/$100 {:+6.2}  kelly ${:.2}", p * 100.0, ev, stake)
            }
            None => "fair    n/a".to_string(),
        };
        println!("    {:<28} {:>+5} @ {:<12} {}", name, best.price, best.bookmaker, line);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("odds_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let bankroll = args
        .iter()
        .position(|a| a == "--bankroll")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(DEFAULT_BANKROLL);
    let requested: Vec<String> = args
        .iter()
        .enumerate()
        .filter(|(i, a)| !a.starts_with("--") && !(*i > 0 && args[i - 1] == "--bankroll"))
        .map(|(_, a)| a.clone())
        .collect();

    let config = Config::load(Path::new("config.toml"))?;

    // Load saved keys from .env (real env vars take precedence)
    Config::load_env_file();
    let api_key = Config::odds_api_key()?;

    let feed = TheOddsApi::new(
        api_key,
        &config.odds_feed.base_url,
        &config.odds_feed.regions,
        &config.odds_feed.bookmakers,
    );
    let quota = feed.check_quota().await?;
    println!(
        "  the-odds-api: {} requests used, {} remaining",
        quota.requests_used, quota.requests_remaining
    );

    let cache: FreshnessCache<Vec<OddsEvent>> = FreshnessCache::new();
    let sweeper = cache.spawn_sweeper(Duration::from_secs(config.cache.sweep_interval_s.max(1)));
    let client = OddsClient::new(feed, cache);

    let sports = if requested.is_empty() {
        config.sports.enabled.clone()
    } else {
        requested
    };
    let markets: Vec<&str> = config.odds_feed.markets.iter().map(String::as_str).collect();

    for sport in &sports {
        let api_sport = api_sport_key(sport);
        let quotes = client.fetch_odds(api_sport, &markets).await?;
        println!();
        println!("  {} ({} quotes)", api_sport, quotes.len());
        if quotes.is_empty() {
            println!("    no live odds available ({:?})", client.last_outcome());
            continue;
        }

        let mut by_event: BTreeMap<&str, Vec<OddsQuote>> = BTreeMap::new();
        for q in &quotes {
            by_event.entry(q.event_id.as_str()).or_default().push(q.clone());
        }
        for (event_id, event_quotes) in &by_event {
            print_event(event_id, event_quotes, bankroll);
        }
    }

    let stats = client.cache().stats();
    println!();
    println!(
        "  cache: {} entries, {} bytes, {} invalid",
        stats.total_entries, stats.total_size_bytes, stats.invalid_entries
    );
    if let Some(q) = client.last_quota() {
        println!("  quota remaining: {}", q.requests_remaining);
    }

    sweeper.abort();
    tracing::debug!("shutting down");
    Ok(())
}
