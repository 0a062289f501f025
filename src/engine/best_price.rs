use std::collections::HashMap;

use super::probability::implied_probability;
use crate::feed::types::{MarketKey, OddsQuote};

/// Best available price for one outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct BestPrice {
    pub price: i32,
    pub bookmaker: String,
    pub line: Option<f64>,
}

/// Scan `quotes` for `market`/`outcome` and return the most favorable price.
///
/// Higher American odds always pay more per unit risked, so the numerically
/// largest price wins regardless of sign. On ties the first matching quote in
/// input order is kept.
pub fn best_price(quotes: &[OddsQuote], market: &MarketKey, outcome: &str) -> Option<BestPrice> {
    let mut best: Option<&OddsQuote> = None;
    for q in quotes {
        if &q.market != market || q.outcome != outcome {
            continue;
        }
        if best.map_or(true, |b| q.price > b.price) {
            best = Some(q);
        }
    }
    best.map(|q| BestPrice {
        price: q.price,
        bookmaker: q.bookmaker.clone(),
        line: q.line,
    })
}

/// Best price for every outcome seen in `market`, keyed by outcome name.
pub fn best_prices_by_outcome(quotes: &[OddsQuote], market: &MarketKey) -> HashMap<String, BestPrice> {
    let mut board: HashMap<String, BestPrice> = HashMap::new();
    for q in quotes.iter().filter(|q| &q.market == market) {
        match board.get(&q.outcome) {
            Some(existing) if existing.price >= q.price => {}
            _ => {
                board.insert(
                    q.outcome.clone(),
                    BestPrice {
                        price: q.price,
                        bookmaker: q.bookmaker.clone(),
                        line: q.line,
                    },
                );
            }
        }
    }
    board
}

/// Overround of a two-way market when each side is taken at its best price
/// across books. Negative means the best prices form an arbitrage.
/// Returns None unless exactly two outcomes are quoted.
pub fn market_hold(quotes: &[OddsQuote], market: &MarketKey) -> Option<f64> {
    let board = best_prices_by_outcome(quotes, market);
    if board.len() != 2 {
        return None;
    }
    let mut total = 0.0;
    for best in board.values() {
        total += implied_probability(best.price).ok()?;
    }
    Some(total - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn quote(bookmaker: &str, market: MarketKey, outcome: &str, price: i32) -> OddsQuote {
        OddsQuote::new("evt", market, outcome, None, price, bookmaker, Utc::now()).unwrap()
    }

    #[test]
    fn test_best_price_mixed_signs() {
        let quotes = vec![
            quote("A", MarketKey::Moneyline, "Lakers", -110),
            quote("B", MarketKey::Moneyline, "Lakers", 105),
            quote("C", MarketKey::Moneyline, "Lakers", -120),
        ];
        let best = best_price(&quotes, &MarketKey::Moneyline, "Lakers").unwrap();
        assert_eq!(best.price, 105);
        assert_eq!(best.bookmaker, "B");
    }

    #[test]
    fn test_best_price_filters_market_and_outcome() {
        let quotes = vec![
            quote("A", MarketKey::Spread, "Lakers", 300),
            quote("B", MarketKey::Moneyline, "Celtics", 250),
            quote("C", MarketKey::Moneyline, "Lakers", -130),
        ];
        let best = best_price(&quotes, &MarketKey::Moneyline, "Lakers").unwrap();
        assert_eq!(best.bookmaker, "C");
    }

    #[test]
    fn test_best_price_no_match() {
        let quotes = vec![quote("A", MarketKey::Moneyline, "Lakers", -110)];
        assert!(best_price(&quotes, &MarketKey::Total, "Over").is_none());
        assert!(best_price(&[], &MarketKey::Moneyline, "Lakers").is_none());
    }

    #[test]
    fn test_tie_keeps_first_in_input_order() {
        let quotes = vec![
            quote("X", MarketKey::Moneyline, "Lakers", 120),
            quote("Y", MarketKey::Moneyline, "Lakers", 120),
        ];
        let best = best_price(&quotes, &MarketKey::Moneyline, "Lakers").unwrap();
        assert_eq!(best.bookmaker, "X");

        let board = best_prices_by_outcome(&quotes, &MarketKey::Moneyline);
        assert_eq!(board["Lakers"].bookmaker, "X");
    }

    #[test]
    fn test_market_hold() {
        let quotes = vec![
            quote("A", MarketKey::Moneyline, "Lakers", -110),
            quote("A", MarketKey::Moneyline, "Celtics", -110),
            quote("B", MarketKey::Moneyline, "Lakers", 105),
            quote("B", MarketKey::Moneyline, "Celtics", -125),
        ];
        // Lakers +105 (0.4878) + Celtics -110 (0.5238) = 1.0116
        let hold = market_hold(&quotes, &MarketKey::Moneyline).unwrap();
        assert!((hold - 0.01161).abs() < 1e-4);

        assert!(market_hold(&quotes, &MarketKey::Total).is_none());
    }
}
