//! Ticker universe for optimizer sampling and CLI ticker lists.

use crate::domain::error::TraderError;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;

/// Sampled by the optimizer when no ticker list is configured.
pub const DEFAULT_TICKERS: [&str; 16] = [
    "AAPL", "MSFT", "GOOGL", "AMZN", "TSLA", "NVDA", "META", "BRK-B", "JPM", "JNJ", "ITX.MC",
    "SAN.MC", "IBE.MC", "TEF.MC", "BBVA.MC", "NKE",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Universe {
    pub tickers: Vec<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in ticker list")]
    EmptyToken,

    #[error("duplicate ticker: {0}")]
    DuplicateTicker(String),
}

impl From<UniverseError> for TraderError {
    fn from(err: UniverseError) -> Self {
        TraderError::invalid(err.to_string())
    }
}

pub fn parse_tickers(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut tickers = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let ticker = trimmed.to_uppercase();
        if !seen.insert(ticker.clone()) {
            return Err(UniverseError::DuplicateTicker(ticker));
        }
        tickers.push(ticker);
    }

    Ok(tickers)
}

impl Default for Universe {
    fn default() -> Self {
        Universe {
            tickers: DEFAULT_TICKERS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl Universe {
    /// Parse a comma list; a blank list means the default universe.
    pub fn from_list(input: &str) -> Result<Self, UniverseError> {
        if input.trim().is_empty() {
            return Ok(Universe::default());
        }
        Ok(Universe {
            tickers: parse_tickers(input)?,
        })
    }

    pub fn count(&self) -> usize {
        self.tickers.len()
    }

    /// `n` distinct tickers chosen uniformly (all of them if `n >= count`).
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<String> {
        self.tickers
            .choose_multiple(rng, n.min(self.tickers.len()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn parse_tickers_basic() {
        let result = parse_tickers("AAPL,MSFT,SAN.MC").unwrap();
        assert_eq!(result, vec!["AAPL", "MSFT", "SAN.MC"]);
    }

    #[test]
    fn parse_tickers_trims_and_uppercases() {
        let result = parse_tickers("  aapl , msft ").unwrap();
        assert_eq!(result, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn parse_tickers_empty_token() {
        assert!(matches!(parse_tickers("AAPL,,MSFT"), Err(UniverseError::EmptyToken)));
    }

    #[test]
    fn parse_tickers_duplicate() {
        let result = parse_tickers("AAPL,MSFT,aapl");
        assert!(matches!(result, Err(UniverseError::DuplicateTicker(s)) if s == "AAPL"));
    }

    #[test]
    fn blank_list_is_default_universe() {
        let universe = Universe::from_list("  ").unwrap();
        assert_eq!(universe.count(), DEFAULT_TICKERS.len());
    }

    #[test]
    fn sample_is_distinct_and_bounded() {
        let universe = Universe::default();
        let mut rng = StdRng::seed_from_u64(7);
        let picked = universe.sample(&mut rng, 3);
        assert_eq!(picked.len(), 3);
        let unique: HashSet<_> = picked.iter().collect();
        assert_eq!(unique.len(), 3);

        let small = Universe::from_list("AAPL,MSFT").unwrap();
        assert_eq!(small.sample(&mut rng, 5).len(), 2);
    }
}
