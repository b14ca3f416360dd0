//! Instrument symbols and helpers shared between client and server.
//!
//! A `Symbol` is an opaque identifier such as `BTCUSD`. Every constructor trims
//! and upper-cases its input, so `btcusd`, ` BtcUsd ` and `BTCUSD` are the same key
//! on every path (subscribe, publish, snapshot).

use std::fmt;
use std::io::BufRead;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PriceError;

/// Case-normalized instrument identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Normalize `raw` into a symbol.
    ///
    /// Fails with `PriceError::InvalidSymbol` when the trimmed input is empty or
    /// contains inner whitespace.
    pub fn new(raw: &str) -> Result<Self, PriceError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(PriceError::InvalidSymbol(raw.to_string()));
        }
        Ok(Symbol(trimmed.to_uppercase()))
    }

    /// The normalized text of the symbol.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::new(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = PriceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::new(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Trait providing file parsing for symbol lists.
pub trait SymbolParser {
    /// Parses symbols from a buffered reader.
    ///
    /// Symbols may be separated by commas, spaces, or new lines. Duplicates are
    /// dropped while keeping first-seen order. Returns an error if any entry is
    /// not a valid symbol.
    fn parse_from_file<R: BufRead>(reader: R) -> Result<Vec<Symbol>, PriceError>;
}

impl SymbolParser for Symbol {
    fn parse_from_file<R: BufRead>(reader: R) -> Result<Vec<Self>, PriceError> {
        let mut symbols: Vec<Symbol> = Vec::new();

        for line_result in reader.lines() {
            let line = line_result.map_err(PriceError::Io)?;
            for token in line.split(|c: char| c == ',' || c.is_whitespace()) {
                if token.is_empty() {
                    continue;
                }
                let symbol = Symbol::new(token)
                    .map_err(|e| PriceError::ParseSymbolsFile(e.to_string()))?;
                if !symbols.contains(&symbol) {
                    symbols.push(symbol);
                }
            }
        }
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn normalizes_case_and_whitespace() {
        let symbol = Symbol::new("  btcUsd ").unwrap();
        assert_eq!(symbol.as_str(), "BTCUSD");
        assert_eq!(symbol, "BTCUSD".parse::<Symbol>().unwrap());
    }

    #[test]
    fn rejects_empty_and_inner_whitespace() {
        assert!(matches!(Symbol::new("   "), Err(PriceError::InvalidSymbol(_))));
        assert!(matches!(Symbol::new("BTC USD"), Err(PriceError::InvalidSymbol(_))));
    }

    #[test]
    fn deserializes_through_normalization() {
        let symbol: Symbol = serde_json::from_str("\"ethusd\"").unwrap();
        assert_eq!(symbol.as_str(), "ETHUSD");
        assert!(serde_json::from_str::<Symbol>("\"\"").is_err());
    }

    #[test]
    fn parses_mixed_separators_and_dedupes() {
        let input = Cursor::new("aapl, spy\n\nSPY qqq\nbtcusd\n");
        let symbols = Symbol::parse_from_file(input).unwrap();
        let names: Vec<&str> = symbols.iter().map(Symbol::as_str).collect();
        assert_eq!(names, vec!["AAPL", "SPY", "QQQ", "BTCUSD"]);
    }
}
