//! Raw ticker -> (canonical code, exchange).
//!
//! Accepted inputs (case-insensitive, surrounding whitespace ignored):
//! - `600519` (exchange inferred from the leading digit)
//! - `600519.SH`, `000001.SZ`, `600519.SSE`, `000001.SZSE` (the suffix is authoritative)
//! - `SH600519`, `sz000001` (the market prefix is authoritative)
//!
//! Inference: leading `5`, `6`, `9` -> SSE; `0`, `1`, `2`, `3` -> SZSE. Anything else is
//! rejected; the mapper never guesses.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Domestic venue a symbol is listed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Exchange {
    /// Shanghai Stock Exchange.
    #[serde(rename = "SSE")]
    Sse,
    /// Shenzhen Stock Exchange.
    #[serde(rename = "SZSE")]
    Szse,
}

impl Exchange {
    /// Code stored in the target table.
    pub const fn as_str(self) -> &'static str {
        match self {
            Exchange::Sse => "SSE",
            Exchange::Szse => "SZSE",
        }
    }

    /// Maps an exchange suffix or alias (`SH`, `SSE`, `SZ`, `SZSE`) to an exchange.
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias.trim().to_ascii_uppercase().as_str() {
            "SH" | "SSE" => Some(Exchange::Sse),
            "SZ" | "SZSE" => Some(Exchange::Szse),
            _ => None,
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Exchange {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Exchange::from_alias(s).ok_or_else(|| SymbolError::UnknownSuffix {
            raw: s.to_string(),
            suffix: s.trim().to_string(),
        })
    }
}

/// The symbol could not be mapped to exactly one exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// Empty after trimming.
    #[error("unresolvable symbol: empty input")]
    Empty,
    /// Dotted suffix that is not a known exchange alias.
    #[error("unresolvable symbol '{raw}': unknown exchange suffix '{suffix}'")]
    UnknownSuffix {
        /// Input as given.
        raw: String,
        /// The offending suffix.
        suffix: String,
    },
    /// The code part is not six ASCII digits.
    #[error("unresolvable symbol '{raw}': expected a six-digit code")]
    Malformed {
        /// Input as given.
        raw: String,
    },
    /// Leading digit maps to neither exchange.
    #[error("unresolvable symbol '{raw}': no exchange for leading digit '{leading}'")]
    UnknownPrefix {
        /// Input as given.
        raw: String,
        /// The leading digit of the code.
        leading: char,
    },
}

/// Normalized identity of a ticker. Recomputed from the raw symbol on every use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolInfo {
    /// Input as given.
    pub raw_symbol: String,
    /// Plain six-digit code.
    pub symbol: String,
    /// Listing venue.
    pub exchange: Exchange,
}

impl SymbolInfo {
    /// `"600519.SSE"` form used by the trading platform.
    pub fn vt_symbol(&self) -> String {
        format!("{}.{}", self.symbol, self.exchange)
    }

    /// Key used to query the source store (plain six-digit code).
    pub fn source_code(&self) -> &str {
        &self.symbol
    }
}

/// Resolves a raw ticker into its canonical code and exchange.
pub fn resolve(raw: &str) -> Result<SymbolInfo, SymbolError> {
    let s = raw.trim().to_ascii_uppercase();
    if s.is_empty() {
        return Err(SymbolError::Empty);
    }

    let (code, explicit) = match s.split_once('.') {
        Some((code, suffix)) => {
            let exchange =
                Exchange::from_alias(suffix).ok_or_else(|| SymbolError::UnknownSuffix {
                    raw: raw.to_string(),
                    suffix: suffix.to_string(),
                })?;
            (code, Some(exchange))
        }
        None => match split_market_prefix(&s) {
            Some((exchange, code)) => (code, Some(exchange)),
            None => (s.as_str(), None),
        },
    };

    if !is_six_digit_code(code) {
        return Err(SymbolError::Malformed {
            raw: raw.to_string(),
        });
    }

    let exchange = match explicit {
        Some(exchange) => exchange,
        None => infer_exchange(raw, code)?,
    };

    Ok(SymbolInfo {
        raw_symbol: raw.to_string(),
        symbol: code.to_string(),
        exchange,
    })
}

fn infer_exchange(raw: &str, code: &str) -> Result<Exchange, SymbolError> {
    let leading = code.chars().next().unwrap_or_default();
    match leading {
        '5' | '6' | '9' => Ok(Exchange::Sse),
        '0' | '1' | '2' | '3' => Ok(Exchange::Szse),
        _ => Err(SymbolError::UnknownPrefix {
            raw: raw.to_string(),
            leading,
        }),
    }
}

// "SH600519" / "SZ000001"
fn split_market_prefix(s: &str) -> Option<(Exchange, &str)> {
    if s.len() != 8 || !s.is_char_boundary(2) {
        return None;
    }
    let (prefix, code) = s.split_at(2);
    let exchange = match prefix {
        "SH" => Exchange::Sse,
        "SZ" => Exchange::Szse,
        _ => return None,
    };
    Some((exchange, code))
}

fn is_six_digit_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bare_codes_infer_exchange() {
        assert_eq!(resolve("600519").unwrap().exchange, Exchange::Sse);
        assert_eq!(resolve("510300").unwrap().exchange, Exchange::Sse);
        assert_eq!(resolve("000001").unwrap().exchange, Exchange::Szse);
        assert_eq!(resolve("300750").unwrap().exchange, Exchange::Szse);
    }

    #[test]
    fn suffix_is_authoritative() {
        // SSE Composite index shares the 000001 code with Ping An Bank.
        let idx = resolve("000001.SH").unwrap();
        assert_eq!(idx.symbol, "000001");
        assert_eq!(idx.exchange, Exchange::Sse);

        let info = resolve(" 600519.sse ").unwrap();
        assert_eq!(info.vt_symbol(), "600519.SSE");
        assert_eq!(info.raw_symbol, " 600519.sse ");

        assert_eq!(resolve("000002.SZSE").unwrap().exchange, Exchange::Szse);
    }

    #[test]
    fn market_prefix_is_accepted() {
        let info = resolve("sh600000").unwrap();
        assert_eq!(info.symbol, "600000");
        assert_eq!(info.exchange, Exchange::Sse);
        assert_eq!(resolve("SZ000001").unwrap().exchange, Exchange::Szse);
    }

    #[test]
    fn rejects_unknown_suffix_and_malformed_codes() {
        assert!(matches!(
            resolve("600519.HK"),
            Err(SymbolError::UnknownSuffix { .. })
        ));
        assert!(matches!(resolve("60051"), Err(SymbolError::Malformed { .. })));
        assert!(matches!(resolve("AAPL"), Err(SymbolError::Malformed { .. })));
        assert!(matches!(resolve(".SH"), Err(SymbolError::Malformed { .. })));
        assert_eq!(resolve("   "), Err(SymbolError::Empty));
    }

    #[test]
    fn unmapped_leading_digit_is_an_error() {
        let err = resolve("700001").unwrap_err();
        assert_eq!(
            err,
            SymbolError::UnknownPrefix {
                raw: "700001".into(),
                leading: '7'
            }
        );
        assert!(err.to_string().contains("leading digit '7'"));
    }

    #[test]
    fn exchange_parses_aliases() {
        assert_eq!("sh".parse::<Exchange>().unwrap(), Exchange::Sse);
        assert_eq!("SZSE".parse::<Exchange>().unwrap(), Exchange::Szse);
        assert!("NYSE".parse::<Exchange>().is_err());
    }

    proptest! {
        #[test]
        fn leading_digit_decides_exchange(lead in 0u8..10, rest in "[0-9]{5}") {
            let code = format!("{lead}{rest}");
            let got = resolve(&code);
            match lead {
                5 | 6 | 9 => prop_assert_eq!(got.unwrap().exchange, Exchange::Sse),
                0..=3 => prop_assert_eq!(got.unwrap().exchange, Exchange::Szse),
                _ => {
                    let is_unknown_prefix = matches!(got, Err(SymbolError::UnknownPrefix { .. }));
                    prop_assert!(is_unknown_prefix);
                }
            }
        }

        #[test]
        fn resolve_is_idempotent(code in "[0-9]{6}") {
            prop_assert_eq!(resolve(&code), resolve(&code));
            if let Ok(info) = resolve(&code) {
                // Feeding the normalized form back yields the same identity.
                let again = resolve(&info.vt_symbol()).unwrap();
                prop_assert_eq!(again.symbol, info.symbol);
                prop_assert_eq!(again.exchange, info.exchange);
            }
        }
    }
}
