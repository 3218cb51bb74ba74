use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use crate::market::{normalize_ticker, MarketData};

/// Result of a one-shot price check. Nothing is stored and nothing is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum AlertOutcome {
    Crossed {
        ticker: String,
        threshold: Decimal,
        price: Decimal,
    },
    Below {
        ticker: String,
        threshold: Decimal,
        price: Decimal,
    },
    InvalidThreshold,
    FetchFailed,
}

impl AlertOutcome {
    pub fn is_triggered(&self) -> bool {
        matches!(self, AlertOutcome::Crossed { .. })
    }
}

impl fmt::Display for AlertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertOutcome::Crossed {
                ticker,
                threshold,
                price,
            } => write!(
                f,
                "ALERT: {} has crossed {}! Current Price = {}",
                ticker, threshold, price
            ),
            AlertOutcome::Below { ticker, price, .. } => {
                write!(f, "{} is below threshold. Current Price = {}", ticker, price)
            }
            AlertOutcome::InvalidThreshold => write!(f, "Threshold must be a number."),
            AlertOutcome::FetchFailed => write!(f, "Could not fetch price."),
        }
    }
}

/// Parses `threshold` and compares it with the live price of `ticker`.
/// A price equal to the threshold counts as crossed.
pub async fn check_price_alert(market: &MarketData, ticker: &str, threshold: &str) -> AlertOutcome {
    let threshold = match parse_threshold(threshold) {
        Some(t) => t,
        None => {
            warn!("Rejected alert threshold {:?}", threshold);
            return AlertOutcome::InvalidThreshold;
        }
    };

    let symbol = match normalize_ticker(ticker) {
        Some(s) => s,
        None => return AlertOutcome::FetchFailed,
    };

    let price = match market.current_price(&symbol).await {
        Some(p) => p,
        None => return AlertOutcome::FetchFailed,
    };

    let outcome = if price >= threshold {
        AlertOutcome::Crossed {
            ticker: symbol,
            threshold,
            price,
        }
    } else {
        AlertOutcome::Below {
            ticker: symbol,
            threshold,
            price,
        }
    };
    info!("{}", outcome);
    outcome
}

fn parse_threshold(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}
