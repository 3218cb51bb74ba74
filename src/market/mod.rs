pub mod yahoo;

pub use yahoo::*;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::types::{Bar, HistoryRange, Interval, Period, PriceSeries};

/// Upstream provider of OHLCV bars.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn fetch_bars(
        &self,
        ticker: &str,
        range: HistoryRange,
        interval: Interval,
    ) -> anyhow::Result<Vec<Bar>>;
}

/// Market data accessor. Every upstream failure (network, unknown ticker,
/// empty result) collapses into `None`.
#[derive(Clone)]
pub struct MarketData {
    source: Arc<dyn MarketSource>,
}

impl MarketData {
    pub fn new(source: Arc<dyn MarketSource>) -> Self {
        Self { source }
    }

    /// Daily history for `ticker` over `range`.
    pub async fn history(&self, ticker: &str, range: HistoryRange) -> Option<PriceSeries> {
        self.history_at(ticker, range, Interval::D1).await
    }

    pub async fn history_at(
        &self,
        ticker: &str,
        range: HistoryRange,
        interval: Interval,
    ) -> Option<PriceSeries> {
        let symbol = normalize_ticker(ticker)?;

        match self.source.fetch_bars(&symbol, range, interval).await {
            Ok(bars) if !bars.is_empty() => {
                let series = PriceSeries::new(symbol, bars);
                info!(
                    "Fetched {} bars for {} ({}, {})",
                    series.len(),
                    series.ticker(),
                    range,
                    interval
                );
                Some(series)
            }
            Ok(_) => {
                warn!("No bars returned for {} ({}, {})", symbol, range, interval);
                None
            }
            Err(e) => {
                warn!("Failed to fetch {} ({}, {}): {}", symbol, range, interval, e);
                None
            }
        }
    }

    /// Most recent close, preferring today's 1-minute bars and falling back
    /// to the latest daily close.
    pub async fn current_price(&self, ticker: &str) -> Option<Decimal> {
        let intraday = self
            .history_at(ticker, Period::OneDay.into(), Interval::M1)
            .await
            .and_then(|s| s.last_close());

        if intraday.is_some() {
            return intraday;
        }

        debug!("Intraday quote unavailable for {}, using daily close", ticker);
        self.history_at(ticker, Period::OneDay.into(), Interval::D1)
            .await
            .and_then(|s| s.last_close())
    }
}

/// Tickers are case-insensitive; blank input never reaches the provider.
pub fn normalize_ticker(ticker: &str) -> Option<String> {
    let symbol = ticker.trim().to_uppercase();
    if symbol.is_empty() {
        None
    } else {
        Some(symbol)
    }
}

/// Percent change between the last two closes.
pub fn recent_change_pct(series: &PriceSeries) -> Option<Decimal> {
    let bars = series.bars();
    if bars.len() < 2 {
        return None;
    }
    let last = bars[bars.len() - 1].close;
    let prev = bars[bars.len() - 2].close;
    if prev.is_zero() {
        return None;
    }
    Some((last - prev) / prev * Decimal::from(100))
}
