use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{NaiveTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use super::MarketSource;
use crate::settings::MarketDataSettings;
use crate::types::{Bar, HistoryRange, Interval};

/// Quotes are rounded to this many decimal places.
const PRICE_SCALE: u32 = 4;

/// Client for the Yahoo Finance v8 chart endpoint.
#[derive(Debug, Clone)]
pub struct YahooClient {
    client: Client,
    base_url: String,
    user_agent: String,
}

impl YahooClient {
    pub fn new(settings: &MarketDataSettings) -> Self {
        Self {
            client: Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            user_agent: settings.user_agent.clone(),
        }
    }

    fn chart_url(&self, ticker: &str, range: HistoryRange, interval: Interval) -> String {
        match range {
            HistoryRange::Period(period) => format!(
                "{}/{}?range={}&interval={}",
                self.base_url,
                ticker,
                period.as_str(),
                interval.as_str()
            ),
            HistoryRange::Between { start, end } => {
                let period1 = Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN)).timestamp();
                let period2 = Utc.from_utc_datetime(&end.and_time(NaiveTime::MIN)).timestamp();
                format!(
                    "{}/{}?period1={}&period2={}&interval={}",
                    self.base_url,
                    ticker,
                    period1,
                    period2,
                    interval.as_str()
                )
            }
        }
    }
}

#[async_trait]
impl MarketSource for YahooClient {
    async fn fetch_bars(
        &self,
        ticker: &str,
        range: HistoryRange,
        interval: Interval,
    ) -> Result<Vec<Bar>> {
        let url = self.chart_url(ticker, range, interval);
        debug!("GET {}", url);

        let resp: ChartResponse = self
            .client
            .get(&url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await?
            .json()
            .await?;

        parse_chart(resp)
    }
}

fn parse_chart(resp: ChartResponse) -> Result<Vec<Bar>> {
    if let Some(error) = resp.chart.error {
        return Err(anyhow!("Yahoo Finance error: {} - {}", error.code, error.description));
    }

    let result = resp
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| anyhow!("empty chart result"))?;

    let timestamps = result.timestamp.unwrap_or_default();
    let quote = match result.indicators.quote.into_iter().next() {
        Some(q) => q,
        None => return Ok(Vec::new()),
    };

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        // Rows without a close are gaps (halts, the still-forming minute)
        let close = match field(&quote.close, i).and_then(to_price) {
            Some(c) => c,
            None => continue,
        };
        let timestamp = match Utc.timestamp_opt(*ts, 0).single() {
            Some(t) => t,
            None => continue,
        };

        bars.push(Bar {
            timestamp,
            open: field(&quote.open, i).and_then(to_price).unwrap_or(close),
            high: field(&quote.high, i).and_then(to_price).unwrap_or(close),
            low: field(&quote.low, i).and_then(to_price).unwrap_or(close),
            close,
            volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
        });
    }

    Ok(bars)
}

fn field(values: &[Option<f64>], i: usize) -> Option<f64> {
    values.get(i).copied().flatten()
}

fn to_price(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64(value).map(|d| d.round_dp(PRICE_SCALE))
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}
