pub mod ema;
pub mod sma;

pub use ema::*;
pub use sma::*;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::settings::IndicatorSettings;
use crate::types::PriceSeries;

/// One named indicator column aligned with the price series.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorColumn {
    pub name: String,
    pub values: Vec<Option<Decimal>>,
}

/// Closing prices plus moving averages, ready for charting.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorFrame {
    pub ticker: String,
    pub timestamps: Vec<DateTime<Utc>>,
    pub close: Vec<Decimal>,
    pub columns: Vec<IndicatorColumn>,
}

impl IndicatorFrame {
    pub fn compute(series: &PriceSeries, settings: &IndicatorSettings) -> Self {
        let closes = series.closes();

        let mut columns: Vec<IndicatorColumn> = settings
            .sma_windows
            .iter()
            .map(|w| IndicatorColumn {
                name: format!("SMA_{}", w),
                values: sma(&closes, *w),
            })
            .collect();

        columns.push(IndicatorColumn {
            name: format!("EMA_{}", settings.ema_span),
            values: ema(&closes, settings.ema_span),
        });

        Self {
            ticker: series.ticker().to_string(),
            timestamps: series.timestamps(),
            close: closes,
            columns,
        }
    }

    #[cfg(test)]
    pub fn column(&self, name: &str) -> Option<&IndicatorColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.close.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::bar::fixtures::daily_bars;

    #[test]
    fn test_frame_columns_match_series_length() {
        let closes: Vec<f64> = (1..=60).map(|v| v as f64).collect();
        let series = PriceSeries::new("AAPL", daily_bars(&closes));
        let frame = IndicatorFrame::compute(&series, &IndicatorSettings::default());

        assert_eq!(frame.len(), 60);
        assert_eq!(frame.columns.len(), 3);
        for column in &frame.columns {
            assert_eq!(column.values.len(), 60);
        }

        let sma20 = frame.column("SMA_20").unwrap();
        assert_eq!(sma20.values.iter().filter(|v| v.is_none()).count(), 19);
        let sma50 = frame.column("SMA_50").unwrap();
        assert_eq!(sma50.values.iter().filter(|v| v.is_none()).count(), 49);
        let ema20 = frame.column("EMA_20").unwrap();
        assert!(ema20.values.iter().all(|v| v.is_some()));
    }

    #[test]
    fn test_frame_custom_windows() {
        let series = PriceSeries::new("MSFT", daily_bars(&[1.0, 2.0, 3.0]));
        let settings = IndicatorSettings {
            sma_windows: vec![2],
            ema_span: 9,
        };
        let frame = IndicatorFrame::compute(&series, &settings);

        assert!(frame.column("SMA_2").is_some());
        assert!(frame.column("EMA_9").is_some());
        assert!(frame.column("SMA_20").is_none());
    }
}
