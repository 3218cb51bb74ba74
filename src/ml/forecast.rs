use serde::Serialize;
use std::collections::VecDeque;
use tracing::{info, warn};

use super::{MinMaxScaler, WindowSet};
use crate::error::{Error, Result};
use crate::market::MarketData;
use crate::settings::ForecastSettings;
use crate::types::Period;

/// Hyper-parameters for the per-call model.
#[derive(Debug, Clone, Copy)]
pub struct ModelConfig {
    pub hidden_size: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub epochs: usize,
}

impl ModelConfig {
    pub fn from_settings(settings: &ForecastSettings, epochs: usize) -> Self {
        Self {
            hidden_size: settings.hidden_size,
            batch_size: settings.batch_size,
            learning_rate: settings.learning_rate,
            epochs,
        }
    }
}

/// A trained model that maps a window of scaled values to the next one.
pub trait SequenceRegressor {
    fn predict_next(&self, window: &[f64]) -> f64;
}

/// Validated user input for one forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastParams {
    pub window: usize,
    pub days: usize,
    pub epochs: usize,
    pub include_history: bool,
}

impl ForecastParams {
    /// Checks the raw values against the configured upper limits.
    pub fn new(
        window: i64,
        days: i64,
        epochs: i64,
        include_history: bool,
        limits: &ForecastSettings,
    ) -> Result<Self> {
        let window = positive("window", window)?;
        let days = at_most("days", positive("days", days)?, limits.max_days)?;
        let epochs = at_most("epochs", positive("epochs", epochs)?, limits.max_epochs)?;

        Ok(Self {
            window,
            days,
            epochs,
            include_history,
        })
    }
}

fn positive(name: &str, value: i64) -> Result<usize> {
    if value <= 0 {
        return Err(Error::invalid(format!("{} must be a positive integer", name)));
    }
    usize::try_from(value).map_err(|_| Error::invalid(format!("{} is too large", name)))
}

fn at_most(name: &str, value: usize, max: usize) -> Result<usize> {
    if value > max {
        return Err(Error::invalid(format!("{} must be at most {}", name, max)));
    }
    Ok(value)
}

/// Predicted closes in price units, optionally with the history they extend.
#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub ticker: String,
    pub window: usize,
    pub epochs: usize,
    pub predictions: Vec<f64>,
    pub history: Option<Vec<f64>>,
    pub final_loss: f64,
}

impl Forecast {
    /// History followed by the predictions, or just the predictions.
    pub fn series(&self) -> Vec<f64> {
        match &self.history {
            Some(history) => history
                .iter()
                .chain(self.predictions.iter())
                .copied()
                .collect(),
            None => self.predictions.clone(),
        }
    }
}

/// Feeds each prediction back in as the newest element of the window.
pub fn roll_forward<M: SequenceRegressor + ?Sized>(model: &M, seed: &[f64], days: usize) -> Vec<f64> {
    let mut window: VecDeque<f64> = seed.iter().copied().collect();
    let mut out = Vec::new();

    for _ in 0..days {
        let next = model.predict_next(window.make_contiguous());
        out.push(next);
        window.pop_front();
        window.push_back(next);
    }

    out
}

/// Outcome of scaling, training and rolling on one closing-price column.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub predictions: Vec<f64>,
    pub samples: usize,
    pub final_loss: f64,
}

/// Steps 2-6 of a forecast on an already fetched closing-price column.
pub fn run_pipeline(closes: &[f64], params: &ForecastParams, config: ModelConfig) -> Result<PipelineOutput> {
    if closes.len() < params.window + 1 {
        return Err(Error::NoData(format!(
            "need at least {} closes, got {}",
            params.window + 1,
            closes.len()
        )));
    }

    let scaler = MinMaxScaler::fit(closes)
        .ok_or_else(|| Error::NoData("closing prices are not finite".to_string()))?;
    let scaled = scaler.transform_all(closes);
    let windows = WindowSet::build(&scaled, params.window);
    let seed = &scaled[scaled.len() - params.window..];

    let (scaled_predictions, final_loss) = fit_and_roll(&windows, seed, params.days, config)?;
    if scaled_predictions.iter().any(|p| !p.is_finite()) {
        return Err(Error::ModelUnavailable(
            "model produced non-finite predictions".to_string(),
        ));
    }

    Ok(PipelineOutput {
        predictions: scaler.inverse_transform_all(&scaled_predictions),
        samples: windows.len(),
        final_loss,
    })
}

#[cfg(feature = "forecast")]
fn fit_and_roll(
    windows: &WindowSet,
    seed: &[f64],
    days: usize,
    config: ModelConfig,
) -> Result<(Vec<f64>, f64)> {
    use super::lstm::LstmRegressor;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    let mut rng = StdRng::from_entropy();
    let mut model = LstmRegressor::new(config, &mut rng);
    let report = model.fit(windows, &mut rng)?;
    Ok((roll_forward(&model, seed, days), report.final_loss))
}

#[cfg(not(feature = "forecast"))]
fn fit_and_roll(
    _windows: &WindowSet,
    _seed: &[f64],
    _days: usize,
    _config: ModelConfig,
) -> Result<(Vec<f64>, f64)> {
    Err(Error::ModelUnavailable(
        "Forecasting support is not built into this binary.".to_string(),
    ))
}

/// Fetches history and runs the full forecast for one ticker.
#[derive(Clone)]
pub struct Forecaster {
    market: MarketData,
    settings: ForecastSettings,
    period: Period,
}

impl Forecaster {
    pub fn new(market: MarketData, settings: ForecastSettings, period: Period) -> Self {
        Self {
            market,
            settings,
            period,
        }
    }

    pub fn settings(&self) -> &ForecastSettings {
        &self.settings
    }

    pub async fn forecast(&self, ticker: &str, params: ForecastParams) -> Result<Forecast> {
        let series = self
            .market
            .history(ticker, self.period.into())
            .await
            .ok_or_else(|| Error::NoData(ticker.to_string()))?;

        let closes = series.closes_f64();
        if closes.len() < params.window + 1 {
            warn!(
                "{} has {} closes, forecast window {} needs {}",
                series.ticker(),
                closes.len(),
                params.window,
                params.window + 1
            );
            return Err(Error::NoData(series.ticker().to_string()));
        }

        let config = ModelConfig::from_settings(&self.settings, params.epochs);
        let history = closes.clone();
        let output = tokio::task::spawn_blocking(move || run_pipeline(&closes, &params, config))
            .await
            .map_err(|e| Error::ModelUnavailable(format!("training task failed: {}", e)))??;

        info!(
            "Forecast {}: trained on {} windows for {} epochs, loss={:.6}, {} day(s) ahead",
            series.ticker(),
            output.samples,
            params.epochs,
            output.final_loss,
            params.days
        );

        Ok(Forecast {
            ticker: series.ticker().to_string(),
            window: params.window,
            epochs: params.epochs,
            predictions: output.predictions,
            history: params.include_history.then_some(history),
            final_loss: output.final_loss,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MockMarketSource;
    use crate::types::bar::fixtures::daily_bars;
    use crate::types::{HistoryRange, Interval};
    use std::cell::RefCell;
    use std::sync::Arc;

    fn small_settings() -> ForecastSettings {
        ForecastSettings {
            hidden_size: 4,
            batch_size: 16,
            ..ForecastSettings::default()
        }
    }

    fn forecaster(closes: Vec<f64>) -> Forecaster {
        let mut mock = MockMarketSource::new();
        mock.expect_fetch_bars()
            .returning(move |_, _, _| Ok(daily_bars(&closes)));
        Forecaster::new(
            MarketData::new(Arc::new(mock)),
            small_settings(),
            Period::TwoYears,
        )
    }

    fn wave(n: usize) -> Vec<f64> {
        (0..n).map(|t| 100.0 + 10.0 * (t as f64 * 0.2).sin()).collect()
    }

    /// Returns the newest window element plus one and records every window.
    struct Echo {
        seen: RefCell<Vec<Vec<f64>>>,
    }

    impl SequenceRegressor for Echo {
        fn predict_next(&self, window: &[f64]) -> f64 {
            self.seen.borrow_mut().push(window.to_vec());
            window.last().copied().unwrap_or(0.0) + 1.0
        }
    }

    #[test]
    fn test_params_validation() {
        let limits = ForecastSettings::default();
        assert!(ForecastParams::new(50, 1, 2, false, &limits).is_ok());
        assert!(matches!(
            ForecastParams::new(0, 1, 2, false, &limits),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            ForecastParams::new(50, -3, 2, false, &limits),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            ForecastParams::new(50, 1, 0, false, &limits),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            ForecastParams::new(50, 1, 51, false, &limits),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_params_reject_days_beyond_limit() {
        let limits = ForecastSettings::default();
        assert!(ForecastParams::new(10, limits.max_days as i64, 1, false, &limits).is_ok());
        assert!(matches!(
            ForecastParams::new(10, limits.max_days as i64 + 1, 1, false, &limits),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            ForecastParams::new(10, 1 << 44, 1, false, &limits),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_roll_forward_feeds_back_predictions() {
        let model = Echo {
            seen: RefCell::new(Vec::new()),
        };
        let out = roll_forward(&model, &[0.1, 0.2, 0.3], 3);

        assert_eq!(out.len(), 3);
        let seen = model.seen.borrow();
        assert_eq!(seen[0], vec![0.1, 0.2, 0.3]);
        assert_eq!(seen[1], vec![0.2, 0.3, out[0]]);
        assert_eq!(seen[2], vec![0.3, out[0], out[1]]);
    }

    #[test]
    fn test_series_prefixes_history() {
        let forecast = Forecast {
            ticker: "AAPL".to_string(),
            window: 2,
            epochs: 1,
            predictions: vec![4.0, 5.0],
            history: Some(vec![1.0, 2.0, 3.0]),
            final_loss: 0.0,
        };
        assert_eq!(forecast.series(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);

        let bare = Forecast {
            history: None,
            ..forecast
        };
        assert_eq!(bare.series(), vec![4.0, 5.0]);
    }

    #[test]
    fn test_pipeline_rejects_short_series() {
        let params = ForecastParams::new(10, 1, 1, false, &small_settings()).unwrap();
        let config = ModelConfig::from_settings(&small_settings(), 1);
        let result = run_pipeline(&wave(10), &params, config);
        assert!(matches!(result, Err(Error::NoData(_))));
    }

    #[cfg(feature = "forecast")]
    #[tokio::test]
    async fn test_forecast_three_days() {
        let forecaster = forecaster(wave(120));
        let params = ForecastParams::new(20, 3, 2, false, &small_settings()).unwrap();

        let first = forecaster.forecast("AAPL", params).await.unwrap();
        assert_eq!(first.ticker, "AAPL");
        assert_eq!(first.predictions.len(), 3);
        assert!(first.predictions.iter().all(|p| p.is_finite()));
        assert!(first.history.is_none());

        let second = forecaster.forecast("AAPL", params).await.unwrap();
        assert_eq!(second.predictions.len(), first.predictions.len());
    }

    #[cfg(feature = "forecast")]
    #[tokio::test]
    async fn test_forecast_with_history() {
        let forecaster = forecaster(wave(60));
        let params = ForecastParams::new(10, 2, 1, true, &small_settings()).unwrap();

        let forecast = forecaster.forecast("MSFT", params).await.unwrap();
        assert_eq!(forecast.history.as_ref().map(|h| h.len()), Some(60));
        assert_eq!(forecast.series().len(), 62);
    }

    #[cfg(not(feature = "forecast"))]
    #[tokio::test]
    async fn test_forecast_without_model_support() {
        let forecaster = forecaster(wave(120));
        let params = ForecastParams::new(20, 3, 2, false, &small_settings()).unwrap();
        assert!(matches!(
            forecaster.forecast("AAPL", params).await,
            Err(Error::ModelUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_forecast_short_history_is_no_data() {
        let forecaster = forecaster(wave(50));
        let params = ForecastParams::new(50, 1, 1, false, &small_settings()).unwrap();
        assert!(matches!(
            forecaster.forecast("AAPL", params).await,
            Err(Error::NoData(_))
        ));
    }

    #[tokio::test]
    async fn test_forecast_unknown_ticker_is_no_data() {
        let mut mock = MockMarketSource::new();
        mock.expect_fetch_bars()
            .returning(|_, _, _| Ok(Vec::new()));
        let forecaster = Forecaster::new(
            MarketData::new(Arc::new(mock)),
            small_settings(),
            Period::TwoYears,
        );
        let params = ForecastParams::new(10, 1, 1, false, forecaster.settings()).unwrap();
        assert!(matches!(
            forecaster.forecast("NOPE", params).await,
            Err(Error::NoData(_))
        ));
    }

    #[tokio::test]
    async fn test_forecast_trains_on_configured_daily_period() {
        let mut mock = MockMarketSource::new();
        mock.expect_fetch_bars()
            .withf(|_, r, i| *r == HistoryRange::Period(Period::TwoYears) && *i == Interval::D1)
            .times(1)
            .returning(|_, _, _| Ok(daily_bars(&[1.0, 2.0, 3.0])));
        let forecaster = Forecaster::new(
            MarketData::new(Arc::new(mock)),
            small_settings(),
            Period::TwoYears,
        );

        let params = ForecastParams::new(5, 1, 1, false, forecaster.settings()).unwrap();
        assert!(matches!(
            forecaster.forecast("AAPL", params).await,
            Err(Error::NoData(_))
        ));
    }
}
