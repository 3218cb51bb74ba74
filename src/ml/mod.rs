pub mod forecast;
#[cfg(feature = "forecast")]
pub mod lstm;
pub mod scaler;
pub mod windows;

pub use forecast::{Forecast, ForecastParams, Forecaster, ModelConfig, SequenceRegressor};
pub use scaler::MinMaxScaler;
pub use windows::WindowSet;
