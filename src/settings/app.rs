use serde::{Deserialize, Serialize};

use crate::types::Period;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub market_data: MarketDataSettings,
    pub indicators: IndicatorSettings,
    pub forecast: ForecastSettings,
    pub advisor: AdvisorSettings,
}

impl AppSettings {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be > 0".to_string());
        }
        if self.database.path.trim().is_empty() {
            errors.push("database.path must not be empty".to_string());
        }
        if self.market_data.base_url.trim().is_empty() {
            errors.push("market_data.base_url must not be empty".to_string());
        }
        if !matches!(
            self.market_data.forecast_period,
            Period::TwoYears | Period::FiveYears | Period::TenYears | Period::Max
        ) {
            errors.push("market_data.forecast_period must be one of 2y, 5y, 10y, max".to_string());
        }

        // Indicators
        if self.indicators.sma_windows.is_empty() {
            errors.push("indicators.sma_windows must list at least one window".to_string());
        }
        if self.indicators.sma_windows.iter().any(|w| *w == 0) {
            errors.push("indicators.sma_windows entries must be > 0".to_string());
        }
        if self.indicators.ema_span == 0 {
            errors.push("indicators.ema_span must be > 0".to_string());
        }

        // Forecast
        let f = &self.forecast;
        if f.window == 0 {
            errors.push("forecast.window must be > 0".to_string());
        }
        if f.days == 0 || f.days > f.max_days {
            errors.push("forecast.days must be between 1 and forecast.max_days".to_string());
        }
        if f.epochs == 0 || f.epochs > f.max_epochs {
            errors.push("forecast.epochs must be between 1 and forecast.max_epochs".to_string());
        }
        if f.hidden_size == 0 {
            errors.push("forecast.hidden_size must be > 0".to_string());
        }
        if f.batch_size == 0 {
            errors.push("forecast.batch_size must be > 0".to_string());
        }
        if !(f.learning_rate > 0.0 && f.learning_rate < 1.0) {
            errors.push("forecast.learning_rate must be between 0 and 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Settings rendered as TOML with API keys masked.
    pub fn to_redacted_toml(&self) -> anyhow::Result<String> {
        let mut copy = self.clone();
        for key in [&mut copy.advisor.groq_api_key, &mut copy.advisor.openai_api_key] {
            if key.is_some() {
                *key = Some("****".to_string());
            }
        }
        Ok(toml::to_string_pretty(&copy)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8501,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "users.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataSettings {
    pub base_url: String,
    pub user_agent: String,
    /// History fetched to train the forecaster.
    pub forecast_period: Period,
}

impl Default for MarketDataSettings {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            forecast_period: Period::TwoYears,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorSettings {
    pub sma_windows: Vec<usize>,
    pub ema_span: usize,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            sma_windows: vec![20, 50],
            ema_span: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastSettings {
    pub window: usize,
    pub days: usize,
    pub max_days: usize,
    pub epochs: usize,
    pub max_epochs: usize,
    pub hidden_size: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            window: 50,
            days: 1,
            max_days: 30,
            epochs: 2,
            max_epochs: 50,
            hidden_size: 32,
            batch_size: 32,
            learning_rate: 0.001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorSettings {
    pub groq_api_key: Option<String>,
    pub groq_base_url: String,
    pub groq_model: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
}

impl Default for AdvisorSettings {
    fn default() -> Self {
        Self {
            groq_api_key: None,
            groq_base_url: "https://api.groq.com/openai/v1".to_string(),
            groq_model: "llama-3.1-8b-instant".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-3.5-turbo".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = AppSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.indicators.sma_windows, vec![20, 50]);
        assert_eq!(settings.forecast.window, 50);
        assert!(settings.forecast.epochs <= 5);
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let mut settings = AppSettings::default();
        settings.server.port = 0;
        settings.forecast.window = 0;
        settings.forecast.epochs = 100;
        settings.indicators.sma_windows.clear();

        let errors = settings.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("forecast.window")));
    }

    #[test]
    fn test_forecast_period_needs_enough_history() {
        let mut settings = AppSettings::default();
        settings.market_data.forecast_period = Period::OneMonth;
        let errors = settings.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("market_data.forecast_period"));

        for period in [Period::FiveYears, Period::TenYears, Period::Max] {
            settings.market_data.forecast_period = period;
            assert!(settings.validate().is_ok());
        }
    }

    #[test]
    fn test_forecast_days_bounded_by_max_days() {
        let mut settings = AppSettings::default();
        settings.forecast.days = settings.forecast.max_days + 1;
        let errors = settings.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("forecast.days")));
    }

    #[test]
    fn test_redacted_toml_masks_keys() {
        let mut settings = AppSettings::default();
        settings.advisor.groq_api_key = Some("gsk_secret".to_string());

        let rendered = settings.to_redacted_toml().unwrap();
        assert!(!rendered.contains("gsk_secret"));
        assert!(rendered.contains("****"));
        assert!(rendered.contains("[forecast]"));
    }
}
