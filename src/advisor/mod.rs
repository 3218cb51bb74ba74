use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::market::{recent_change_pct, MarketData};
use crate::settings::AdvisorSettings;
use crate::types::Period;

/// Given a prompt, return text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionClient {
    http_client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let request_body = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ]
        });

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await
            .context("chat completion request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Status {}: {}", status, text));
        }

        let json: serde_json::Value = response.json().await?;
        completion_text(&json)
    }
}

fn completion_text(json: &serde_json::Value) -> anyhow::Result<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow!("Missing content in response"))
}

/// The configured text generator, if any key was supplied.
pub enum Advisor {
    Available(Box<dyn TextGenerator>),
    Unavailable,
}

/// Buy/Hold/Sell advice for one ticker.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub ticker: String,
    pub change_pct: Decimal,
    pub text: String,
}

impl Advisor {
    /// Prefers Groq, then OpenAI.
    pub fn from_settings(settings: &AdvisorSettings) -> Self {
        let key = |k: &Option<String>| k.as_deref().map(str::trim).filter(|k| !k.is_empty()).map(str::to_string);

        if let Some(api_key) = key(&settings.groq_api_key) {
            info!("Recommendations via Groq ({})", settings.groq_model);
            return Advisor::Available(Box::new(ChatCompletionClient::new(
                &settings.groq_base_url,
                &api_key,
                &settings.groq_model,
            )));
        }
        if let Some(api_key) = key(&settings.openai_api_key) {
            info!("Recommendations via OpenAI ({})", settings.openai_model);
            return Advisor::Available(Box::new(ChatCompletionClient::new(
                &settings.openai_base_url,
                &api_key,
                &settings.openai_model,
            )));
        }

        info!("No AI API key configured, recommendations disabled");
        Advisor::Unavailable
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Advisor::Available(_))
    }

    pub async fn recommend(&self, market: &MarketData, ticker: &str) -> Result<Recommendation> {
        let series = market
            .history(ticker, Period::OneMonth.into())
            .await
            .ok_or_else(|| Error::NoData(ticker.to_string()))?;
        let change_pct = recent_change_pct(&series)
            .ok_or_else(|| Error::NoData(series.ticker().to_string()))?;

        let generator = match self {
            Advisor::Available(g) => g,
            Advisor::Unavailable => {
                return Err(Error::ModelUnavailable("No AI API key found.".to_string()))
            }
        };

        let prompt = recommendation_prompt(series.ticker(), change_pct);
        let text = generator.generate(&prompt).await.map_err(|e| {
            warn!("{} failed: {:#}", generator.name(), e);
            Error::Upstream(e.to_string())
        })?;

        Ok(Recommendation {
            ticker: series.ticker().to_string(),
            change_pct,
            text,
        })
    }
}

pub fn recommendation_prompt(ticker: &str, change_pct: Decimal) -> String {
    format!(
        "Give Buy/Hold/Sell recommendation for {}. Recent change: {:.2}%.",
        ticker, change_pct
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MockMarketSource;
    use crate::types::bar::fixtures::daily_bars;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn market(closes: Vec<f64>) -> MarketData {
        let mut mock = MockMarketSource::new();
        mock.expect_fetch_bars()
            .returning(move |_, _, _| Ok(daily_bars(&closes)));
        MarketData::new(Arc::new(mock))
    }

    #[test]
    fn test_prompt_format() {
        assert_eq!(
            recommendation_prompt("AAPL", dec!(1.23456)),
            "Give Buy/Hold/Sell recommendation for AAPL. Recent change: 1.23%."
        );
    }

    #[test]
    fn test_from_settings_prefers_groq() {
        let settings = AdvisorSettings {
            groq_api_key: Some("gsk".to_string()),
            openai_api_key: Some("sk".to_string()),
            ..AdvisorSettings::default()
        };
        match Advisor::from_settings(&settings) {
            Advisor::Available(g) => assert_eq!(g.name(), "llama-3.1-8b-instant"),
            Advisor::Unavailable => panic!("expected an advisor"),
        }

        let openai_only = AdvisorSettings {
            openai_api_key: Some("sk".to_string()),
            ..AdvisorSettings::default()
        };
        match Advisor::from_settings(&openai_only) {
            Advisor::Available(g) => assert_eq!(g.name(), "gpt-3.5-turbo"),
            Advisor::Unavailable => panic!("expected an advisor"),
        }

        let blank = AdvisorSettings {
            groq_api_key: Some("  ".to_string()),
            ..AdvisorSettings::default()
        };
        assert!(!Advisor::from_settings(&blank).is_available());
    }

    #[tokio::test]
    async fn test_recommend_sends_prompt() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .withf(|p| p == "Give Buy/Hold/Sell recommendation for TSLA. Recent change: 5.00%.")
            .times(1)
            .returning(|_| Ok("Hold".to_string()));
        let advisor = Advisor::Available(Box::new(generator));

        let rec = advisor
            .recommend(&market(vec![90.0, 200.0, 210.0]), "tsla")
            .await
            .unwrap();
        assert_eq!(rec.ticker, "TSLA");
        assert_eq!(rec.change_pct, dec!(5));
        assert_eq!(rec.text, "Hold");
    }

    #[tokio::test]
    async fn test_recommend_without_key() {
        let err = Advisor::Unavailable
            .recommend(&market(vec![100.0, 101.0]), "AAPL")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable(_)));
        assert_eq!(err.user_message(), "No AI API key found.");
    }

    #[tokio::test]
    async fn test_recommend_no_data() {
        let mut generator = MockTextGenerator::new();
        generator.expect_generate().never();
        let advisor = Advisor::Available(Box::new(generator));

        let result = advisor.recommend(&market(Vec::new()), "ZZZZ").await;
        assert!(matches!(result, Err(Error::NoData(_))));
    }

    #[tokio::test]
    async fn test_generator_failure_is_upstream() {
        let mut generator = MockTextGenerator::new();
        generator.expect_name().return_const("mock".to_string());
        generator
            .expect_generate()
            .returning(|_| Err(anyhow!("Status 401 Unauthorized")));
        let advisor = Advisor::Available(Box::new(generator));

        let result = advisor.recommend(&market(vec![100.0, 101.0]), "AAPL").await;
        assert!(matches!(result, Err(Error::Upstream(_))));
    }

    #[test]
    fn test_completion_text() {
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": " Buy \n"}}]
        });
        assert_eq!(completion_text(&body).unwrap(), "Buy");
        assert!(completion_text(&serde_json::json!({"choices": []})).is_err());
    }
}
