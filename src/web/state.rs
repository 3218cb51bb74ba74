use std::sync::Arc;

use crate::advisor::Advisor;
use crate::auth::{CredentialStore, SessionRegistry};
use crate::error::Result;
use crate::market::{MarketData, MarketSource};
use crate::ml::Forecaster;
use crate::settings::AppSettings;

/// Combined application state for the web server
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<AppSettings>,
    pub market: MarketData,
    pub forecaster: Forecaster,
    pub store: CredentialStore,
    pub sessions: SessionRegistry,
    pub advisor: Arc<Advisor>,
}

impl AppState {
    pub fn new(settings: AppSettings, source: Arc<dyn MarketSource>, advisor: Advisor) -> Result<Self> {
        let market = MarketData::new(source);
        let forecaster = Forecaster::new(
            market.clone(),
            settings.forecast.clone(),
            settings.market_data.forecast_period,
        );
        let store = CredentialStore::new(&settings.database.path)?;

        Ok(Self {
            settings: Arc::new(settings),
            market,
            forecaster,
            store,
            sessions: SessionRegistry::new(),
            advisor: Arc::new(advisor),
        })
    }
}
