mod advisor;
mod alerts;
mod auth;
mod error;
mod indicators;
mod market;
mod ml;
mod settings;
mod types;
mod web;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use advisor::Advisor;
use alerts::check_price_alert;
use indicators::IndicatorFrame;
use market::YahooClient;
use ml::ForecastParams;
use settings::AppSettings;
use types::{HistoryRange, Period};
use web::{start_dashboard_server, AppState};

#[derive(Parser)]
#[command(name = "stockviz")]
#[command(version)]
#[command(about = "Stock price dashboard with moving averages, LSTM forecasts and price alerts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "stockviz.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web dashboard
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show price history with moving averages
    History {
        ticker: String,
        /// Look-back period (1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max)
        #[arg(short, long, default_value = "1mo")]
        period: String,
        /// Start date (YYYY-MM-DD), used together with --end
        #[arg(long)]
        start: Option<NaiveDate>,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Show the latest price
    Quote { ticker: String },
    /// Train a fresh model and forecast the next closes
    Predict {
        ticker: String,
        /// Sliding window length
        #[arg(short, long)]
        window: Option<i64>,
        /// Days to forecast
        #[arg(short, long)]
        days: Option<i64>,
        /// Training epochs
        #[arg(short, long)]
        epochs: Option<i64>,
        /// Print the historical closes before the forecast
        #[arg(long)]
        include_history: bool,
    },
    /// Check the latest price against a threshold
    Alert { ticker: String, threshold: String },
    /// Ask the configured AI provider for a Buy/Hold/Sell call
    Recommend { ticker: String },
    /// Register a user in the credential store
    AddUser { username: String, password: String },
    /// Print the effective configuration with API keys masked
    Settings,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = settings::load(&cli.config)?;
    let state = build_state(settings)?;

    match cli.command {
        Commands::Serve { port } => serve(state, port).await?,
        Commands::History { ticker, period, start, end } => {
            show_history(&state, &ticker, &period, start, end).await
        }
        Commands::Quote { ticker } => show_quote(&state, &ticker).await,
        Commands::Predict { ticker, window, days, epochs, include_history } => {
            run_forecast(&state, &ticker, window, days, epochs, include_history).await
        }
        Commands::Alert { ticker, threshold } => {
            let outcome = check_price_alert(&state.market, &ticker, &threshold).await;
            println!("{}", outcome);
        }
        Commands::Recommend { ticker } => {
            match state.advisor.recommend(&state.market, &ticker).await {
                Ok(rec) => println!("{} ({:+.2}%): {}", rec.ticker, rec.change_pct, rec.text),
                Err(e) => error!("{}", e.user_message()),
            }
        }
        Commands::AddUser { username, password } => {
            state.store.init().await?;
            match state.store.register(&username, &password).await {
                Ok(user) => println!("Created user {} (id {})", user.username, user.id),
                Err(e) => error!("{}", e.user_message()),
            }
        }
        Commands::Settings => print!("{}", state.settings.to_redacted_toml()?),
    }

    Ok(())
}

fn build_state(settings: AppSettings) -> Result<AppState> {
    let source = Arc::new(YahooClient::new(&settings.market_data));
    let advisor = Advisor::from_settings(&settings.advisor);
    Ok(AppState::new(settings, source, advisor)?)
}

async fn serve(mut state: AppState, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        let mut settings = (*state.settings).clone();
        settings.server.port = port;
        state.settings = Arc::new(settings);
    }

    info!("Stockviz v{}", env!("CARGO_PKG_VERSION"));
    info!("Credential store: {}", state.store.path());
    state.store.init().await?;

    start_dashboard_server(state).await
}

async fn show_history(
    state: &AppState,
    ticker: &str,
    period: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) {
    let range = match (start, end) {
        (Some(start), Some(end)) => HistoryRange::between(start, end),
        _ => period.parse::<Period>().map(HistoryRange::from),
    };
    let range = match range {
        Ok(r) => r,
        Err(e) => {
            error!("{}", e.user_message());
            return;
        }
    };

    let series = match state.market.history(ticker, range).await {
        Some(s) => s,
        None => {
            error!("No data found.");
            return;
        }
    };
    let frame = IndicatorFrame::compute(&series, &state.settings.indicators);

    println!("\n=== {} ({}) ===", frame.ticker, range);
    let names: Vec<&str> = frame.columns.iter().map(|c| c.name.as_str()).collect();
    println!("{:<12} {:>12} {}", "Date", "Close", names.iter().map(|n| format!("{:>12}", n)).collect::<String>());

    for (i, ts) in frame.timestamps.iter().enumerate() {
        let columns: String = frame
            .columns
            .iter()
            .map(|c| match c.values[i] {
                Some(v) => format!("{:>12.2}", v),
                None => format!("{:>12}", "-"),
            })
            .collect();
        println!("{:<12} {:>12.2} {}", ts.format("%Y-%m-%d"), frame.close[i], columns);
    }
}

async fn show_quote(state: &AppState, ticker: &str) {
    match state.market.current_price(ticker).await {
        Some(price) => println!("{}: ${:.2}", ticker.trim().to_uppercase(), price),
        None => error!("Could not fetch price."),
    }
}

async fn run_forecast(
    state: &AppState,
    ticker: &str,
    window: Option<i64>,
    days: Option<i64>,
    epochs: Option<i64>,
    include_history: bool,
) {
    let defaults = state.forecaster.settings();
    let params = ForecastParams::new(
        window.unwrap_or(defaults.window as i64),
        days.unwrap_or(defaults.days as i64),
        epochs.unwrap_or(defaults.epochs as i64),
        include_history,
        defaults,
    );

    let result = match params {
        Ok(params) => state.forecaster.forecast(ticker, params).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(forecast) => {
            println!(
                "\n=== {} forecast (window {}, {} epochs, loss {:.6}) ===",
                forecast.ticker, forecast.window, forecast.epochs, forecast.final_loss
            );
            // History closes first when requested, then one row per forecast day
            let series = forecast.series();
            let history_len = series.len() - forecast.predictions.len();
            for (i, price) in series.iter().enumerate() {
                match i.checked_sub(history_len) {
                    Some(day) => println!("Day {}: ${:.2}", day + 1, price),
                    None => println!("{:.2}", price),
                }
            }
        }
        Err(e) => error!("{}", e.user_message()),
    }
}
