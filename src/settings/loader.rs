use anyhow::{anyhow, Result};
use std::path::Path;
use tracing::{debug, info};

use super::AppSettings;

pub const ENV_PREFIX: &str = "STOCKVIZ";

/// Build settings from defaults, an optional TOML file and `STOCKVIZ__*`
/// environment variables (in increasing priority). A `.env` file in the
/// working directory is loaded first.
pub fn load(path: &str) -> Result<AppSettings> {
    match dotenvy::dotenv() {
        Ok(env_path) => info!("Loaded environment from {}", env_path.display()),
        Err(e) => debug!("No .env file loaded: {}", e),
    }

    let file = Path::new(path);
    if file.exists() {
        info!("Loading configuration from {}", path);
    } else {
        debug!("Configuration file {} not found, using defaults", path);
    }

    let layered = ::config::Config::builder()
        .add_source(::config::Config::try_from(&AppSettings::default())?)
        .add_source(::config::File::from(file).required(false))
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let mut settings: AppSettings = layered.try_deserialize()?;
    apply_provider_keys(&mut settings);

    settings
        .validate()
        .map_err(|errors| anyhow!("invalid configuration: {}", errors.join(", ")))?;

    Ok(settings)
}

/// Provider keys are also honoured under their conventional variable names.
fn apply_provider_keys(settings: &mut AppSettings) {
    if settings.advisor.groq_api_key.is_none() {
        settings.advisor.groq_api_key = non_empty_env("GROQ_API_KEY");
    }
    if settings.advisor.openai_api_key.is_none() {
        settings.advisor.openai_api_key = non_empty_env("OPENAI_API_KEY");
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_reads_toml_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stockviz.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[server]\nport = 9000\n\n[forecast]\nwindow = 30\nepochs = 3").unwrap();

        let settings = load(path.to_str().unwrap()).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.forecast.window, 30);
        assert_eq!(settings.forecast.epochs, 3);
        // Untouched sections keep their defaults
        assert_eq!(settings.indicators.ema_span, 20);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        let settings = load(path.to_str().unwrap()).unwrap();
        assert_eq!(settings.database.path, "users.db");
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[forecast]\nwindow = 0\n").unwrap();

        let err = load(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("forecast.window"));
    }
}
