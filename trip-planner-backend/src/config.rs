//! Layered server configuration.
//!
//! Built-in defaults, then `config/default` and `config/local` files when present, then
//! `TRIP__SECTION__KEY` environment variables. The plain `PORT`, `API_KEY` and
//! `API_SECRET` variables used by existing deployments override everything else.

use serde::Deserialize;
use std::{env, path::Path};

const CONFIG_DIR: &str = "config";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub amadeus: AmadeusConfig,
    pub data: DataConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AmadeusConfig {
    pub base_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub airports_path: String,
    pub mock_offers_path: String,
}

impl AmadeusConfig {
    /// Client id and secret, only when both are set and non-blank.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let id = self.client_id.as_deref().filter(|s| !s.trim().is_empty())?;
        let secret = self.client_secret.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((id, secret))
    }
}

impl ServerConfig {
    /// Fails when `static_dir` is missing or would publish the configuration
    /// directory, which may hold credentials in `local.toml`.
    pub fn check_static_dir(
        &self,
        config_dir: impl AsRef<Path>,
    ) -> Result<(), config::ConfigError> {
        let root = Path::new(&self.static_dir).canonicalize().map_err(|e| {
            config::ConfigError::Message(format!("static_dir '{}': {}", self.static_dir, e))
        })?;

        if let Ok(config_dir) = config_dir.as_ref().canonicalize() {
            if config_dir.starts_with(&root) {
                return Err(config::ConfigError::Message(format!(
                    "static_dir '{}' would serve {}",
                    self.static_dir,
                    config_dir.display()
                )));
            }
        }

        Ok(())
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config: Config = Self::builder()?
            .add_source(config::File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
            .add_source(config::File::with_name(&format!("{}/local", CONFIG_DIR)).required(false))
            .add_source(config::Environment::with_prefix("TRIP").separator("__"))
            .set_override_option("server.port", env::var("PORT").ok())?
            .set_override_option("amadeus.client_id", env::var("API_KEY").ok())?
            .set_override_option("amadeus.client_secret", env::var("API_SECRET").ok())?
            .build()?
            .try_deserialize()?;

        config.server.check_static_dir(CONFIG_DIR)?;
        Ok(config)
    }

    fn builder(
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.static_dir", "public")?
            .set_default("amadeus.base_url", "https://test.api.amadeus.com")?
            .set_default("amadeus.max_retries", 3)?
            .set_default("amadeus.retry_delay_ms", 250)?
            .set_default("data.airports_path", "JSON/airports.json")?
            .set_default("data.mock_offers_path", "test/MockFlightOffers.csv")
    }
}
