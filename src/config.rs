use crate::prelude::*;
use crate::subject::lock;

use serde::Deserialize;
use serde_with::serde_as;
use serde_yaml;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub bus: Bus,

    #[serde(default = "Config::default_polling")]
    pub polling: Polling,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    /// Optional path to append JSON-lines snapshots of the mobile values to
    pub snapshot_file: Option<String>,
}

// Bus {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Bus {
    pub url: String,

    #[serde(default = "Config::default_bus_timeout_ms")]
    pub timeout_ms: u64,
}

impl Bus {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
} // }}}

// Polling {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Polling {
    #[serde(default = "Config::default_interval_ms")]
    pub device_interval_ms: u64,

    #[serde(default = "Config::default_interval_ms")]
    pub state_interval_ms: u64,
}

impl Polling {
    pub fn device_interval(&self) -> Duration {
        Duration::from_millis(self.device_interval_ms)
    }

    pub fn state_interval(&self) -> Duration {
        Duration::from_millis(self.state_interval_ms)
    }
}

impl Default for Polling {
    fn default() -> Self {
        Config::default_polling()
    }
} // }}}

pub struct ConfigWrapper {
    config: Arc<Mutex<Config>>,
}

impl Clone for ConfigWrapper {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
        }
    }
}

impl ConfigWrapper {
    pub fn new(file: String) -> Result<Self> {
        let config = Config::new(file)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
        }
    }

    pub fn bus(&self) -> Bus {
        lock(&self.config).bus.clone()
    }

    pub fn polling(&self) -> Polling {
        lock(&self.config).polling.clone()
    }

    pub fn set_polling(&self, new: Polling) {
        lock(&self.config).polling = new;
    }

    pub fn loglevel(&self) -> String {
        lock(&self.config).loglevel.clone()
    }

    pub fn snapshot_file(&self) -> Option<String> {
        lock(&self.config).snapshot_file.clone()
    }
}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        info!("Reading configuration from {}", file);
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("config.rs:error reading {}: {}", file, err))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;

        info!("Configuration loaded successfully:");
        info!("  Bus: {} (timeout {}ms)", config.bus.url, config.bus.timeout_ms);
        info!(
            "  Polling: devices every {}ms, state every {}ms",
            config.polling.device_interval_ms, config.polling.state_interval_ms
        );
        if let Some(file) = &config.snapshot_file {
            info!("  Snapshot file: {}", file);
        }
        info!("  Log Level: {}", config.loglevel);

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.bus.url)
            .map_err(|e| anyhow!("config.rs:Invalid bus URL: {}", e))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("bus.url must be http or https, got {}", url.scheme());
        }
        if self.bus.timeout_ms == 0 {
            bail!("bus.timeout_ms must be greater than 0");
        }
        if self.polling.device_interval_ms == 0 {
            bail!("polling.device_interval_ms must be greater than 0");
        }
        if self.polling.state_interval_ms == 0 {
            bail!("polling.state_interval_ms must be greater than 0");
        }
        if let Some(file) = &self.snapshot_file {
            if file.is_empty() {
                bail!("snapshot_file cannot be empty");
            }
        }

        Ok(())
    }

    fn default_polling() -> Polling {
        Polling {
            device_interval_ms: Self::default_interval_ms(),
            state_interval_ms: Self::default_interval_ms(),
        }
    }

    fn default_interval_ms() -> u64 {
        1000
    }

    fn default_bus_timeout_ms() -> u64 {
        5000
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }
}
