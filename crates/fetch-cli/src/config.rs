//! TOML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```toml
//! [defaults]
//! timeout_ms = 10000
//! retry_delay_ms = 1000
//! max_retry = 3
//! max_retry_delay_ms = 64000
//! ```

use std::path::Path;

use serde::Deserialize;

use fetch_core::LoadConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_max_retry")]
    pub max_retry: u32,

    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry: default_max_retry(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_max_retry() -> u32 {
    3
}

fn default_max_retry_delay_ms() -> u64 {
    64_000
}

impl DefaultsConfig {
    pub fn to_load_config(&self) -> LoadConfig {
        LoadConfig::default()
            .with_timeout(self.timeout_ms)
            .with_retry_delay(self.retry_delay_ms)
            .with_max_retry(self.max_retry)
            .with_max_retry_delay(self.max_retry_delay_ms)
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        let d = &self.defaults;
        if d.timeout_ms == 0 {
            return Err("timeout_ms must be greater than zero".into());
        }
        if d.retry_delay_ms == 0 {
            return Err("retry_delay_ms must be greater than zero".into());
        }
        if d.max_retry_delay_ms < d.retry_delay_ms {
            return Err(format!(
                "max_retry_delay_ms ({}) must not be below retry_delay_ms ({})",
                d.max_retry_delay_ms, d.retry_delay_ms
            ));
        }
        Ok(())
    }
}
