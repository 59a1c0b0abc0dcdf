//! Configuration for the reconciler

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory of the ledger being reconciled
    pub ledger_data_dir: PathBuf,

    /// Seconds between reconciliation runs
    pub interval_secs: u64,

    /// Expiry watchdog settings
    pub expiry: ExpiryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger_data_dir: PathBuf::from("./data/credit-ledger"),
            interval_secs: 300,
            expiry: ExpiryConfig::default(),
        }
    }
}

/// Expiry watchdog settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryConfig {
    /// Run the watchdog as part of each reconciliation pass
    pub enabled: bool,

    /// Age beyond which a pending reservation counts as orphaned
    pub pending_max_age_secs: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pending_max_age_secs: 3_600,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(dir) = std::env::var("RECONCILER_LEDGER_DATA_DIR") {
            config.ledger_data_dir = PathBuf::from(dir);
        }

        if let Ok(secs) = std::env::var("RECONCILER_INTERVAL_SECS") {
            config.interval_secs = secs
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid interval: {}", e)))?;
        }

        if let Ok(secs) = std::env::var("RECONCILER_PENDING_MAX_AGE_SECS") {
            config.expiry.pending_max_age_secs = secs
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid max age: {}", e)))?;
        }

        Ok(config)
    }
}
