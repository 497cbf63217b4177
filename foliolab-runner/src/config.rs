//! Engine configuration — one TOML file, every section optional.
//!
//! ```toml
//! [costs]
//! flat_fee = 1.0
//! commission_pct = 0.1
//!
//! [taxes]
//! short_term_rate = 30.0
//! long_term_rate = 15.0
//! long_term_days = 365
//!
//! [patterns]
//! panic_loss_pct = 10.0
//! quick_sell_days = 7
//!
//! [rebalance]
//! strategy = "tax_aware"
//! min_trade_size = 25.0
//!
//! [store]
//! max_snapshots = 50
//! max_age_days = 90
//!
//! [cache]
//! capacity = 64
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use foliolab_core::costs::{CostModel, TaxRates};
use foliolab_core::orders::RebalanceOptions;
use foliolab_core::patterns::PatternDetectionConfig;
use foliolab_core::plan::PlanSettings;
use foliolab_core::ConfigurationError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid [{section}] section: {source}")]
    Invalid {
        section: &'static str,
        source: ConfigurationError,
    },
}

/// Retention rules for the snapshot store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Snapshots kept per key; the oldest are evicted first.
    pub max_snapshots: usize,
    /// Snapshots older than this are evicted on insert. 0 disables age eviction.
    pub max_age_days: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_snapshots: 100,
            max_age_days: 365,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of memoized plans. 0 disables caching.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 32 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub costs: CostModel,
    pub taxes: TaxRates,
    pub patterns: PatternDetectionConfig,
    pub rebalance: RebalanceOptions,
    pub store: StoreConfig,
    pub cache: CacheConfig,
}

impl EngineConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.costs.validate().map_err(invalid("costs"))?;
        self.taxes.validate().map_err(invalid("taxes"))?;
        self.patterns.validate().map_err(invalid("patterns"))?;
        self.rebalance.validate().map_err(invalid("rebalance"))?;
        if self.store.max_snapshots == 0 {
            return Err(ConfigError::Invalid {
                section: "store",
                source: ConfigurationError::InvalidOption {
                    name: "max_snapshots",
                    reason: "must keep at least one snapshot".into(),
                },
            });
        }
        Ok(())
    }

    /// The subset of the config that shapes a rebalancing plan.
    pub fn plan_settings(&self) -> PlanSettings {
        PlanSettings {
            options: self.rebalance.clone(),
            costs: self.costs,
            taxes: self.taxes,
        }
    }
}

fn invalid(section: &'static str) -> impl FnOnce(ConfigurationError) -> ConfigError {
    move |source| ConfigError::Invalid { section, source }
}
