use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Full engine configuration: model shape, EM fitting, numeric guards and signal thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub model: ModelSettings,
    pub fitting: FittingSettings,
    pub numerics: NumericSettings,
    pub signal: SignalSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: ModelSettings::default(),
            fitting: FittingSettings::default(),
            numerics: NumericSettings::default(),
            signal: SignalSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file, then apply `REGIME_HMM__SECTION__KEY` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix("REGIME_HMM")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read engine config from {}", path.display()))?;

        let engine_config: EngineConfig = settings
            .try_deserialize()
            .context("Failed to deserialize engine config")?;

        engine_config
            .validate()
            .map_err(|errors| anyhow::anyhow!("Invalid engine config: {}", errors.join(", ")))?;

        Ok(engine_config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let engine_config: EngineConfig =
            toml::from_str(contents).context("Failed to parse engine config TOML")?;

        engine_config
            .validate()
            .map_err(|errors| anyhow::anyhow!("Invalid engine config: {}", errors.join(", ")))?;

        Ok(engine_config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize engine config")
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.model.num_states == 0 {
            errors.push("num_states must be > 0".to_string());
        }

        if self.fitting.max_iterations == 0 {
            errors.push("max_iterations must be > 0".to_string());
        }
        if !(self.fitting.tolerance > 0.0) {
            errors.push("tolerance must be > 0".to_string());
        }

        if !(self.numerics.min_std > 0.0) {
            errors.push("min_std must be > 0".to_string());
        }
        if !(self.numerics.emission_floor >= 0.0 && self.numerics.emission_floor < 1e-3) {
            errors.push("emission_floor must be in [0, 0.001)".to_string());
        }

        if self.signal.sell_threshold > self.signal.buy_threshold {
            errors.push("sell_threshold must be <= buy_threshold".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub num_states: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self { num_states: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FittingSettings {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for FittingSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericSettings {
    /// Lower bound for a fitted per-state return std
    pub min_std: f64,
    /// Lower bound for a regenerated emission probability before row renormalisation
    pub emission_floor: f64,
}

impl Default for NumericSettings {
    fn default() -> Self {
        Self {
            min_std: 1e-4,
            emission_floor: 1e-12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalSettings {
    pub buy_threshold: f64,
    pub sell_threshold: f64,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            buy_threshold: 0.005,
            sell_threshold: -0.005,
        }
    }
}
