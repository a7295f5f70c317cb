//! Configuration persistence for the scheduler.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::scheduler::{
    Algorithm, FibonacciSequence, LeitnerSystem, Strategy, DEFAULT_FIBONACCI_MASTERY,
    DEFAULT_LEITNER_INTERVALS,
};

/// Scheduler configuration that persists between sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// The strategy new decks are built with.
    #[serde(default)]
    pub algorithm: Algorithm,

    #[serde(default)]
    pub leitner: LeitnerConfig,

    #[serde(default)]
    pub fibonacci: FibonacciConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeitnerConfig {
    /// Interval in days for each box, box 0 first.
    #[serde(default = "default_leitner_intervals")]
    pub intervals_days: Vec<u32>,
}

fn default_leitner_intervals() -> Vec<u32> {
    DEFAULT_LEITNER_INTERVALS.to_vec()
}

impl Default for LeitnerConfig {
    fn default() -> Self {
        Self {
            intervals_days: default_leitner_intervals(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibonacciConfig {
    /// Step a wrong answer drops back to.
    #[serde(default)]
    pub floor: u32,
    /// Step at which a card counts as mastered.
    #[serde(default = "default_mastery_level")]
    pub mastery_level: u32,
}

fn default_mastery_level() -> u32 {
    DEFAULT_FIBONACCI_MASTERY
}

impl Default for FibonacciConfig {
    fn default() -> Self {
        Self {
            floor: 0,
            mastery_level: default_mastery_level(),
        }
    }
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("srl")
            .join("config.toml")
    }

    /// Load config from the default location, returning default if the file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Check that the configured tables describe a usable strategy.
    pub fn validate(&self) -> crate::Result<()> {
        LeitnerSystem::new(self.leitner.intervals_days.clone())?;
        FibonacciSequence::new(self.fibonacci.floor, self.fibonacci.mastery_level)?;
        Ok(())
    }

    /// Build the strategy selected by `algorithm` with the configured parameters.
    pub fn strategy(&self) -> crate::Result<Arc<dyn Strategy>> {
        Ok(match self.algorithm {
            Algorithm::LeitnerSystem => {
                Arc::new(LeitnerSystem::new(self.leitner.intervals_days.clone())?)
            }
            Algorithm::FibonacciSequence => Arc::new(FibonacciSequence::new(
                self.fibonacci.floor,
                self.fibonacci.mastery_level,
            )?),
        })
    }
}
