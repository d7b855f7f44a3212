//! Configuration management for Edgeguard
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (EDGEGUARD_* prefix, `__` between nested keys)
//! 2. edgeguard.local.toml (gitignored, local overrides)
//! 3. edgeguard.toml (git-tracked, project config)
//! 4. ~/.config/edgeguard/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main Edgeguard configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeguardConfig {
    pub engine: EngineConfig,
    pub selector: SelectorConfig,
    pub logging: LoggingConfig,
    pub advisor: AdvisorConfig,
}

/// Relationship engine behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How candidate policies are found when an entity's attributes change.
    pub index_strategy: IndexStrategy,
    /// Forward committed service changes to the cache notifier.
    pub invalidate_service_cache: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_strategy: IndexStrategy::Narrowing,
            invalidate_service_cache: true,
        }
    }
}

/// Candidate policy discovery for role attribute changes.
///
/// Both strategies must leave identical link state behind; `FullScan`
/// exists as a reference for differential testing and debugging.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum IndexStrategy {
    /// Look up policies through the inverted attribute index.
    #[default]
    Narrowing,
    /// Re-evaluate every policy of each affected collection.
    FullScan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Maximum number of tokens accepted in one role selector.
    pub max_tokens: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self { max_tokens: 256 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Declarative model file loaded by the CLI.
    pub model: PathBuf,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("edgeguard-model.toml"),
        }
    }
}

impl EdgeguardConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Configuration used by differential tests: every policy is
    /// re-evaluated on every attribute change.
    pub fn full_scan() -> Self {
        Self {
            engine: EngineConfig {
                index_strategy: IndexStrategy::FullScan,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Check values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.selector.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "selector.max_tokens must be at least 1".to_string(),
            ));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "logging.filter must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();

        if self.advisor.model.is_relative() {
            self.advisor.model = base.join(&self.advisor.model);
        }
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
