//! Configuration module for trade reconciliation
//!
//! This module defines the configuration structure: input feeds, output
//! document, identifier columns and the rules that derive them.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::keys::RuleFailurePolicy;
use crate::rules::RuleConfig;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/config/trade_recon.yaml";

/// One input feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Environment tag of the physical system (e.g., "efx", "ibdl")
    pub env: String,
    /// Glob pattern of CSV files (e.g., "/data/efx/*.csv")
    pub path: String,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output JSON file
    pub path: PathBuf,
    /// Whether to write to a temporary file first and rename it into place
    #[serde(default = "default_use_temp_file")]
    pub use_temp_file: bool,
}

fn default_use_temp_file() -> bool {
    true
}

/// One source-to-target reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    pub source: FeedConfig,
    pub target: FeedConfig,
    pub output: OutputConfig,
    /// Ordered identifier columns; order defines key layout
    pub id_columns: Vec<String>,
    /// Derivation rule per identifier column (source side)
    pub rules: BTreeMap<String, RuleConfig>,
    /// Source column copied into each record's `timestamp`
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
    /// Behaviour when a rule fails on a source row
    #[serde(default)]
    pub rule_failure: RuleFailurePolicy,
}

fn default_timestamp_field() -> String {
    "datetime".to_string()
}

impl MappingConfig {
    /// Check the mapping is usable before any data is loaded
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.id_columns.is_empty() {
            bail!("Mapping '{}' has no id_columns", name);
        }

        let mut seen = HashSet::new();
        for column in &self.id_columns {
            if !seen.insert(column.as_str()) {
                bail!("Mapping '{}' lists id column '{}' more than once", name, column);
            }
            if !self.rules.contains_key(column) {
                bail!("Mapping '{}' has no rule for id column '{}'", name, column);
            }
        }

        if self.source.env == self.target.env {
            bail!(
                "Mapping '{}' uses the same env tag '{}' for source and target",
                name,
                self.source.env
            );
        }

        Ok(())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Reconciliations by name (e.g., "efx_to_ibdl")
    pub mappings: BTreeMap<String, MappingConfig>,
}

impl Config {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)
            .context("Failed to parse config YAML")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mappings.is_empty() {
            bail!("No mappings configured");
        }
        for (name, mapping) in &self.mappings {
            mapping.validate(name)?;
        }
        Ok(())
    }

    /// Find mapping configuration by name
    pub fn find_mapping(&self, name: &str) -> Option<&MappingConfig> {
        self.mappings.get(name)
    }
}
