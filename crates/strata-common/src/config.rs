//! Strata Config - Configuration Structures
//!
//! Table schema configuration: the resolution and retention of each table
//! and the textual expressions that define its fields. Supports loading
//! from TOML files and programmatic construction.
//!
//! Example:
//!
//! ```toml
//! [[tables]]
//! name = "requests"
//! resolution = "1m"
//! retention = "24h"
//!
//! [[tables.fields]]
//! name = "total"
//! expression = 'SUM("count")'
//! ```
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::utils::serde_duration;
use crate::{Result, StrataError};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

// =============================================================================
// Field Configuration
// =============================================================================

/// A named field defined by a textual expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    pub expression: String,
}

impl FieldConfig {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

// =============================================================================
// Table Configuration
// =============================================================================

/// Configuration for a single time-bucketed table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    #[serde(with = "serde_duration")]
    pub resolution: Duration,
    #[serde(with = "serde_duration")]
    pub retention: Duration,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

impl TableConfig {
    pub fn new(name: impl Into<String>, resolution: Duration, retention: Duration) -> Self {
        Self {
            name: name.into(),
            resolution,
            retention,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.fields.push(FieldConfig::new(name, expression));
        self
    }

    /// Check structural constraints that do not require parsing expressions.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StrataError::Configuration("table name is empty".to_string()));
        }
        if self.resolution <= Duration::zero() {
            return Err(StrataError::Configuration(format!(
                "table '{}': resolution must be positive",
                self.name
            )));
        }
        if self.retention < self.resolution {
            return Err(StrataError::Configuration(format!(
                "table '{}': retention must cover at least one resolution period",
                self.name
            )));
        }
        if self.fields.is_empty() {
            return Err(StrataError::Configuration(format!(
                "table '{}': no fields defined",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(StrataError::Configuration(format!(
                    "table '{}': duplicate field '{}'",
                    self.name, field.name
                )));
            }
        }
        Ok(())
    }

    /// Number of buckets a sequence of this table may retain.
    pub fn max_periods(&self) -> i64 {
        match (
            self.retention.num_nanoseconds(),
            self.resolution.num_nanoseconds(),
        ) {
            (Some(retention), Some(resolution)) if resolution > 0 => retention / resolution,
            _ => 0,
        }
    }
}

// =============================================================================
// Schema Configuration
// =============================================================================

/// Top-level schema configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SchemaConfig {
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

impl SchemaConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SchemaConfig =
            toml::from_str(content).map_err(|e| StrataError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for table in &self.tables {
            table.validate()?;
            if !seen.insert(table.name.as_str()) {
                return Err(StrataError::Configuration(format!(
                    "duplicate table '{}'",
                    table.name
                )));
            }
        }
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&TableConfig> {
        self.tables.iter().find(|t| t.name == name)
    }
}

// =============================================================================
// Tests
// =============================================================================
