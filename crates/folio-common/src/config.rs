//! Folio Config - Runtime Configuration
//!
//! Configuration for running the books catalog against the in-memory store.
//! Supports loading from TOML files and programmatic construction; every
//! field has a default so partial files are accepted.
//!
//! @version 0.1.0
//! @author Folio Development Team

use crate::error::{FolioError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// =============================================================================
// Folio Configuration
// =============================================================================

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolioConfig {
    /// Name of the collection the catalog runs against.
    pub collection: String,
    /// Seed the collection with the bundled sample books.
    pub seed_sample_data: bool,
    /// Validate inserted and updated books against the book schema.
    pub validate_schema: bool,
    /// Explain mode used when a definition does not name one.
    pub default_explain_mode: String,
    /// JSON catalog file replacing the built-in books catalog.
    pub catalog_path: Option<PathBuf>,
    /// JSON array of books loaded into the collection.
    pub data_path: Option<PathBuf>,
    /// Default tracing filter, overridden by RUST_LOG.
    pub log_filter: String,
}

impl Default for FolioConfig {
    fn default() -> Self {
        Self {
            collection: "books".to_string(),
            seed_sample_data: true,
            validate_schema: true,
            default_explain_mode: "executionStats".to_string(),
            catalog_path: None,
            data_path: None,
            log_filter: "info".to_string(),
        }
    }
}

impl FolioConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| FolioError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| FolioError::Serialization(e.to_string()))
    }

    /// Check field values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.collection.trim().is_empty() {
            return Err(FolioError::Configuration(
                "collection name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_catalog_path(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.catalog_path = path;
        }
        self
    }

    pub fn with_data_path(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.data_path = path;
        }
        self
    }

    pub fn with_seed(mut self, seed: bool) -> Self {
        self.seed_sample_data = seed;
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
