//! Engine configuration, loadable from TOML
//!
//! ```toml
//! root = "views"
//! debug = true
//!
//! [aliases]
//! mail = "views/mail"
//!
//! [cache]
//! directory = "/tmp/sigil"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::cache::CacheOptions;
use crate::compiler::CompilerOptions;
use crate::template::DEFAULT_EXTENSION;

/// Errors that can occur when loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Cache settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false, every load recompiles and nothing is written
    pub enabled: bool,
    pub directory: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: std::env::temp_dir().join("sigil-cache"),
        }
    }
}

/// Everything needed to build an [`crate::Engine`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory unprefixed template names resolve against
    pub root: PathBuf,
    /// Template file extension, leading dot included
    pub extension: String,
    /// Alias name to directory
    pub aliases: BTreeMap<String, PathBuf>,
    /// Debug mode: runtime includes and source mtime checks
    pub debug: bool,
    pub cache: CacheConfig,
    pub escape_function: String,
    pub serialize_function: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let compiler = CompilerOptions::default();
        Self {
            root: PathBuf::from("."),
            extension: DEFAULT_EXTENSION.to_string(),
            aliases: BTreeMap::new(),
            debug: false,
            cache: CacheConfig::default(),
            escape_function: compiler.escape_function,
            serialize_function: compiler.serialize_function,
        }
    }
}

impl EngineConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_cache_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.cache.directory = directory.into();
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache.enabled = enabled;
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        self.aliases.insert(alias.into(), directory.into());
        self
    }

    pub fn compiler_options(&self) -> CompilerOptions {
        CompilerOptions {
            debug: self.debug,
            escape_function: self.escape_function.clone(),
            serialize_function: self.serialize_function.clone(),
        }
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions::new(&self.cache.directory)
            .with_debug(self.debug)
            .with_enabled(self.cache.enabled)
    }
}
