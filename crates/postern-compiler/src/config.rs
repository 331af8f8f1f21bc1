//! Project configuration (`postern.yaml`).
//!
//! Declares where controllers live, which custom resolvers exist, what
//! binding capabilities the hosting server provides, and how schemas are
//! generated. Every field has a default, so an empty file is valid.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default controller prefix: everything up to and including `routes/`.
pub const DEFAULT_PREFIX: &str = r"^(?:.*src/)?routes/?";

/// Errors loading or validating a project configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// `controllers.prefix` is not a valid regex.
    #[error("invalid controllers.prefix regex '{pattern}': {reason}")]
    InvalidPrefix { pattern: String, reason: String },

    /// `schema.default_response` is not a status class or code.
    #[error("invalid schema.default_response '{0}': expected 'default', '2xx'-style class or status code")]
    InvalidStatusClass(String),

    /// A resolver name is not a valid type identifier.
    #[error("invalid resolver name '{0}' in params")]
    InvalidResolverName(String),
}

/// Top-level project configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub controllers: ControllersConfig,
    /// Custom parameter resolvers: type name -> module reference.
    pub params: BTreeMap<String, String>,
    pub capabilities: Capabilities,
    pub schema: SchemaConfig,
    /// Default artifact output path for the CLI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Controller discovery and url derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllersConfig {
    /// Glob patterns used by the CLI to discover controllers.
    pub glob: Vec<String>,
    /// Regex stripped from the start of a controller path before url derivation.
    pub prefix: String,
}

impl Default for ControllersConfig {
    fn default() -> Self {
        Self {
            glob: vec!["src/routes/**/*.rs".to_string(), "routes/**/*.rs".to_string()],
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

/// Binding capabilities available in the hosting server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Capabilities {
    /// Cookie parsing is installed; enables `Cookie` parameters.
    pub cookies: bool,
    /// Websocket support is installed; enables `ws` handlers.
    pub websocket: bool,
}

/// Schema generation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaConfig {
    /// Allow properties not declared on object types.
    pub additional_properties: bool,
    /// Status class the handler's return type is registered under.
    pub default_response: String,
    /// Extra response entries merged into every route, keyed by status class.
    pub responses: BTreeMap<String, serde_json::Value>,
    /// Maximum nesting depth of a route's schemas.
    pub max_depth: usize,
    /// Maximum total properties across a route's schemas.
    pub max_properties: usize,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            additional_properties: false,
            default_response: "default".to_string(),
            responses: BTreeMap::new(),
            max_depth: 32,
            max_properties: 256,
        }
    }
}

impl ProjectConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: ProjectConfig = if content.trim().is_empty() {
            ProjectConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the fields that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.prefix_regex()?;

        if !is_status_key(&self.schema.default_response) {
            return Err(ConfigError::InvalidStatusClass(
                self.schema.default_response.clone(),
            ));
        }
        for key in self.schema.responses.keys() {
            if !is_status_key(key) {
                return Err(ConfigError::InvalidStatusClass(key.clone()));
            }
        }

        for name in self.params.keys() {
            let valid = name
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(ConfigError::InvalidResolverName(name.clone()));
            }
        }
        Ok(())
    }

    /// Compiled `controllers.prefix`.
    pub fn prefix_regex(&self) -> Result<Regex, ConfigError> {
        Regex::new(&self.controllers.prefix).map_err(|e| ConfigError::InvalidPrefix {
            pattern: self.controllers.prefix.clone(),
            reason: e.to_string(),
        })
    }

    /// Names of the declared custom resolvers.
    pub fn resolver_names(&self) -> BTreeSet<String> {
        self.params.keys().cloned().collect()
    }
}

/// `default`, a class like `2xx`, or a concrete status code.
fn is_status_key(key: &str) -> bool {
    if key == "default" {
        return true;
    }
    let bytes = key.as_bytes();
    if bytes.len() != 3 || !(b'1'..=b'5').contains(&bytes[0]) {
        return false;
    }
    let class = bytes[1] == b'x' && bytes[2] == b'x';
    let code = bytes[1].is_ascii_digit() && bytes[2].is_ascii_digit();
    class || code
}
