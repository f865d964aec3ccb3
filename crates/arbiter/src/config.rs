use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use arbiter_policy::compile::{DEFAULT_MAX_POLICY_SET_DEPTH, DEFAULT_MAX_VARIABLE_REFERENCE_DEPTH};
use arbiter_policy::{CompilerOptions, StandardEnvAttributeSource, DEFAULT_MAX_DOCUMENT_BYTES};

use crate::error::{RootError, RootResult};

/// Limits applied while loading and compiling a policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Longest allowed chain of variable references.
    #[serde(default = "default_max_variable_reference_depth")]
    pub max_variable_reference_depth: usize,

    /// Maximum nesting of policy sets in a loaded document.
    #[serde(default = "default_max_policy_set_depth")]
    pub max_policy_set_depth: usize,

    #[serde(default = "default_max_policy_document_bytes")]
    pub max_policy_document_bytes: usize,
}

fn default_max_variable_reference_depth() -> usize {
    DEFAULT_MAX_VARIABLE_REFERENCE_DEPTH
}

fn default_max_policy_set_depth() -> usize {
    DEFAULT_MAX_POLICY_SET_DEPTH
}

fn default_max_policy_document_bytes() -> usize {
    DEFAULT_MAX_DOCUMENT_BYTES
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_variable_reference_depth: default_max_variable_reference_depth(),
            max_policy_set_depth: default_max_policy_set_depth(),
            max_policy_document_bytes: default_max_policy_document_bytes(),
        }
    }
}

/// How request attributes are looked up during evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributesConfig {
    /// When true, a designator without issuer only sees request attributes
    /// without issuer.
    #[serde(default)]
    pub strict_attribute_issuer_match: bool,

    /// Source of current-time, current-date and current-dateTime.
    #[serde(default)]
    pub standard_env_attributes: StandardEnvAttributeSource,
}

/// Top-level configuration of a policy decision point.
///
/// Loaded from a TOML file; every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdpConfig {
    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub attributes: AttributesConfig,
}

impl PdpConfig {
    /// Load configuration from a TOML file. If the file does not exist,
    /// returns a default configuration.
    pub fn load(path: &Path) -> RootResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(RootError::Io)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(contents: &str) -> RootResult<Self> {
        let config: PdpConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> RootResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RootError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(RootError::Io)?;
        }
        std::fs::write(path, contents).map_err(RootError::Io)?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> RootResult<()> {
        if self.limits.max_variable_reference_depth == 0 {
            return Err(RootError::Config(
                "max_variable_reference_depth must be >= 1".into(),
            ));
        }
        if self.limits.max_policy_set_depth == 0 {
            return Err(RootError::Config("max_policy_set_depth must be >= 1".into()));
        }
        if self.limits.max_policy_document_bytes == 0 {
            return Err(RootError::Config(
                "max_policy_document_bytes must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn compiler_options(&self) -> CompilerOptions {
        CompilerOptions {
            max_variable_reference_depth: self.limits.max_variable_reference_depth,
            max_policy_set_depth: self.limits.max_policy_set_depth,
        }
    }

    /// Return the path to the default config file location.
    pub fn default_config_path() -> PathBuf {
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".arbiter/config.toml"))
            .unwrap_or_else(|_| PathBuf::from(".arbiter/config.toml"))
    }
}
