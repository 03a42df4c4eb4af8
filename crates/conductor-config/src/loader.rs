//! Configuration loader.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::schema::ConductorConfig;

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<ConductorConfig, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a file, falling back to defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<ConductorConfig, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(ConductorConfig::default()),
            other => other,
        }
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<ConductorConfig, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let config: ConductorConfig = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml_string(config: &ConductorConfig) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(config)?)
    }

    /// Resolve the data directory, expanding `~`.
    pub fn data_dir(config: &ConductorConfig) -> PathBuf {
        PathBuf::from(Self::expand_path(&config.general.data_dir))
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::InvalidValue {
            field: "env placeholder".to_string(),
            message: e.to_string(),
        })?;

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.conductor`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}
