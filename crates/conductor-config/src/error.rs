//! Configuration errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// A `${VAR}` placeholder names a variable missing from the environment.
    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_errors_convert() {
        let parse_err = toml::from_str::<toml::Value>("[retry\npoll = ").unwrap_err();
        let err = ConfigError::from(parse_err);
        assert!(matches!(err, ConfigError::TomlParse(_)));
        assert!(err.to_string().starts_with("TOML parse error"));
    }

    #[test]
    fn test_env_var_message_names_variable() {
        let err = ConfigError::EnvVarNotSet("CONDUCTOR_WEBHOOK_SECRET".to_string());
        assert_eq!(
            err.to_string(),
            "Environment variable not set: CONDUCTOR_WEBHOOK_SECRET"
        );
    }
}
