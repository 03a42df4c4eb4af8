//! `conductor config` subcommands.

use anyhow::{Result, bail};

use conductor_config::{ConductorConfig, ConfigLoader, ConfigValidator};

pub(crate) fn config_validate(config: &ConductorConfig) -> Result<()> {
    let result = ConfigValidator::validate(config)?;

    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("error: {}: {}", error.path, error.message);
    }

    if !result.is_valid() {
        bail!("Configuration has {} error(s)", result.errors.len());
    }
    println!(
        "Configuration is valid ({} warning(s))",
        result.warnings.len()
    );
    Ok(())
}

pub(crate) fn config_show(config: &ConductorConfig) -> Result<()> {
    print!("{}", ConfigLoader::to_toml_string(config)?);
    Ok(())
}
