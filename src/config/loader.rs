//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::MintConfig;
use crate::config::validation::{validate_config, ValidationError};

pub const RPC_HOST_ENV_VAR: &str = "CANDY_RPC_HOST";
pub const WS_HOST_ENV_VAR: &str = "CANDY_WS_HOST";
pub const PROGRAM_ID_ENV_VAR: &str = "CANDY_MACHINE_PROGRAM_ID";
pub const CANDY_MACHINE_ID_ENV_VAR: &str = "CANDY_MACHINE_ID";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, apply environment overrides and validate a TOML file.
pub fn load_config(path: &Path) -> Result<MintConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Same as [`load_config`] for in-memory TOML.
pub fn load_config_from_str(content: &str) -> Result<MintConfig, ConfigError> {
    let mut config: MintConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load from `path` when given, otherwise start from defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<MintConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => load_config_from_str(""),
    }
}

/// Overlay environment values on top of file values.
///
/// `lookup` abstracts the environment so overrides can be tested without
/// mutating process state.
pub fn apply_env_overrides<F>(config: &mut MintConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(host) = non_empty(RPC_HOST_ENV_VAR) {
        config.ledger.rpc_url = host;
    }
    if let Some(host) = non_empty(WS_HOST_ENV_VAR) {
        config.ledger.ws_url = Some(host);
    }
    if let Some(id) = non_empty(PROGRAM_ID_ENV_VAR) {
        config.candy_machine.program_id = id;
    }
    if let Some(id) = non_empty(CANDY_MACHINE_ID_ENV_VAR) {
        config.candy_machine.candy_machine_id = id;
    }
}
