//! Loading and writing the files that sit around a run.

use camino::Utf8Path;
use miette::{IntoDiagnostic, Result, WrapErr};
use resguard_config::ResguardConfig;
use std::collections::BTreeMap;
use std::fs;

use crate::errors::CliError;

/// Loads a resguard config, choosing the format from the file extension.
pub fn load_config(config_path: &Utf8Path) -> Result<ResguardConfig> {
    match config_path.extension() {
        Some("json") => {
            let content = fs::read(config_path)
                .into_diagnostic()
                .with_context(|| format!("Failed to read config file: {}", config_path))?;
            ResguardConfig::from_json_slice(&content)
                .map_err(|e| CliError::config_parse_error(e).into())
        }
        Some("toml") => {
            let content = fs::read_to_string(config_path)
                .into_diagnostic()
                .with_context(|| format!("Failed to read config file: {}", config_path))?;
            ResguardConfig::from_toml_str(&content)
                .map_err(|e| CliError::config_parse_error(e).into())
        }
        _ => Err(CliError::unsupported_config_format(config_path.to_path_buf()).into()),
    }
}

/// Reads a compress table: a JSON object of archive paths to their compressed flag.
pub fn read_compress_data(path: &Utf8Path) -> Result<BTreeMap<String, bool>> {
    let content = fs::read(path)
        .into_diagnostic()
        .with_context(|| format!("Failed to read compress data: {}", path))?;
    serde_json::from_slice(&content)
        .into_diagnostic()
        .with_context(|| format!("Failed to parse compress data: {}", path))
}

/// Writes pretty-formatted JSON to the given path.
pub fn write_json_pretty<T: serde::Serialize>(path: &Utf8Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value).into_diagnostic()?;
    fs::write(path, data)
        .into_diagnostic()
        .with_context(|| format!("Failed to write {}", path))
}
