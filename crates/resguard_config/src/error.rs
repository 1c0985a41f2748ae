use thiserror::Error;

/// Errors that can occur while loading or compiling a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid whitelist pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("invalid whitelist entry '{pattern}': {reason}")]
    InvalidWhitelist { pattern: String, reason: String },
}
