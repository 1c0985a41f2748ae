//! Error types for resource table transcoding.
//!
//! Hard failures are [`ResguardError`] and abort the whole run: binary
//! transcoding cannot resume mid-stream, so nothing is retried and no partial
//! output is finalized. Soft failures are [`ResguardWarning`]s, which are
//! recorded in the run report and never stop the run.

use camino::Utf8PathBuf;
use std::fmt;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ResguardError>;

#[derive(Error, Debug)]
pub enum ResguardError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("binary read/write error: {0}")]
    BinRw(#[from] binrw::Error),

    #[error("configuration error: {0}")]
    Config(#[from] resguard_config::ConfigError),

    /// Unexpected chunk type, bad config size, or size arithmetic going non-positive.
    #[error("malformed resource table: {0}")]
    MalformedTable(String),

    /// Two entries of one type resolved to the same replacement name.
    #[error("duplicate replacement name '{name}' in {package}.R.{type_name}, check the whitelist and mapping file")]
    DuplicateName {
        package: String,
        type_name: String,
        name: String,
    },

    #[error("short-name namespace exhausted for type '{type_name}' after {count} names")]
    NamespaceExhausted { type_name: String, count: usize },

    /// Only raised when strict missing-file handling is enabled.
    #[error("resource file not found: {0}")]
    MissingResourceFile(Utf8PathBuf),

    #[error("no replacement recorded for committed resource 0x{0:08x}")]
    MissingReplacement(u32),

    #[error("output file already exists: {0}")]
    OutputCollision(Utf8PathBuf),

    #[error("invalid mapping file at line {line}: {reason}")]
    InvalidMapping { line: usize, reason: String },
}

impl ResguardError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedTable(reason.into())
    }
}

/// Non-fatal problems encountered while transcoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResguardWarning {
    /// The table references a file that is not present in the unpacked input.
    MissingResourceFile { path: Utf8PathBuf },
    /// A file value lives in a directory that has no entry in the directory map.
    UnmappedResDir { raw: String },
    /// A string value of a file-backed type does not look like a file path.
    NotAFilePath { res_id: u32, raw: String },
    /// The compress table has no record for a renamed file.
    MissingCompressData { raw: String },
    /// The prior mapping recorded a different new path for this file.
    MappedPathDrift {
        raw: String,
        recorded: String,
        rebuilt: String,
    },
}

impl fmt::Display for ResguardWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResguardWarning::MissingResourceFile { path } => {
                write!(f, "resource file not found, skipping copy: {}", path)
            }
            ResguardWarning::UnmappedResDir { raw } => {
                write!(f, "no new directory for resource path: {}", raw)
            }
            ResguardWarning::NotAFilePath { res_id, raw } => {
                write!(f, "value of 0x{:08x} is not a file path: {}", res_id, raw)
            }
            ResguardWarning::MissingCompressData { raw } => {
                write!(f, "no compress data for resource file: {}", raw)
            }
            ResguardWarning::MappedPathDrift {
                raw,
                recorded,
                rebuilt,
            } => write!(
                f,
                "{} was mapped to {} by the previous run but now maps to {}",
                raw, recorded, rebuilt
            ),
        }
    }
}
