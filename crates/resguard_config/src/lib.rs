//! Configuration types for the resource table obfuscator.
//!
//! A [`ResguardConfig`] is the serialized document (TOML or JSON) a build
//! pipeline hands to the tool. Its whitelist entries are compiled into a
//! [`Whitelist`] before the engine runs.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

mod error;

pub use error::ConfigError;

/// Default root for renamed resource directories (`res/drawable` -> `r/a`).
pub const DEFAULT_RES_DIR_NAME: &str = "r";

fn default_res_dir_name() -> String {
    DEFAULT_RES_DIR_NAME.to_string()
}

/// Describes a resguard configuration file
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ResguardConfig {
    /// Keep the original `res/<dir>` directory names instead of shortening them
    pub keep_root: bool,

    /// Collapse resource files with identical content into a single physical file
    pub merge_duplicated_res: bool,

    /// Fail the run when a resource file referenced by the table is missing on disk.
    /// When unset the file is skipped with a warning and the table is still rewritten.
    pub strict_missing_files: bool,

    /// Root directory for renamed resource directories
    ///
    /// Example: `r`
    #[serde(default = "default_res_dir_name")]
    pub res_dir_name: String,

    /// Mapping file written by a previous run, used to keep names stable
    ///
    /// Example: `build/resguard/resource_mapping.txt`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<String>,

    /// Resources that must keep their original name
    ///
    /// Example: `com.example.R.string.app_name`, `com.example.R.drawable.icon_*`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub whitelist: Vec<String>,
}

impl Default for ResguardConfig {
    fn default() -> Self {
        Self {
            keep_root: false,
            merge_duplicated_res: false,
            strict_missing_files: false,
            res_dir_name: default_res_dir_name(),
            mapping: None,
            whitelist: Vec::new(),
        }
    }
}

impl ResguardConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json_slice(content: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(content)?)
    }

    /// Compile the whitelist entries of this config.
    pub fn compile_whitelist(&self) -> Result<Whitelist, ConfigError> {
        Whitelist::from_patterns(&self.whitelist)
    }
}

/// Compiled whitelist, keyed by package name and then by resource type name.
///
/// Each pattern is anchored and matched against the resource's spec name only,
/// so `com.example.R.drawable.icon_*` matches the `drawable` entry `icon_launcher`
/// of package `com.example`.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    rules: HashMap<String, HashMap<String, Vec<Regex>>>,
}

impl Whitelist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_patterns<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut whitelist = Self::new();
        for pattern in patterns {
            whitelist.add_pattern(pattern.as_ref())?;
        }
        Ok(whitelist)
    }

    /// Add a single `pkg.R.type.namePattern` entry.
    pub fn add_pattern(&mut self, pattern: &str) -> Result<(), ConfigError> {
        let (package, type_name, name) = split_resource_pattern(pattern)?;
        let regex = Regex::new(&wildcard_to_regex(name))?;

        self.rules
            .entry(package.to_string())
            .or_default()
            .entry(type_name.to_string())
            .or_default()
            .push(regex);
        Ok(())
    }

    /// The compiled patterns for one type of one package.
    pub fn patterns(&self, package: &str, type_name: &str) -> &[Regex] {
        self.rules
            .get(package)
            .and_then(|types| types.get(type_name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_whitelisted(&self, package: &str, type_name: &str, name: &str) -> bool {
        self.patterns(package, type_name)
            .iter()
            .any(|pattern| pattern.is_match(name))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Split `com.example.R.drawable.icon_*` into `("com.example", "drawable", "icon_*")`.
///
/// Resource names may themselves contain dots (style names do), so the type is
/// taken as the first segment after the last `.R.` and the name is the remainder.
pub fn split_resource_pattern(pattern: &str) -> Result<(&str, &str, &str), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidWhitelist {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    let r_index = pattern
        .rfind(".R.")
        .ok_or_else(|| invalid("expected the form pkg.R.type.name"))?;
    let package = &pattern[..r_index];
    let (type_name, name) = pattern[r_index + 3..]
        .split_once('.')
        .ok_or_else(|| invalid("missing resource name after the type"))?;

    if package.is_empty() || type_name.is_empty() || name.is_empty() {
        return Err(invalid("package, type and name must all be non-empty"));
    }

    Ok((package, type_name, name))
}

/// Convert a `*`/`?` wildcard into an anchored regular expression.
fn wildcard_to_regex(wildcard: &str) -> String {
    let mut regex = String::with_capacity(wildcard.len() + 8);
    regex.push('^');
    for c in wildcard.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            _ => regex.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
    }
    regex.push('$');
    regex
}
