//! Mapping files: the record of one run's renames, fed back into the next run
//! so replacement names stay stable across builds.
//!
//! ```text
//! res path mapping:
//!     res/drawable -> r/a
//! res id mapping:
//!     com.example.R.drawable.icon_a -> com.example.R.drawable.a
//! res file mapping:
//!     res/drawable/icon_a.png -> r/a/a.png
//! ```

use camino::Utf8Path;
use resguard_config::split_resource_pattern;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};

use crate::error::{ResguardError, Result};

pub const PATH_SECTION: &str = "res path mapping:";
pub const ID_SECTION: &str = "res id mapping:";
pub const FILE_SECTION: &str = "res file mapping:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Paths,
    Ids,
    Files,
}

/// Names and directories recorded by a previous run.
#[derive(Debug, Clone, Default)]
pub struct PriorMapping {
    /// package -> type -> original name -> kept name
    names: HashMap<String, HashMap<String, HashMap<String, String>>>,
    dirs: BTreeMap<String, String>,
    files: BTreeMap<String, String>,
}

impl PriorMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_path(path: &Utf8Path) -> Result<Self> {
        Self::parse(BufReader::new(File::open(path)?))
    }

    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut mapping = Self::new();
        let mut section = Section::None;

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match trimmed {
                PATH_SECTION => section = Section::Paths,
                ID_SECTION => section = Section::Ids,
                FILE_SECTION => section = Section::Files,
                _ => mapping.parse_line(section, trimmed, index + 1)?,
            }
        }
        Ok(mapping)
    }

    fn parse_line(&mut self, section: Section, line: &str, line_no: usize) -> Result<()> {
        let invalid = |reason: String| ResguardError::InvalidMapping {
            line: line_no,
            reason,
        };
        let (left, right) = line
            .split_once("->")
            .ok_or_else(|| invalid("expected 'original -> replacement'".to_string()))?;
        let (left, right) = (left.trim(), right.trim());

        match section {
            Section::None => return Err(invalid("entry outside of a mapping section".to_string())),
            Section::Paths => self.insert_dir(left, right),
            Section::Files => self.insert_file(left, right),
            Section::Ids => {
                let (package, type_name, original) =
                    split_resource_pattern(left).map_err(|e| invalid(e.to_string()))?;
                let (_, _, kept) =
                    split_resource_pattern(right).map_err(|e| invalid(e.to_string()))?;
                self.insert_name(package, type_name, original, kept);
            }
        }
        Ok(())
    }

    pub fn insert_name(&mut self, package: &str, type_name: &str, original: &str, kept: &str) {
        self.names
            .entry(package.to_string())
            .or_default()
            .entry(type_name.to_string())
            .or_default()
            .insert(original.to_string(), kept.to_string());
    }

    pub fn insert_dir(&mut self, original: &str, kept: &str) {
        self.dirs.insert(original.to_string(), kept.to_string());
    }

    pub fn insert_file(&mut self, original: &str, kept: &str) {
        self.files.insert(original.to_string(), kept.to_string());
    }

    pub fn kept_name(&self, package: &str, type_name: &str, original: &str) -> Option<&str> {
        self.names
            .get(package)?
            .get(type_name)?
            .get(original)
            .map(String::as_str)
    }

    /// Every kept name of one type; these are off limits for the generator.
    pub fn kept_names(&self, package: &str, type_name: &str) -> impl Iterator<Item = &str> {
        self.names
            .get(package)
            .and_then(|types| types.get(type_name))
            .into_iter()
            .flat_map(|names| names.values().map(String::as_str))
    }

    pub fn dir(&self, original: &str) -> Option<&str> {
        self.dirs.get(original).map(String::as_str)
    }

    pub fn dirs(&self) -> &BTreeMap<String, String> {
        &self.dirs
    }

    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.dirs.is_empty() && self.files.is_empty()
    }
}
