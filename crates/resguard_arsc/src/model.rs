//! In-memory record of the packages and types being renamed.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{ResguardError, Result};

/// The framework package; its identifiers are referenced by every app and
/// must never change.
pub const ANDROID_PACKAGE_NAME: &str = "android";

/// Build a fully-qualified resource id (`0xPPTTEEEE`).
pub fn res_id(package_id: u8, type_id: u8, entry_index: u16) -> u32 {
    (u32::from(package_id) << 24) | (u32::from(type_id) << 16) | u32::from(entry_index)
}

/// How the replacement name of one resource entry was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameDecision {
    /// Matched a whitelist pattern, keeps its original name.
    Whitelisted(String),
    /// Reuses the name a previous run's mapping file recorded.
    KeptFromPriorMapping(String),
    /// Drawn from the short-name generator.
    Generated(String),
}

impl RenameDecision {
    pub fn replacement(&self) -> &str {
        match self {
            RenameDecision::Whitelisted(name)
            | RenameDecision::KeptFromPriorMapping(name)
            | RenameDecision::Generated(name) => name,
        }
    }

    /// Whether this decision belongs in the mapping file.
    pub fn is_rename(&self) -> bool {
        !matches!(self, RenameDecision::Whitelisted(_))
    }
}

impl fmt::Display for RenameDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenameDecision::Whitelisted(name) => write!(f, "{} (whitelisted)", name),
            RenameDecision::KeptFromPriorMapping(name) => write!(f, "{} (kept)", name),
            RenameDecision::Generated(name) => write!(f, "{}", name),
        }
    }
}

/// A shared library declaration found in a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedLibrary {
    pub package_id: u32,
    pub name: String,
}

/// One resource package of the table.
#[derive(Debug, Clone)]
pub struct ResPackage {
    pub id: u8,
    pub name: String,
    /// False for the framework package.
    pub can_rename: bool,
    pub libraries: Vec<SharedLibrary>,

    decisions: HashMap<u32, RenameDecision>,
    /// Final spec names in first-use order; several ids may share one string.
    spec_names: Vec<String>,
    spec_name_set: HashSet<String>,
    renamed: bool,
}

impl ResPackage {
    pub fn new(id: u8, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            can_rename: name != ANDROID_PACKAGE_NAME,
            name,
            libraries: Vec::new(),
            decisions: HashMap::new(),
            spec_names: Vec::new(),
            spec_name_set: HashSet::new(),
            renamed: false,
        }
    }

    pub fn decision(&self, res_id: u32) -> Option<&RenameDecision> {
        self.decisions.get(&res_id)
    }

    pub fn replacement(&self, res_id: u32) -> Option<&str> {
        self.decision(res_id).map(RenameDecision::replacement)
    }

    /// Record the decision for a resource id. Decisions are immutable: a second
    /// call for the same id keeps the first one.
    pub fn record(&mut self, res_id: u32, original: &str, decision: RenameDecision) {
        if self.decisions.contains_key(&res_id) {
            return;
        }
        let replacement = decision.replacement().to_string();
        if replacement != original {
            self.renamed = true;
        }
        if self.spec_name_set.insert(replacement.clone()) {
            self.spec_names.push(replacement);
        }
        self.decisions.insert(res_id, decision);
    }

    /// The distinct final spec names, in the order the new pool stores them.
    pub fn spec_names(&self) -> &[String] {
        &self.spec_names
    }

    /// Whether any committed decision changed a name. When none did, the
    /// original spec name pool can be kept as is.
    pub fn has_renames(&self) -> bool {
        self.renamed
    }

    pub fn decision_count(&self) -> usize {
        self.decisions.len()
    }
}

/// One resource type of the package currently being decoded.
#[derive(Debug, Clone)]
pub struct ResType {
    pub id: u8,
    pub name: String,
    pub package_name: String,
    used_names: HashSet<String>,
}

impl ResType {
    pub fn new(id: u8, name: impl Into<String>, package_name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            package_name: package_name.into(),
            used_names: HashSet::new(),
        }
    }

    /// Claim a replacement name inside this type.
    pub fn commit(&mut self, replacement: &str) -> Result<()> {
        if !self.used_names.insert(replacement.to_string()) {
            return Err(ResguardError::DuplicateName {
                package: self.package_name.clone(),
                type_name: self.name.clone(),
                name: replacement.to_string(),
            });
        }
        Ok(())
    }
}

/// Types whose string values are never file paths.
pub fn is_file_backed_type(type_name: &str) -> bool {
    !matches!(type_name, "string" | "id" | "array")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_res_id_layout() {
        assert_eq!(res_id(0x7f, 0x02, 0x0010), 0x7f02_0010);
    }

    #[test]
    fn test_android_package_is_protected() {
        assert!(!ResPackage::new(1, "android").can_rename);
        assert!(ResPackage::new(0x7f, "com.example").can_rename);
    }

    #[test]
    fn test_record_dedups_spec_names() {
        let mut package = ResPackage::new(0x7f, "com.example");
        package.record(0x7f02_0000, "icon", RenameDecision::Generated("a".into()));
        package.record(0x7f03_0000, "title", RenameDecision::Generated("a".into()));
        package.record(0x7f03_0001, "app_name", RenameDecision::Whitelisted("app_name".into()));
        // immutable once recorded
        package.record(0x7f02_0000, "icon", RenameDecision::Generated("zz".into()));

        assert_eq!(package.spec_names(), &["a".to_string(), "app_name".to_string()]);
        assert_eq!(package.replacement(0x7f02_0000), Some("a"));
        assert_eq!(package.decision_count(), 3);
        assert!(package.has_renames());
    }

    #[test]
    fn test_identity_decisions_are_not_renames() {
        let mut package = ResPackage::new(0x7f, "com.example");
        package.record(0x7f02_0000, "icon", RenameDecision::Whitelisted("icon".into()));
        assert!(!package.has_renames());
    }

    #[test]
    fn test_type_rejects_duplicate_replacement() {
        let mut res_type = ResType::new(2, "drawable", "com.example");
        res_type.commit("a").unwrap();
        let err = res_type.commit("a").unwrap_err();
        assert!(matches!(err, ResguardError::DuplicateName { ref name, .. } if name == "a"));
    }

    #[test]
    fn test_file_backed_types() {
        assert!(is_file_backed_type("drawable"));
        assert!(is_file_backed_type("layout"));
        assert!(!is_file_backed_type("string"));
        assert!(!is_file_backed_type("array"));
    }
}
