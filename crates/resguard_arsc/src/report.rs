use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::error::ResguardWarning;
use crate::mapping::{FILE_SECTION, ID_SECTION, PATH_SECTION};
use crate::merge::MergeSummary;
use crate::model::RenameDecision;

/// The decision taken for one resource entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMapping {
    pub package: String,
    pub type_name: String,
    pub original: String,
    pub decision: RenameDecision,
}

/// Everything a finished run decided and every problem it tolerated.
#[derive(Debug, Clone, Default)]
pub struct ResguardReport {
    pub id_mappings: Vec<IdMapping>,
    pub dir_mappings: BTreeMap<String, String>,
    /// Table path of each rewritten file value, old to new.
    pub file_mappings: Vec<(String, String)>,
    pub merges: MergeSummary,
    /// Per-path compression flags, with renamed paths added.
    pub compress_data: BTreeMap<String, bool>,
    pub warnings: Vec<ResguardWarning>,
}

impl ResguardReport {
    pub(crate) fn warn(&mut self, warning: ResguardWarning) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Number of entries that received a name different from the original.
    pub fn renamed_count(&self) -> usize {
        self.id_mappings
            .iter()
            .filter(|mapping| mapping.decision.replacement() != mapping.original)
            .count()
    }

    /// Write the mapping file. Whitelisted entries are left out.
    pub fn write_mapping<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "{}", PATH_SECTION)?;
        for (original, new_path) in &self.dir_mappings {
            if original != new_path {
                writeln!(writer, "    {} -> {}", original, new_path)?;
            }
        }

        writeln!(writer, "{}", ID_SECTION)?;
        for mapping in self.id_mappings.iter().filter(|m| m.decision.is_rename()) {
            writeln!(
                writer,
                "    {pkg}.R.{ty}.{} -> {pkg}.R.{ty}.{}",
                mapping.original,
                mapping.decision.replacement(),
                pkg = mapping.package,
                ty = mapping.type_name,
            )?;
        }

        writeln!(writer, "{}", FILE_SECTION)?;
        for (original, new_path) in &self.file_mappings {
            if original != new_path {
                writeln!(writer, "    {} -> {}", original, new_path)?;
            }
        }
        Ok(())
    }

    pub fn write_merge_log<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.merges.write_log(writer)
    }
}
