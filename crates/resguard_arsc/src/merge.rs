//! Collapse resource files with identical content into one physical file.
//!
//! Candidates are grouped by size first; a content hash is only computed once
//! two files of the same size meet, and is cached on the record afterwards.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::{self, Write};
use xxhash_rust::xxh3::xxh3_128;

use crate::error::Result;

/// A file already written to the output, available as a merge target.
#[derive(Debug, Clone)]
struct MergeRecord {
    source: Utf8PathBuf,
    /// Path stored in the table for this file.
    logical_path: String,
    size: u64,
    hash: Option<u128>,
}

impl MergeRecord {
    fn hash(&mut self) -> Result<u128> {
        if let Some(hash) = self.hash {
            return Ok(hash);
        }
        let hash = hash_file(&self.source)?;
        self.hash = Some(hash);
        Ok(hash)
    }
}

fn hash_file(path: &Utf8Path) -> Result<u128> {
    Ok(xxh3_128(&fs::read(path)?))
}

fn leaf_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// One file that was not written because an identical one already was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedFile {
    pub original_path: String,
    pub original_name: String,
    pub kept_path: String,
    pub kept_name: String,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MergeSummary {
    pub merged: Vec<MergedFile>,
    pub removed_count: usize,
    pub removed_bytes: u64,
}

impl MergeSummary {
    /// Write the merge log: one line per elided file and a closing total.
    pub fn write_log<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "res filter path mapping:")?;
        for file in &self.merged {
            writeln!(
                writer,
                "    {} ({}) -> {} ({}), size: {}",
                file.original_path, file.original_name, file.kept_path, file.kept_name, file.size
            )?;
        }
        writeln!(
            writer,
            "removed: count({}), totalSize({})",
            self.removed_count, self.removed_bytes
        )
    }
}

pub enum MergeOutcome {
    /// No identical file was seen; the caller writes this one.
    Unique,
    /// Point the table at `kept_path` instead of writing the file.
    Duplicate { kept_path: String },
}

#[derive(Debug, Default)]
pub struct DuplicateMerger {
    records: Vec<MergeRecord>,
    summary: MergeSummary,
}

impl DuplicateMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look for a file identical to `source`. When none exists, `source` is
    /// registered under `logical_path` as a target for later files.
    pub fn resolve(
        &mut self,
        source: &Utf8Path,
        original_path: &str,
        logical_path: &str,
    ) -> Result<MergeOutcome> {
        let size = fs::metadata(source)?.len();
        let mut source_hash = None;

        for record in self.records.iter_mut().filter(|record| record.size == size) {
            let hash = match source_hash {
                Some(hash) => hash,
                None => *source_hash.insert(hash_file(source)?),
            };
            if record.hash()? != hash {
                continue;
            }

            tracing::debug!(
                "merged duplicate resource {} into {} ({} bytes)",
                original_path,
                record.logical_path,
                size
            );
            self.summary.merged.push(MergedFile {
                original_path: original_path.to_string(),
                original_name: leaf_name(original_path).to_string(),
                kept_path: record.logical_path.clone(),
                kept_name: leaf_name(&record.logical_path).to_string(),
                size,
            });
            self.summary.removed_count += 1;
            self.summary.removed_bytes += size;
            return Ok(MergeOutcome::Duplicate {
                kept_path: record.logical_path.clone(),
            });
        }

        self.records.push(MergeRecord {
            source: source.to_path_buf(),
            logical_path: logical_path.to_string(),
            size,
            hash: source_hash,
        });
        Ok(MergeOutcome::Unique)
    }

    pub fn summary(&self) -> &MergeSummary {
        &self.summary
    }

    pub fn into_summary(self) -> MergeSummary {
        self.summary
    }
}
