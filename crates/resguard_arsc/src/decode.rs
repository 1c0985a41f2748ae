//! Decode pass: decide a replacement for every entry, move the files the table
//! points at, and record the walk the encoder replays.

use camino::Utf8Path;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Read;

use resguard_config::Whitelist;

use crate::chunk::ChunkHeader;
use crate::error::{ResguardError, ResguardWarning, Result};
use crate::mapping::PriorMapping;
use crate::merge::{DuplicateMerger, MergeOutcome};
use crate::model::{is_file_backed_type, res_id, RenameDecision, ResPackage, ResType, SharedLibrary};
use crate::name_gen::ShortNameGenerator;
use crate::plan::{KeyPatch, WalkPlan, WalkStep};
use crate::prescan::PreScan;
use crate::report::{IdMapping, ResguardReport};
use crate::res_dir::ResDirMap;
use crate::resguard::ResguardOptions;
use crate::string_pool::StringPool;
use crate::table::{
    parse_libraries, walk_table, EntryValue, PackageHeader, TableVisitor, TypeChunk,
    TypeSpecHeader, TYPE_STRING,
};

/// What the encoder needs from the decode pass.
#[derive(Debug, Clone, Default)]
pub struct DecodedTable {
    pub plan: WalkPlan,
    pub packages: Vec<ResPackage>,
    /// New values for table string pool entries, keyed by pool index.
    pub table_string_renames: BTreeMap<u32, String>,
}

/// Inputs shared by the whole decode pass.
pub(crate) struct DecodeContext<'a> {
    pub whitelist: &'a Whitelist,
    pub prior: &'a PriorMapping,
    pub existing: &'a PreScan,
    pub dirs: &'a ResDirMap,
    pub options: &'a ResguardOptions,
    pub input_root: &'a Utf8Path,
    pub output_root: &'a Utf8Path,
}

struct PackageState {
    package: ResPackage,
    type_names: Vec<String>,
    spec_names: StringPool,
    current_type: Option<ResType>,
}

pub(crate) struct TableDecoder<'a> {
    ctx: DecodeContext<'a>,
    generator: ShortNameGenerator,
    merger: DuplicateMerger,
    plan: WalkPlan,
    packages: Vec<ResPackage>,
    table_strings: Option<StringPool>,
    table_string_renames: BTreeMap<u32, String>,
    /// Table string indices already handled as file paths.
    visited_strings: HashSet<u32>,
    current: Option<PackageState>,
    declared_packages: u32,
    report: ResguardReport,
}

impl<'a> TableDecoder<'a> {
    pub fn new(ctx: DecodeContext<'a>, compress_data: BTreeMap<String, bool>) -> Self {
        let report = ResguardReport {
            dir_mappings: ctx.dirs.entries().clone(),
            compress_data,
            ..Default::default()
        };
        Self {
            ctx,
            generator: ShortNameGenerator::new(),
            merger: DuplicateMerger::new(),
            plan: WalkPlan::new(),
            packages: Vec::new(),
            table_strings: None,
            table_string_renames: BTreeMap::new(),
            visited_strings: HashSet::new(),
            current: None,
            declared_packages: 0,
            report,
        }
    }

    pub fn decode<R: Read>(mut self, reader: &mut R) -> Result<(DecodedTable, ResguardReport)> {
        walk_table(reader, &mut self)?;
        if self.packages.len() != self.declared_packages as usize {
            tracing::warn!(
                "table declares {} packages but contains {}",
                self.declared_packages,
                self.packages.len()
            );
        }

        let mut report = self.report;
        report.merges = self.merger.into_summary();
        Ok((
            DecodedTable {
                plan: self.plan,
                packages: self.packages,
                table_string_renames: self.table_string_renames,
            },
            report,
        ))
    }

    fn take_state(&mut self) -> Result<PackageState> {
        self.current
            .take()
            .ok_or_else(|| ResguardError::malformed("package child chunk outside of a package"))
    }

    fn begin_type(&mut self, state: &mut PackageState, type_id: u8) -> Result<()> {
        let type_name = type_id
            .checked_sub(1)
            .and_then(|index| state.type_names.get(index as usize))
            .cloned()
            .ok_or_else(|| {
                ResguardError::malformed(format!("type id 0x{:02x} has no type name", type_id))
            })?;

        let package = &state.package;
        if package.can_rename {
            self.generator
                .reset(self.ctx.whitelist.patterns(&package.name, &type_name));
            self.generator
                .remove_all(self.ctx.existing.existing_names(package.id, type_id));
            self.generator
                .remove_all(self.ctx.prior.kept_names(&package.name, &type_name));
        }
        state.current_type = Some(ResType::new(type_id, type_name, package.name.clone()));
        Ok(())
    }

    fn read_entries(
        &mut self,
        state: &mut PackageState,
        chunk: &[u8],
    ) -> Result<(u8, Vec<KeyPatch>)> {
        let parsed = TypeChunk::parse(chunk)?;
        let PackageState {
            package,
            spec_names,
            current_type,
            ..
        } = state;
        if !package.can_rename {
            return Ok((parsed.id, Vec::new()));
        }

        let res_type = current_type
            .as_mut()
            .filter(|res_type| res_type.id == parsed.id)
            .ok_or_else(|| {
                ResguardError::malformed(format!(
                    "type chunk 0x{:02x} without a preceding type spec",
                    parsed.id
                ))
            })?;

        let mut patches = Vec::with_capacity(parsed.entries.len());
        for entry in &parsed.entries {
            let id = res_id(package.id, parsed.id, entry.index);
            let original = spec_names.get(entry.key as usize)?;
            let replacement = self.decide(package, res_type, id, &original)?;
            patches.push(KeyPatch {
                offset: entry.key_offset,
                width: entry.key_width,
                res_id: id,
            });

            // Bag values are walked for validation but never name files.
            if let EntryValue::Simple(value) = parsed.entry_value(chunk, entry)? {
                if value.data_type == TYPE_STRING && is_file_backed_type(&res_type.name) {
                    self.rename_file_value(id, value.data, &replacement)?;
                }
            }
        }
        Ok((parsed.id, patches))
    }

    /// Resolve the replacement for one resource id. Later configurations of the
    /// same id reuse the first decision.
    fn decide(
        &mut self,
        package: &mut ResPackage,
        res_type: &mut ResType,
        id: u32,
        original: &str,
    ) -> Result<String> {
        if let Some(existing) = package.replacement(id) {
            return Ok(existing.to_string());
        }

        let decision = if self
            .ctx
            .whitelist
            .is_whitelisted(&package.name, &res_type.name, original)
        {
            RenameDecision::Whitelisted(original.to_string())
        } else if let Some(kept) = self
            .ctx
            .prior
            .kept_name(&package.name, &res_type.name, original)
        {
            RenameDecision::KeptFromPriorMapping(kept.to_string())
        } else {
            let name = self
                .generator
                .take()
                .ok_or_else(|| ResguardError::NamespaceExhausted {
                    type_name: res_type.name.clone(),
                    count: self.generator.issued(),
                })?;
            RenameDecision::Generated(name)
        };

        res_type.commit(decision.replacement())?;
        tracing::trace!(
            "{}.R.{}.{} -> {}",
            package.name,
            res_type.name,
            original,
            decision
        );

        let replacement = decision.replacement().to_string();
        self.report.id_mappings.push(IdMapping {
            package: package.name.clone(),
            type_name: res_type.name.clone(),
            original: original.to_string(),
            decision: decision.clone(),
        });
        package.record(id, original, decision);
        Ok(replacement)
    }

    /// Move the file a string value points at and schedule the new path.
    fn rename_file_value(&mut self, id: u32, string_index: u32, replacement: &str) -> Result<()> {
        if !self.visited_strings.insert(string_index) {
            return Ok(());
        }
        let raw = self
            .table_strings
            .as_ref()
            .ok_or_else(|| ResguardError::malformed("entry values before the table string pool"))?
            .get(string_index as usize)?;
        if raw.trim().is_empty() || raw.eq_ignore_ascii_case("null") {
            return Ok(());
        }

        let Some((dir, leaf)) = raw.rsplit_once('/') else {
            self.report.warn(ResguardWarning::NotAFilePath {
                res_id: id,
                raw: raw.clone(),
            });
            return Ok(());
        };
        let new_dir = if self.ctx.options.keep_root {
            dir.to_string()
        } else {
            match self.ctx.dirs.get(dir) {
                Some(new_dir) => new_dir.to_string(),
                None => {
                    self.report
                        .warn(ResguardWarning::UnmappedResDir { raw: raw.clone() });
                    return Ok(());
                }
            }
        };
        let extension = leaf.find('.').map_or("", |dot| &leaf[dot..]);
        let mut result = format!("{}/{}{}", new_dir, replacement, extension);

        let source = self.ctx.input_root.join(&raw);
        if !source.is_file() {
            if self.ctx.options.strict_missing_files {
                return Err(ResguardError::MissingResourceFile(source));
            }
            self.report
                .warn(ResguardWarning::MissingResourceFile { path: source });
        } else {
            let outcome = if self.ctx.options.merge_duplicates {
                self.merger.resolve(&source, &raw, &result)?
            } else {
                MergeOutcome::Unique
            };
            match outcome {
                MergeOutcome::Duplicate { kept_path } => result = kept_path,
                MergeOutcome::Unique => {
                    let destination = self.ctx.output_root.join(&result);
                    if destination.exists() {
                        return Err(ResguardError::OutputCollision(destination));
                    }
                    if let Some(parent) = destination.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::copy(&source, &destination)?;
                }
            }
        }

        if !self.report.compress_data.is_empty() {
            match self.report.compress_data.get(&raw).copied() {
                Some(compress) => {
                    self.report.compress_data.insert(result.clone(), compress);
                }
                None => self
                    .report
                    .warn(ResguardWarning::MissingCompressData { raw: raw.clone() }),
            }
        }

        if let Some(recorded) = self.ctx.prior.files().get(&raw) {
            if *recorded != result {
                self.report.warn(ResguardWarning::MappedPathDrift {
                    raw: raw.clone(),
                    recorded: recorded.clone(),
                    rebuilt: result.clone(),
                });
            }
        }

        self.report.file_mappings.push((raw.clone(), result.clone()));
        if result != raw {
            self.table_string_renames.insert(string_index, result);
        }
        Ok(())
    }
}

impl TableVisitor for TableDecoder<'_> {
    fn table(&mut self, package_count: u32) -> Result<()> {
        self.declared_packages = package_count;
        self.plan.push(WalkStep::Table);
        Ok(())
    }

    fn table_strings(&mut self, pool: StringPool) -> Result<()> {
        tracing::debug!(
            "table string pool: {} strings, utf8={}",
            pool.len(),
            pool.is_utf8()
        );
        self.table_strings = Some(pool);
        self.plan.push(WalkStep::TableStrings);
        Ok(())
    }

    fn package(
        &mut self,
        header: PackageHeader,
        type_names: StringPool,
        spec_names: StringPool,
    ) -> Result<()> {
        let package = ResPackage::new(header.id as u8, header.name);
        tracing::debug!(
            "package 0x{:02x} {} (renamable={}, {} spec names)",
            package.id,
            package.name,
            package.can_rename,
            spec_names.len()
        );

        self.plan.push(WalkStep::Package {
            index: self.packages.len(),
        });
        self.plan.push(WalkStep::TypeNames);
        self.plan.push(WalkStep::SpecNames {
            package: self.packages.len(),
        });
        self.current = Some(PackageState {
            package,
            type_names: type_names.strings()?,
            spec_names,
            current_type: None,
        });
        Ok(())
    }

    fn library(&mut self, chunk: &[u8]) -> Result<()> {
        let libraries = parse_libraries(chunk)?;
        let mut state = self.take_state()?;
        state.package.libraries.extend(
            libraries
                .into_iter()
                .map(|(package_id, name)| SharedLibrary { package_id, name }),
        );
        self.current = Some(state);
        self.plan.push(WalkStep::Library);
        Ok(())
    }

    fn type_spec(&mut self, chunk: &[u8]) -> Result<()> {
        let spec = TypeSpecHeader::parse(chunk)?;
        let mut state = self.take_state()?;
        let result = self.begin_type(&mut state, spec.id);
        self.current = Some(state);
        result?;
        self.plan.push(WalkStep::TypeSpec { type_id: spec.id });
        Ok(())
    }

    fn type_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let mut state = self.take_state()?;
        let result = self.read_entries(&mut state, chunk);
        self.current = Some(state);
        let (type_id, patches) = result?;
        self.plan.push(WalkStep::Type { type_id, patches });
        Ok(())
    }

    fn opaque(&mut self, header: &ChunkHeader) -> Result<()> {
        tracing::debug!(
            "copying unknown chunk 0x{:04x} ({} bytes)",
            header.chunk_type,
            header.size
        );
        self.plan.push(WalkStep::Opaque {
            chunk_type: header.chunk_type,
        });
        Ok(())
    }

    fn end_package(&mut self) -> Result<()> {
        let state = self.take_state()?;
        tracing::debug!(
            "package {}: {} entries decided",
            state.package.name,
            state.package.decision_count()
        );
        self.packages.push(state.package);
        self.plan.push(WalkStep::PackageEnd);
        Ok(())
    }
}
