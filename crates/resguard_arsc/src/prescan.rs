//! First pass over the table: collect the original spec names of every type so
//! the generator never hands out a name that an untouched entry already uses.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

use crate::error::{ResguardError, Result};
use crate::string_pool::StringPool;
use crate::table::{walk_table, PackageHeader, TableVisitor, TypeChunk, TypeSpecHeader};

/// What the pre-scan learned about one type.
#[derive(Debug, Clone, Default)]
pub struct ScannedType {
    pub name: String,
    pub spec_names: BTreeSet<String>,
    pub entry_ids: BTreeSet<u16>,
    pub config_count: usize,
}

#[derive(Debug, Clone)]
pub struct ScannedPackage {
    pub id: u8,
    pub name: String,
    pub types: BTreeMap<u8, ScannedType>,
}

/// Existing spec names, keyed by package id and type id.
#[derive(Debug, Clone, Default)]
pub struct PreScan {
    packages: Vec<ScannedPackage>,
}

impl PreScan {
    /// Walk a whole table, reading entry keys only.
    pub fn scan<R: Read>(reader: &mut R) -> Result<Self> {
        let mut visitor = ScanVisitor::default();
        walk_table(reader, &mut visitor)?;
        Ok(visitor.scan)
    }

    pub fn packages(&self) -> &[ScannedPackage] {
        &self.packages
    }

    /// Every original spec name used by one type.
    pub fn existing_names(&self, package_id: u8, type_id: u8) -> impl Iterator<Item = &str> {
        self.packages
            .iter()
            .filter(move |package| package.id == package_id)
            .filter_map(move |package| package.types.get(&type_id))
            .flat_map(|scanned| scanned.spec_names.iter().map(String::as_str))
    }
}

struct OpenPackage {
    scanned: ScannedPackage,
    type_names: Vec<String>,
    spec_names: StringPool,
}

#[derive(Default)]
struct ScanVisitor {
    scan: PreScan,
    current: Option<OpenPackage>,
}

impl ScanVisitor {
    fn open(&mut self) -> Result<&mut OpenPackage> {
        self.current
            .as_mut()
            .ok_or_else(|| ResguardError::malformed("type chunk outside of a package"))
    }
}

impl TableVisitor for ScanVisitor {
    fn table_strings(&mut self, _pool: StringPool) -> Result<()> {
        Ok(())
    }

    fn package(
        &mut self,
        header: PackageHeader,
        type_names: StringPool,
        spec_names: StringPool,
    ) -> Result<()> {
        self.current = Some(OpenPackage {
            scanned: ScannedPackage {
                id: header.id as u8,
                name: header.name,
                types: BTreeMap::new(),
            },
            type_names: type_names.strings()?,
            spec_names,
        });
        Ok(())
    }

    fn type_spec(&mut self, chunk: &[u8]) -> Result<()> {
        let spec = TypeSpecHeader::parse(chunk)?;
        let open = self.open()?;
        let name = open
            .type_names
            .get(spec.id as usize - 1)
            .cloned()
            .ok_or_else(|| {
                ResguardError::malformed(format!("type id 0x{:02x} has no type name", spec.id))
            })?;
        open.scanned.types.entry(spec.id).or_default().name = name;
        Ok(())
    }

    fn type_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let parsed = TypeChunk::parse(chunk)?;
        let open = self.open()?;
        let scanned = open.scanned.types.entry(parsed.id).or_default();
        scanned.config_count += 1;
        for entry in &parsed.entries {
            scanned.entry_ids.insert(entry.index);
            scanned
                .spec_names
                .insert(open.spec_names.get(entry.key as usize)?);
        }
        Ok(())
    }

    fn end_package(&mut self) -> Result<()> {
        if let Some(open) = self.current.take() {
            self.scan.packages.push(open.scanned);
        }
        Ok(())
    }
}
