//! Builds small resource tables in memory and reads them back for assertions.

use binrw::BinWrite;
use byteorder::{WriteBytesExt, LE};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use tempfile::TempDir;

use crate::chunk::{
    ChunkHeader, RES_TABLE_LIBRARY_TYPE, RES_TABLE_PACKAGE_TYPE, RES_TABLE_TYPE,
    RES_TABLE_TYPE_SPEC_TYPE, RES_TABLE_TYPE_TYPE,
};
use crate::error::Result;
use crate::string_pool::{encode_pool, StringPool};
use crate::table::{
    walk_table, EntryValue, PackageHeader, TableVisitor, TypeChunk, ENTRY_FLAG_COMPACT, NO_ENTRY,
    PACKAGE_NAME_LEN, TYPE_FLAG_OFFSET16, TYPE_FLAG_SPARSE, TYPE_STRING,
};
use crate::RESOURCES_ARSC;

const TYPE_INT_DEC: u8 = 0x10;
const CONFIG_SIZE: usize = 64;
const TYPE_HEADER_SIZE: usize = 20 + CONFIG_SIZE;
const PACKAGE_HEADER_SIZE: usize = 288;

#[derive(Debug, Clone)]
pub(crate) enum TestValue {
    Str(String),
    Int(u32),
    Bag(Vec<u32>),
    /// An index with no entry in any configuration.
    Absent,
}

/// How a type chunk locates its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryLayout {
    Dense,
    Offset16,
    Sparse,
}

struct TestType {
    name: String,
    entries: Vec<(String, TestValue)>,
    configs: u8,
    layout: EntryLayout,
    compact: bool,
}

struct TestPackage {
    id: u8,
    name: String,
    types: Vec<TestType>,
    libraries: Vec<(u32, String)>,
    opaque: Vec<(u16, Vec<u8>)>,
}

pub(crate) struct TableBuilder {
    utf8: bool,
    packages: Vec<TestPackage>,
}

fn intern(strings: &mut Vec<String>, index: &mut HashMap<String, u32>, value: &str) -> u32 {
    *index.entry(value.to_string()).or_insert_with(|| {
        strings.push(value.to_string());
        strings.len() as u32 - 1
    })
}

impl TableBuilder {
    pub fn new() -> Self {
        Self {
            utf8: true,
            packages: Vec::new(),
        }
    }

    pub fn utf16(mut self) -> Self {
        self.utf8 = false;
        self
    }

    pub fn package(mut self, id: u8, name: &str) -> Self {
        self.packages.push(TestPackage {
            id,
            name: name.to_string(),
            types: Vec::new(),
            libraries: Vec::new(),
            opaque: Vec::new(),
        });
        self
    }

    /// Declare a shared library in the current package.
    pub fn library(mut self, package_id: u32, name: &str) -> Self {
        self.last_package()
            .libraries
            .push((package_id, name.to_string()));
        self
    }

    /// Append a chunk of a type the engine does not interpret to the current package.
    pub fn opaque(mut self, chunk_type: u16, payload: &[u8]) -> Self {
        self.last_package()
            .opaque
            .push((chunk_type, payload.to_vec()));
        self
    }

    pub fn res_type(mut self, name: &str) -> Self {
        self.last_package().types.push(TestType {
            name: name.to_string(),
            entries: Vec::new(),
            configs: 1,
            layout: EntryLayout::Dense,
            compact: false,
        });
        self
    }

    /// Emit the current type in this many configurations.
    pub fn configs(mut self, count: u8) -> Self {
        self.last_type().configs = count;
        self
    }

    /// Index entries of the current type with 16-bit offsets.
    pub fn offset16(mut self) -> Self {
        self.last_type().layout = EntryLayout::Offset16;
        self
    }

    /// Index entries of the current type as (index, offset) pairs.
    pub fn sparse(mut self) -> Self {
        self.last_type().layout = EntryLayout::Sparse;
        self
    }

    /// Write the simple entries of the current type in compact form.
    pub fn compact(mut self) -> Self {
        self.last_type().compact = true;
        self
    }

    pub fn absent(self) -> Self {
        self.entry("", TestValue::Absent)
    }

    pub fn string(self, name: &str, value: &str) -> Self {
        self.entry(name, TestValue::Str(value.to_string()))
    }

    pub fn int(self, name: &str, value: u32) -> Self {
        self.entry(name, TestValue::Int(value))
    }

    pub fn bag(self, name: &str, values: &[u32]) -> Self {
        self.entry(name, TestValue::Bag(values.to_vec()))
    }

    fn entry(mut self, name: &str, value: TestValue) -> Self {
        self.last_type().entries.push((name.to_string(), value));
        self
    }

    fn last_package(&mut self) -> &mut TestPackage {
        self.packages.last_mut().expect("package() first")
    }

    fn last_type(&mut self) -> &mut TestType {
        self.last_package()
            .types
            .last_mut()
            .expect("res_type() first")
    }

    pub fn build(&self) -> Vec<u8> {
        let mut strings = Vec::new();
        let mut string_index = HashMap::new();
        for package in &self.packages {
            for res_type in &package.types {
                for (_, value) in &res_type.entries {
                    if let TestValue::Str(value) = value {
                        intern(&mut strings, &mut string_index, value);
                    }
                }
            }
        }

        let mut body = encode_pool(&strings, self.utf8).unwrap();
        for package in &self.packages {
            body.extend(self.build_package(package, &string_index));
        }

        let mut table = Vec::new();
        table.extend_from_slice(
            &ChunkHeader::new(RES_TABLE_TYPE, 12, 12 + body.len() as u32).to_bytes(),
        );
        table.write_u32::<LE>(self.packages.len() as u32).unwrap();
        table.extend(body);
        table
    }

    fn build_package(&self, package: &TestPackage, string_index: &HashMap<String, u32>) -> Vec<u8> {
        let type_names: Vec<&str> = package.types.iter().map(|t| t.name.as_str()).collect();
        let mut keys = Vec::new();
        let mut key_index = HashMap::new();
        for res_type in &package.types {
            for (name, value) in &res_type.entries {
                if !matches!(value, TestValue::Absent) {
                    intern(&mut keys, &mut key_index, name);
                }
            }
        }
        let type_pool = encode_pool(&type_names, self.utf8).unwrap();
        let key_pool = encode_pool(&keys, self.utf8).unwrap();

        let mut body = Vec::new();
        if !package.libraries.is_empty() {
            body.extend(library_chunk(&package.libraries));
        }
        for (index, res_type) in package.types.iter().enumerate() {
            let type_id = index as u8 + 1;
            body.extend(type_spec_chunk(type_id, res_type.entries.len()));
            for config in 0..res_type.configs {
                body.extend(type_chunk(type_id, config, res_type, &key_index, string_index));
            }
        }
        for (chunk_type, payload) in &package.opaque {
            body.extend(opaque_chunk(*chunk_type, payload));
        }

        let size = PACKAGE_HEADER_SIZE + type_pool.len() + key_pool.len() + body.len();
        let mut chunk = Vec::with_capacity(size);
        chunk.extend_from_slice(
            &ChunkHeader::new(RES_TABLE_PACKAGE_TYPE, PACKAGE_HEADER_SIZE as u16, size as u32)
                .to_bytes(),
        );
        let header = PackageHeader {
            id: u32::from(package.id),
            name: package.name.clone(),
            type_strings: PACKAGE_HEADER_SIZE as u32,
            last_public_type: type_names.len() as u32,
            key_strings: (PACKAGE_HEADER_SIZE + type_pool.len()) as u32,
            last_public_key: keys.len() as u32,
        };
        let mut cursor = Cursor::new(Vec::new());
        header.write(&mut cursor).unwrap();
        chunk.extend(cursor.into_inner());
        chunk.write_u32::<LE>(0).unwrap(); // type id offset
        chunk.extend(type_pool);
        chunk.extend(key_pool);
        chunk.extend(body);
        assert_eq!(chunk.len(), size);
        chunk
    }
}

fn type_spec_chunk(type_id: u8, entry_count: usize) -> Vec<u8> {
    let size = 16 + entry_count * 4;
    let mut chunk = Vec::with_capacity(size);
    chunk.extend_from_slice(
        &ChunkHeader::new(RES_TABLE_TYPE_SPEC_TYPE, 16, size as u32).to_bytes(),
    );
    chunk.push(type_id);
    chunk.push(0);
    chunk.write_u16::<LE>(0).unwrap();
    chunk.write_u32::<LE>(entry_count as u32).unwrap();
    for _ in 0..entry_count {
        chunk.write_u32::<LE>(0).unwrap();
    }
    chunk
}

fn write_value(out: &mut Vec<u8>, data_type: u8, data: u32) {
    out.write_u16::<LE>(8).unwrap();
    out.push(0);
    out.push(data_type);
    out.write_u32::<LE>(data).unwrap();
}

fn type_chunk(
    type_id: u8,
    config: u8,
    res_type: &TestType,
    key_index: &HashMap<String, u32>,
    string_index: &HashMap<String, u32>,
) -> Vec<u8> {
    let mut slots = Vec::new();
    let mut entries = Vec::new();
    let mut present = 0u32;
    for (index, (name, value)) in res_type.entries.iter().enumerate() {
        if matches!(value, TestValue::Absent) {
            match res_type.layout {
                EntryLayout::Dense => slots.write_u32::<LE>(NO_ENTRY).unwrap(),
                EntryLayout::Offset16 => slots.write_u16::<LE>(0xFFFF).unwrap(),
                EntryLayout::Sparse => {}
            }
            continue;
        }

        let offset = entries.len();
        match res_type.layout {
            EntryLayout::Dense => slots.write_u32::<LE>(offset as u32).unwrap(),
            EntryLayout::Offset16 => slots.write_u16::<LE>((offset / 4) as u16).unwrap(),
            EntryLayout::Sparse => {
                slots.write_u16::<LE>(index as u16).unwrap();
                slots.write_u16::<LE>((offset / 4) as u16).unwrap();
            }
        }
        present += 1;
        write_entry(
            &mut entries,
            key_index[name],
            value,
            res_type.compact,
            string_index,
        );
    }
    slots.resize(slots.len().next_multiple_of(4), 0);

    let (flags, entry_count) = match res_type.layout {
        EntryLayout::Dense => (0, res_type.entries.len() as u32),
        EntryLayout::Offset16 => (TYPE_FLAG_OFFSET16, res_type.entries.len() as u32),
        EntryLayout::Sparse => (TYPE_FLAG_SPARSE, present),
    };
    let entries_start = TYPE_HEADER_SIZE + slots.len();
    let size = entries_start + entries.len();
    let mut chunk = Vec::with_capacity(size);
    chunk.extend_from_slice(
        &ChunkHeader::new(RES_TABLE_TYPE_TYPE, TYPE_HEADER_SIZE as u16, size as u32).to_bytes(),
    );
    chunk.push(type_id);
    chunk.push(flags);
    chunk.write_u16::<LE>(0).unwrap();
    chunk.write_u32::<LE>(entry_count).unwrap();
    chunk.write_u32::<LE>(entries_start as u32).unwrap();
    let mut config_bytes = [0u8; CONFIG_SIZE];
    config_bytes[0..4].copy_from_slice(&(CONFIG_SIZE as u32).to_le_bytes());
    config_bytes[4] = config;
    chunk.extend_from_slice(&config_bytes);
    chunk.extend(slots);
    chunk.extend(entries);
    chunk
}

fn write_entry(
    out: &mut Vec<u8>,
    key: u32,
    value: &TestValue,
    compact: bool,
    string_index: &HashMap<String, u32>,
) {
    let simple = match value {
        TestValue::Str(value) => Some((TYPE_STRING, string_index[value])),
        TestValue::Int(value) => Some((TYPE_INT_DEC, *value)),
        TestValue::Bag(_) | TestValue::Absent => None,
    };
    match (simple, value) {
        (Some((data_type, data)), _) if compact => {
            out.write_u16::<LE>(key as u16).unwrap();
            out.write_u16::<LE>(ENTRY_FLAG_COMPACT | (u16::from(data_type) << 8))
                .unwrap();
            out.write_u32::<LE>(data).unwrap();
        }
        (Some((data_type, data)), _) => {
            out.write_u16::<LE>(8).unwrap();
            out.write_u16::<LE>(0).unwrap();
            out.write_u32::<LE>(key).unwrap();
            write_value(out, data_type, data);
        }
        (None, TestValue::Bag(values)) => {
            out.write_u16::<LE>(16).unwrap();
            out.write_u16::<LE>(1).unwrap();
            out.write_u32::<LE>(key).unwrap();
            out.write_u32::<LE>(0).unwrap();
            out.write_u32::<LE>(values.len() as u32).unwrap();
            for (index, value) in values.iter().enumerate() {
                out.write_u32::<LE>(0x0101_0000 + index as u32).unwrap();
                write_value(out, TYPE_INT_DEC, *value);
            }
        }
        (None, _) => {}
    }
}

/// A library chunk declaring the given shared packages.
pub(crate) fn library_chunk(libraries: &[(u32, String)]) -> Vec<u8> {
    let size = 12 + libraries.len() * (4 + PACKAGE_NAME_LEN * 2);
    let mut chunk = Vec::with_capacity(size);
    chunk.extend_from_slice(&ChunkHeader::new(RES_TABLE_LIBRARY_TYPE, 12, size as u32).to_bytes());
    chunk.write_u32::<LE>(libraries.len() as u32).unwrap();
    for (package_id, name) in libraries {
        chunk.write_u32::<LE>(*package_id).unwrap();
        let mut units = name.encode_utf16().collect::<Vec<_>>();
        units.resize(PACKAGE_NAME_LEN, 0);
        for unit in units {
            chunk.write_u16::<LE>(unit).unwrap();
        }
    }
    chunk
}

/// A chunk with a bare 8 byte header followed by `payload`.
pub(crate) fn opaque_chunk(chunk_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut chunk = ChunkHeader::new(chunk_type, 8, 8 + payload.len() as u32)
        .to_bytes()
        .to_vec();
    chunk.extend_from_slice(payload);
    chunk
}

/// The raw bytes of every package chunk of a table, in order.
pub(crate) fn package_chunks(table: &[u8]) -> Vec<Vec<u8>> {
    let read_u16 = |pos: usize| u16::from_le_bytes([table[pos], table[pos + 1]]);
    let read_u32 = |pos: usize| {
        u32::from_le_bytes([table[pos], table[pos + 1], table[pos + 2], table[pos + 3]])
    };

    let mut packages = Vec::new();
    let mut pos = read_u16(2) as usize;
    while pos < table.len() {
        let size = read_u32(pos + 4) as usize;
        if read_u16(pos) == RES_TABLE_PACKAGE_TYPE {
            packages.push(table[pos..pos + size].to_vec());
        }
        pos += size;
    }
    packages
}

/// Whether `needle` occurs anywhere in `haystack`.
pub(crate) fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// One entry of one configuration, as read back from a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InspectedEntry {
    pub package: String,
    pub type_name: String,
    pub res_id: u32,
    pub name: String,
    /// The table string of a simple string value.
    pub value: Option<String>,
}

#[derive(Default)]
struct Inspector {
    table_strings: Option<StringPool>,
    package: Option<(u8, String, Vec<String>, StringPool)>,
    entries: Vec<InspectedEntry>,
    spec_names: HashMap<String, Vec<String>>,
}

impl TableVisitor for Inspector {
    fn table_strings(&mut self, pool: StringPool) -> Result<()> {
        self.table_strings = Some(pool);
        Ok(())
    }

    fn package(
        &mut self,
        header: PackageHeader,
        type_names: StringPool,
        spec_names: StringPool,
    ) -> Result<()> {
        self.spec_names
            .insert(header.name.clone(), spec_names.strings()?);
        self.package = Some((header.id as u8, header.name, type_names.strings()?, spec_names));
        Ok(())
    }

    fn type_spec(&mut self, _chunk: &[u8]) -> Result<()> {
        Ok(())
    }

    fn type_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let (package_id, package_name, type_names, spec_names) = self.package.as_ref().unwrap();
        let table_strings = self.table_strings.as_ref().unwrap();
        let parsed = TypeChunk::parse(chunk)?;
        for entry in &parsed.entries {
            let value = match parsed.entry_value(chunk, entry)? {
                EntryValue::Simple(value) if value.data_type == TYPE_STRING => {
                    Some(table_strings.get(value.data as usize)?)
                }
                _ => None,
            };
            self.entries.push(InspectedEntry {
                package: package_name.clone(),
                type_name: type_names[parsed.id as usize - 1].clone(),
                res_id: crate::model::res_id(*package_id, parsed.id, entry.index),
                name: spec_names.get(entry.key as usize)?,
                value,
            });
        }
        Ok(())
    }
}

/// Every entry of every configuration, in table order.
pub(crate) fn inspect(table: &[u8]) -> Vec<InspectedEntry> {
    let mut inspector = Inspector::default();
    walk_table(&mut Cursor::new(table), &mut inspector).unwrap();
    inspector.entries
}

/// The spec name pool of one package.
pub(crate) fn spec_names(table: &[u8], package: &str) -> Vec<String> {
    let mut inspector = Inspector::default();
    walk_table(&mut Cursor::new(table), &mut inspector).unwrap();
    inspector.spec_names.remove(package).unwrap_or_default()
}

/// The first entry with the given id.
pub(crate) fn entry(entries: &[InspectedEntry], res_id: u32) -> &InspectedEntry {
    entries
        .iter()
        .find(|entry| entry.res_id == res_id)
        .unwrap_or_else(|| panic!("no entry 0x{:08x}", res_id))
}

/// An unpacked APK in a temporary directory, with an empty output next to it.
pub(crate) struct Workspace {
    _dir: TempDir,
    pub input: Utf8PathBuf,
    pub output: Utf8PathBuf,
}

impl Workspace {
    pub fn new(table: &[u8], files: &[(&str, &[u8])]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap().to_path_buf();
        let input = root.join("input");
        let output = root.join("output");

        fs::create_dir_all(&input).unwrap();
        fs::write(input.join(RESOURCES_ARSC), table).unwrap();
        for (path, content) in files {
            let path = input.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        Self {
            _dir: dir,
            input,
            output,
        }
    }

    pub fn input_table(&self) -> Vec<u8> {
        fs::read(self.input.join(RESOURCES_ARSC)).unwrap()
    }

    pub fn output_table(&self) -> Vec<u8> {
        fs::read(self.output.join(RESOURCES_ARSC)).unwrap()
    }

    pub fn output_file(&self, path: &str) -> Option<Vec<u8>> {
        fs::read(self.output.join(path)).ok()
    }
}
