//! Resource table structure: package headers, type chunks and entries, and a
//! single forward walk over the chunk tree shared by every pass.

use binrw::{binrw, BinRead};
use byteorder::{ByteOrder, LE};
use std::io::{Cursor, Read};

use crate::chunk::{
    expect_header, read_chunk_body, read_header, skip_bytes, ChunkHeader, RES_STRING_POOL_TYPE,
    RES_TABLE_LIBRARY_TYPE, RES_TABLE_PACKAGE_TYPE, RES_TABLE_TYPE, RES_TABLE_TYPE_SPEC_TYPE,
    RES_TABLE_TYPE_TYPE,
};
use crate::error::{ResguardError, Result};
use crate::string_pool::StringPool;

/// Length of the fixed package name field, in UTF-16 units.
pub const PACKAGE_NAME_LEN: usize = 128;

pub const TYPE_FLAG_SPARSE: u8 = 0x01;
pub const TYPE_FLAG_OFFSET16: u8 = 0x02;

pub const ENTRY_FLAG_COMPLEX: u16 = 0x0001;
pub const ENTRY_FLAG_COMPACT: u16 = 0x0008;

pub const NO_ENTRY: u32 = 0xFFFF_FFFF;
const NO_ENTRY16: u16 = 0xFFFF;

/// `Res_value` data type of a string pool reference.
pub const TYPE_STRING: u8 = 0x03;

const TYPE_HEADER_CONFIG_OFFSET: usize = 20;
const MIN_CONFIG_SIZE: u32 = 28;

fn decode_fixed_utf16(raw: &[u16]) -> String {
    let end = raw.iter().position(|&unit| unit == 0).unwrap_or(raw.len());
    String::from_utf16_lossy(&raw[..end])
}

fn encode_fixed_utf16(name: &str) -> [u16; PACKAGE_NAME_LEN] {
    let mut raw = [0u16; PACKAGE_NAME_LEN];
    for (slot, unit) in raw
        .iter_mut()
        .zip(name.encode_utf16().take(PACKAGE_NAME_LEN - 1))
    {
        *slot = unit;
    }
    raw
}

/// The fixed fields of a package chunk header, after the chunk prologue.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageHeader {
    pub id: u32,
    #[br(map = |raw: [u16; PACKAGE_NAME_LEN]| decode_fixed_utf16(&raw))]
    #[bw(map = |name: &String| encode_fixed_utf16(name))]
    pub name: String,
    pub type_strings: u32,
    pub last_public_type: u32,
    pub key_strings: u32,
    pub last_public_key: u32,
}

impl PackageHeader {
    pub const SIZE: usize = 4 + PACKAGE_NAME_LEN * 2 + 16;

    /// Parse the header bytes that follow the chunk prologue.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < Self::SIZE {
            return Err(ResguardError::malformed(format!(
                "package header is {} bytes, expected at least {}",
                raw.len(),
                Self::SIZE
            )));
        }
        Ok(Self::read(&mut Cursor::new(raw))?)
    }
}

/// The fixed fields of a type spec chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSpecHeader {
    pub id: u8,
    pub types_count: u16,
    pub entry_count: u32,
}

impl TypeSpecHeader {
    pub fn parse(chunk: &[u8]) -> Result<Self> {
        let id = byte_at(chunk, 8)?;
        if id == 0 {
            return Err(ResguardError::malformed("type spec with id 0"));
        }
        Ok(Self {
            id,
            types_count: u16_at(chunk, 10)?,
            entry_count: u32_at(chunk, 12)?,
        })
    }
}

/// Parse the shared library declarations of a library chunk.
pub fn parse_libraries(chunk: &[u8]) -> Result<Vec<(u32, String)>> {
    let header_size = u16_at(chunk, 2)? as usize;
    let count = u32_at(chunk, 8)? as usize;
    let entry_size = 4 + PACKAGE_NAME_LEN * 2;

    (0..count)
        .map(|i| {
            let pos = header_size + i * entry_size;
            let package_id = u32_at(chunk, pos)?;
            let raw = chunk
                .get(pos + 4..pos + entry_size)
                .ok_or_else(|| ResguardError::malformed("library entry out of bounds"))?;
            let units: Vec<u16> = raw.chunks_exact(2).map(LE::read_u16).collect();
            Ok((package_id, decode_fixed_utf16(&units)))
        })
        .collect()
}

/// Width of the key index field of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyWidth {
    U16,
    U32,
}

/// Location and key of one present entry inside a type chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRef {
    pub index: u16,
    /// Offset of the entry from the start of the chunk.
    pub offset: usize,
    pub flags: u16,
    pub key: u32,
    /// Offset of the key index from the start of the chunk.
    pub key_offset: usize,
    pub key_width: KeyWidth,
}

impl EntryRef {
    pub fn is_complex(&self) -> bool {
        self.flags & ENTRY_FLAG_COMPLEX != 0
    }

    pub fn is_compact(&self) -> bool {
        self.flags & ENTRY_FLAG_COMPACT != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResValue {
    pub data_type: u8,
    pub data: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryValue {
    Simple(ResValue),
    Complex {
        parent: u32,
        values: Vec<(u32, ResValue)>,
    },
}

/// A type chunk: one configuration's entries of one type.
#[derive(Debug, Clone)]
pub struct TypeChunk {
    pub id: u8,
    pub flags: u8,
    pub entry_count: u32,
    pub entries: Vec<EntryRef>,
}

impl TypeChunk {
    /// Locate every present entry. Values are not interpreted.
    pub fn parse(chunk: &[u8]) -> Result<Self> {
        let header_size = u16_at(chunk, 2)? as usize;
        let id = byte_at(chunk, 8)?;
        let flags = byte_at(chunk, 9)?;
        let entry_count = u32_at(chunk, 12)?;
        let entries_start = u32_at(chunk, 16)? as usize;

        let config_size = u32_at(chunk, TYPE_HEADER_CONFIG_OFFSET)?;
        if config_size < MIN_CONFIG_SIZE
            || TYPE_HEADER_CONFIG_OFFSET + config_size as usize > header_size
        {
            return Err(ResguardError::malformed(format!(
                "type 0x{:02x} has a config of {} bytes in a {} byte header",
                id, config_size, header_size
            )));
        }

        let slot_width: u64 = if flags & TYPE_FLAG_SPARSE == 0 && flags & TYPE_FLAG_OFFSET16 != 0 {
            2
        } else {
            4
        };
        if header_size as u64 + u64::from(entry_count) * slot_width > chunk.len() as u64 {
            return Err(ResguardError::malformed(format!(
                "type 0x{:02x} declares {} entries, more than its {} byte chunk holds",
                id,
                entry_count,
                chunk.len()
            )));
        }

        let mut offsets = Vec::with_capacity(entry_count as usize);
        for i in 0..entry_count as usize {
            if flags & TYPE_FLAG_SPARSE != 0 {
                let pos = header_size + i * 4;
                let index = u16_at(chunk, pos)?;
                let offset = u16_at(chunk, pos + 2)? as usize * 4;
                offsets.push((index, offset));
            } else if flags & TYPE_FLAG_OFFSET16 != 0 {
                let offset = u16_at(chunk, header_size + i * 2)?;
                if offset != NO_ENTRY16 {
                    offsets.push((i as u16, offset as usize * 4));
                }
            } else {
                let offset = u32_at(chunk, header_size + i * 4)?;
                if offset != NO_ENTRY {
                    offsets.push((i as u16, offset as usize));
                }
            }
        }

        let entries = offsets
            .into_iter()
            .map(|(index, offset)| {
                let pos = entries_start + offset;
                let entry_flags = u16_at(chunk, pos + 2)?;
                let (key, key_offset, key_width) = if entry_flags & ENTRY_FLAG_COMPACT != 0 {
                    (u16_at(chunk, pos)? as u32, pos, KeyWidth::U16)
                } else {
                    (u32_at(chunk, pos + 4)?, pos + 4, KeyWidth::U32)
                };
                Ok(EntryRef {
                    index,
                    offset: pos,
                    flags: entry_flags,
                    key,
                    key_offset,
                    key_width,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id,
            flags,
            entry_count,
            entries,
        })
    }

    /// Walk the value records of one entry.
    pub fn entry_value(&self, chunk: &[u8], entry: &EntryRef) -> Result<EntryValue> {
        let pos = entry.offset;
        if entry.is_compact() {
            return Ok(EntryValue::Simple(ResValue {
                data_type: (entry.flags >> 8) as u8,
                data: u32_at(chunk, pos + 4)?,
            }));
        }

        let entry_size = u16_at(chunk, pos)? as usize;
        if !entry.is_complex() {
            return Ok(EntryValue::Simple(read_res_value(chunk, pos + entry_size)?.0));
        }

        let parent = u32_at(chunk, pos + 8)?;
        let count = u32_at(chunk, pos + 12)?;
        let mut cursor = pos + entry_size;
        let mut values = Vec::new();
        for _ in 0..count {
            let name = u32_at(chunk, cursor)?;
            let (value, len) = read_res_value(chunk, cursor + 4)?;
            values.push((name, value));
            cursor += 4 + len;
        }
        Ok(EntryValue::Complex { parent, values })
    }
}

/// Read a `Res_value` at `pos`, returning it with its declared size.
fn read_res_value(chunk: &[u8], pos: usize) -> Result<(ResValue, usize)> {
    let size = u16_at(chunk, pos)? as usize;
    if size < 8 {
        return Err(ResguardError::malformed(format!(
            "value record of {} bytes at offset {}",
            size, pos
        )));
    }
    Ok((
        ResValue {
            data_type: byte_at(chunk, pos + 3)?,
            data: u32_at(chunk, pos + 4)?,
        },
        size,
    ))
}

fn out_of_bounds(pos: usize, len: usize) -> ResguardError {
    ResguardError::malformed(format!(
        "read at offset {} runs past a {} byte chunk",
        pos, len
    ))
}

fn byte_at(chunk: &[u8], pos: usize) -> Result<u8> {
    chunk
        .get(pos)
        .copied()
        .ok_or_else(|| out_of_bounds(pos, chunk.len()))
}

fn u16_at(chunk: &[u8], pos: usize) -> Result<u16> {
    chunk
        .get(pos..pos + 2)
        .map(LE::read_u16)
        .ok_or_else(|| out_of_bounds(pos, chunk.len()))
}

fn u32_at(chunk: &[u8], pos: usize) -> Result<u32> {
    chunk
        .get(pos..pos + 4)
        .map(LE::read_u32)
        .ok_or_else(|| out_of_bounds(pos, chunk.len()))
}

/// Callbacks for [`walk_table`], in stream order.
pub trait TableVisitor {
    fn table(&mut self, _package_count: u32) -> Result<()> {
        Ok(())
    }

    fn table_strings(&mut self, pool: StringPool) -> Result<()>;

    fn package(
        &mut self,
        header: PackageHeader,
        type_names: StringPool,
        spec_names: StringPool,
    ) -> Result<()>;

    fn library(&mut self, _chunk: &[u8]) -> Result<()> {
        Ok(())
    }

    fn type_spec(&mut self, chunk: &[u8]) -> Result<()>;

    fn type_chunk(&mut self, chunk: &[u8]) -> Result<()>;

    /// A chunk this tool does not interpret. Its body is skipped by the walker.
    fn opaque(&mut self, _header: &ChunkHeader) -> Result<()> {
        Ok(())
    }

    fn end_package(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Read the next child of a chunk with `remaining` body bytes left.
fn next_child<R: Read>(reader: &mut R, remaining: &mut u64) -> Result<ChunkHeader> {
    let header = read_header(reader)?
        .ok_or_else(|| ResguardError::malformed("table ends before its declared size"))?;
    let size = u64::from(header.size);
    if header.header_size < ChunkHeader::SIZE as u16
        || u32::from(header.header_size) > header.size
        || size > *remaining
    {
        return Err(ResguardError::malformed(format!(
            "chunk 0x{:04x} (header {}, size {}) does not fit its parent ({} bytes left)",
            header.chunk_type, header.header_size, header.size, remaining
        )));
    }
    *remaining -= size;
    Ok(header)
}

fn read_extra_header<R: Read>(reader: &mut R, header: &ChunkHeader) -> Result<Vec<u8>> {
    let mut raw = vec![0u8; header.extra_header_len() as usize];
    reader.read_exact(&mut raw)?;
    Ok(raw)
}

/// Walk a whole table in stream order: table strings, then for each package
/// its header, type name pool, spec name pool and child chunks.
pub fn walk_table<R: Read, V: TableVisitor>(reader: &mut R, visitor: &mut V) -> Result<()> {
    let table = expect_header(reader, RES_TABLE_TYPE)?;
    let extra = read_extra_header(reader, &table)?;
    let package_count = extra
        .get(0..4)
        .map(LE::read_u32)
        .ok_or_else(|| ResguardError::malformed("table header has no package count"))?;
    visitor.table(package_count)?;

    let mut remaining = table.body_len();
    let mut seen_strings = false;
    while remaining > 0 {
        let header = next_child(reader, &mut remaining)?;
        match header.chunk_type {
            RES_STRING_POOL_TYPE if !seen_strings => {
                seen_strings = true;
                visitor.table_strings(StringPool::read_body(reader, &header)?)?;
            }
            RES_TABLE_PACKAGE_TYPE => {
                if !seen_strings {
                    return Err(ResguardError::malformed(
                        "package chunk before the table string pool",
                    ));
                }
                walk_package(reader, &header, visitor)?;
            }
            _ => {
                visitor.opaque(&header)?;
                skip_bytes(reader, u64::from(header.size) - ChunkHeader::SIZE as u64)?;
            }
        }
    }
    Ok(())
}

fn walk_package<R: Read, V: TableVisitor>(
    reader: &mut R,
    header: &ChunkHeader,
    visitor: &mut V,
) -> Result<()> {
    let package_header = PackageHeader::parse(&read_extra_header(reader, header)?)?;
    let mut remaining = header.body_len();

    let pool_header = next_child(reader, &mut remaining)?;
    let type_names = StringPool::read_body(reader, &pool_header)?;
    let pool_header = next_child(reader, &mut remaining)?;
    let spec_names = StringPool::read_body(reader, &pool_header)?;
    visitor.package(package_header, type_names, spec_names)?;

    while remaining > 0 {
        let child = next_child(reader, &mut remaining)?;
        match child.chunk_type {
            RES_TABLE_LIBRARY_TYPE => visitor.library(&read_chunk_body(reader, &child)?)?,
            RES_TABLE_TYPE_SPEC_TYPE => visitor.type_spec(&read_chunk_body(reader, &child)?)?,
            RES_TABLE_TYPE_TYPE => visitor.type_chunk(&read_chunk_body(reader, &child)?)?,
            _ => {
                visitor.opaque(&child)?;
                skip_bytes(reader, u64::from(child.size) - ChunkHeader::SIZE as u64)?;
            }
        }
    }
    visitor.end_package()
}
