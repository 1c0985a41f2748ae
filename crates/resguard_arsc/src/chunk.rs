use binrw::{binrw, BinRead, BinWrite};
use std::io::{self, Cursor, Read, Seek, Write};

use crate::error::{ResguardError, Result};

pub const RES_NULL_TYPE: u16 = 0x0000;
pub const RES_STRING_POOL_TYPE: u16 = 0x0001;
pub const RES_TABLE_TYPE: u16 = 0x0002;
pub const RES_TABLE_PACKAGE_TYPE: u16 = 0x0200;
pub const RES_TABLE_TYPE_TYPE: u16 = 0x0201;
pub const RES_TABLE_TYPE_SPEC_TYPE: u16 = 0x0202;
pub const RES_TABLE_LIBRARY_TYPE: u16 = 0x0203;

/// The prologue shared by every chunk of a resource table.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkHeader {
    pub chunk_type: u16,
    pub header_size: u16,
    /// Total chunk size, header included.
    pub size: u32,
}

impl ChunkHeader {
    pub const SIZE: usize = 8;

    pub fn new(chunk_type: u16, header_size: u16, size: u32) -> Self {
        Self {
            chunk_type,
            header_size,
            size,
        }
    }

    /// Returns a copy of this header with `size_delta` subtracted from its size.
    ///
    /// A non-positive result means the caller's byte accounting is broken.
    pub fn shrunk_by(&self, size_delta: i64) -> Result<Self> {
        let size = i64::from(self.size) - size_delta;
        if size <= 0 || size > i64::from(u32::MAX) {
            return Err(ResguardError::malformed(format!(
                "chunk 0x{:04x} size {} adjusted by {} is out of range",
                self.chunk_type, self.size, size_delta
            )));
        }
        Ok(Self {
            size: size as u32,
            ..*self
        })
    }

    /// Fail unless this header has the expected type.
    pub fn expect(&self, chunk_type: u16) -> Result<()> {
        if self.chunk_type != chunk_type {
            return Err(ResguardError::malformed(format!(
                "expected chunk 0x{:04x}, found 0x{:04x}",
                chunk_type, self.chunk_type
            )));
        }
        Ok(())
    }

    /// Bytes that follow the 8-byte prologue but still belong to the header.
    pub fn extra_header_len(&self) -> u64 {
        u64::from(self.header_size).saturating_sub(Self::SIZE as u64)
    }

    /// Bytes that follow the whole header up to the end of the chunk.
    pub fn body_len(&self) -> u64 {
        u64::from(self.size).saturating_sub(u64::from(self.header_size))
    }

    pub fn write_to<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        self.write(writer)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut raw = [0u8; Self::SIZE];
        raw[0..2].copy_from_slice(&self.chunk_type.to_le_bytes());
        raw[2..4].copy_from_slice(&self.header_size.to_le_bytes());
        raw[4..8].copy_from_slice(&self.size.to_le_bytes());
        raw
    }
}

/// Read the next chunk header.
///
/// Chunk sequences carry no count at the container level, so a clean end of
/// stream is not an error: it yields `None`. A header cut short is malformed.
pub fn read_header<R: Read>(reader: &mut R) -> Result<Option<ChunkHeader>> {
    let mut raw = [0u8; ChunkHeader::SIZE];
    let mut filled = 0;
    while filled < raw.len() {
        match reader.read(&mut raw[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    match filled {
        0 => Ok(None),
        ChunkHeader::SIZE => Ok(Some(ChunkHeader::read(&mut Cursor::new(&raw[..]))?)),
        _ => Err(ResguardError::malformed("truncated chunk header")),
    }
}

/// Read a header that must exist and must have the given type.
pub fn expect_header<R: Read>(reader: &mut R, chunk_type: u16) -> Result<ChunkHeader> {
    let header = read_header(reader)?.ok_or_else(|| {
        ResguardError::malformed(format!(
            "unexpected end of table, expected chunk 0x{:04x}",
            chunk_type
        ))
    })?;
    header.expect(chunk_type)?;
    Ok(header)
}

/// Read one header and write it back with its size reduced by `size_delta`.
///
/// Returns the header as it was read.
pub fn copy_header<R: Read, W: Write + Seek>(
    reader: &mut R,
    writer: &mut W,
    size_delta: i64,
) -> Result<Option<ChunkHeader>> {
    let Some(header) = read_header(reader)? else {
        return Ok(None);
    };
    header.shrunk_by(size_delta)?.write_to(writer)?;
    Ok(Some(header))
}

/// Copy exactly `len` bytes from `reader` to `writer`.
pub fn copy_bytes<R: Read, W: Write>(reader: &mut R, writer: &mut W, len: u64) -> Result<()> {
    let copied = io::copy(&mut reader.by_ref().take(len), writer)?;
    if copied != len {
        return Err(ResguardError::malformed(format!(
            "unexpected end of table, wanted {} bytes and got {}",
            len, copied
        )));
    }
    Ok(())
}

/// Skip exactly `len` bytes of `reader`.
pub fn skip_bytes<R: Read>(reader: &mut R, len: u64) -> Result<()> {
    copy_bytes(reader, &mut io::sink(), len)
}

/// Read the remainder of a chunk whose header was already consumed, returning
/// the whole chunk (header included) as one buffer.
pub fn read_chunk_body<R: Read>(reader: &mut R, header: &ChunkHeader) -> Result<Vec<u8>> {
    if (header.size as usize) < ChunkHeader::SIZE || header.header_size as u32 > header.size {
        return Err(ResguardError::malformed(format!(
            "chunk 0x{:04x} declares header {} and size {}",
            header.chunk_type, header.header_size, header.size
        )));
    }
    let mut chunk = vec![0u8; header.size as usize];
    chunk[..ChunkHeader::SIZE].copy_from_slice(&header.to_bytes());
    reader
        .read_exact(&mut chunk[ChunkHeader::SIZE..])
        .map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => ResguardError::malformed(format!(
                "chunk 0x{:04x} runs past the end of the table",
                header.chunk_type
            )),
            _ => e.into(),
        })?;
    Ok(chunk)
}
