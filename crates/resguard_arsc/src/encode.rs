//! Encode pass: replay the decode walk over the same input, rewriting the
//! string pools and entry keys and patching container sizes afterwards.

use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::chunk::{copy_bytes, copy_header, expect_header, read_chunk_body, ChunkHeader};
use crate::decode::DecodedTable;
use crate::error::{ResguardError, Result};
use crate::plan::{KeyPatch, WalkStep};
use crate::string_pool::StringPool;
use crate::table::KeyWidth;

/// A container header already written whose size is patched once its
/// children are done.
#[derive(Debug, Clone, Copy)]
struct OpenChunk {
    position: u64,
    header: ChunkHeader,
    size_delta: i64,
}

impl OpenChunk {
    fn close<W: Write + Seek>(self, writer: &mut W) -> Result<()> {
        let end = writer.stream_position()?;
        let header = self.header.shrunk_by(self.size_delta)?;
        if end - self.position != u64::from(header.size) {
            return Err(ResguardError::malformed(format!(
                "chunk 0x{:04x} rewritten as {} bytes but accounted as {}",
                header.chunk_type,
                end - self.position,
                header.size
            )));
        }
        writer.seek(SeekFrom::Start(self.position))?;
        header.write_to(writer)?;
        writer.seek(SeekFrom::Start(end))?;
        Ok(())
    }
}

pub(crate) struct TableEncoder<'a> {
    decoded: &'a DecodedTable,
    table: Option<OpenChunk>,
    package: Option<OpenChunk>,
    current_package: usize,
    /// Index of each name in the regenerated spec pool of the current package.
    spec_index: HashMap<String, u32>,
    regenerated: bool,
}

impl<'a> TableEncoder<'a> {
    pub fn new(decoded: &'a DecodedTable) -> Self {
        Self {
            decoded,
            table: None,
            package: None,
            current_package: 0,
            spec_index: HashMap::new(),
            regenerated: false,
        }
    }

    pub fn encode<R: Read, W: Write + Seek>(mut self, reader: &mut R, writer: &mut W) -> Result<()> {
        let decoded = self.decoded;
        for step in decoded.plan.steps() {
            self.step(reader, writer, step)?;
        }

        if let Some(package) = self.package.take() {
            package.close(writer)?;
        }
        let table = self
            .table
            .take()
            .ok_or_else(|| ResguardError::malformed("empty walk plan"))?;
        table.close(writer)?;

        // Anything after the table chunk is carried over untouched.
        io::copy(reader, writer)?;
        Ok(())
    }

    fn step<R: Read, W: Write + Seek>(
        &mut self,
        reader: &mut R,
        writer: &mut W,
        step: &WalkStep,
    ) -> Result<()> {
        match step {
            WalkStep::Table => {
                let header = expect_header(reader, step.chunk_type())?;
                self.table = Some(self.open(reader, writer, header)?);
            }
            WalkStep::TableStrings => {
                let header = expect_header(reader, step.chunk_type())?;
                let pool = StringPool::read_body(reader, &header)?;
                let delta = pool.write_sparse(&self.decoded.table_string_renames, writer)?;
                self.shrink(delta, false);
            }
            WalkStep::Package { index } => {
                let header = expect_header(reader, step.chunk_type())?;
                self.package = Some(self.open(reader, writer, header)?);
                self.current_package = *index;
                self.spec_index.clear();
                self.regenerated = false;
            }
            WalkStep::PackageEnd => {
                let package = self
                    .package
                    .take()
                    .ok_or_else(|| ResguardError::malformed("package end without a package"))?;
                package.close(writer)?;
            }
            WalkStep::SpecNames { package } => {
                let header = expect_header(reader, step.chunk_type())?;
                let res_package = self.decoded.packages.get(*package).ok_or_else(|| {
                    ResguardError::malformed(format!("no decoded package at index {}", package))
                })?;
                if res_package.can_rename && res_package.has_renames() {
                    let pool = StringPool::read_body(reader, &header)?;
                    let delta = pool.write_replacement_set(
                        res_package.spec_names(),
                        &mut self.spec_index,
                        writer,
                    )?;
                    self.shrink(delta, true);
                    self.regenerated = true;
                } else {
                    header.write_to(writer)?;
                    copy_bytes(reader, writer, chunk_body_len(&header))?;
                }
            }
            WalkStep::Type { patches, .. } => {
                let header = expect_header(reader, step.chunk_type())?;
                let mut chunk = read_chunk_body(reader, &header)?;
                if self.regenerated {
                    for patch in patches {
                        self.apply(&mut chunk, patch)?;
                    }
                }
                writer.write_all(&chunk)?;
            }
            WalkStep::TypeNames
            | WalkStep::Library
            | WalkStep::TypeSpec { .. }
            | WalkStep::Opaque { .. } => {
                let header = copy_header(reader, writer, 0)?.ok_or_else(|| {
                    ResguardError::malformed("table ends before its last recorded chunk")
                })?;
                header.expect(step.chunk_type())?;
                copy_bytes(reader, writer, chunk_body_len(&header))?;
            }
        }
        Ok(())
    }

    /// Write a container header as read, copy the rest of its header bytes,
    /// and remember where it starts.
    fn open<R: Read, W: Write + Seek>(
        &self,
        reader: &mut R,
        writer: &mut W,
        header: ChunkHeader,
    ) -> Result<OpenChunk> {
        let position = writer.stream_position()?;
        header.write_to(writer)?;
        copy_bytes(reader, writer, header.extra_header_len())?;
        Ok(OpenChunk {
            position,
            header,
            size_delta: 0,
        })
    }

    fn shrink(&mut self, delta: i64, in_package: bool) {
        if in_package {
            if let Some(package) = self.package.as_mut() {
                package.size_delta += delta;
            }
        }
        if let Some(table) = self.table.as_mut() {
            table.size_delta += delta;
        }
    }

    fn apply(&self, chunk: &mut [u8], patch: &KeyPatch) -> Result<()> {
        let replacement = self
            .decoded
            .packages
            .get(self.current_package)
            .and_then(|package| package.replacement(patch.res_id))
            .ok_or(ResguardError::MissingReplacement(patch.res_id))?;
        let index = *self
            .spec_index
            .get(replacement)
            .ok_or(ResguardError::MissingReplacement(patch.res_id))?;

        let out_of_bounds = || {
            ResguardError::malformed(format!(
                "key of 0x{:08x} at offset {} is outside its type chunk",
                patch.res_id, patch.offset
            ))
        };
        match patch.width {
            KeyWidth::U32 => chunk
                .get_mut(patch.offset..patch.offset + 4)
                .ok_or_else(out_of_bounds)?
                .copy_from_slice(&index.to_le_bytes()),
            KeyWidth::U16 => {
                let index = u16::try_from(index).map_err(|_| {
                    ResguardError::malformed(format!(
                        "spec index {} does not fit a compact entry",
                        index
                    ))
                })?;
                chunk
                    .get_mut(patch.offset..patch.offset + 2)
                    .ok_or_else(out_of_bounds)?
                    .copy_from_slice(&index.to_le_bytes());
            }
        }
        Ok(())
    }
}

fn chunk_body_len(header: &ChunkHeader) -> u64 {
    u64::from(header.size).saturating_sub(ChunkHeader::SIZE as u64)
}
