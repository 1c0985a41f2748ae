//! String pool codec.
//!
//! On-disk layout, all integers little-endian:
//!
//! ```text
//! chunk header (type 0x0001, header size 28)
//! u32 string_count, u32 style_count, u32 flags, u32 strings_start, u32 styles_start
//! u32[string_count] string offsets (relative to strings_start)
//! u32[style_count]  style offsets  (relative to styles_start)
//! string bytes, zero padded to 4
//! style bytes
//! ```
//!
//! UTF-8 strings carry two var-length prefixes (UTF-16 length, then byte
//! length; one byte, or two with the high bit set) and a NUL terminator.
//! UTF-16 strings carry one u16 length (or two with bit 0x8000 set) and a
//! u16 NUL terminator.

use byteorder::{ByteOrder, WriteBytesExt, LE};
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::ops::Range;

use crate::chunk::{read_chunk_body, ChunkHeader, RES_STRING_POOL_TYPE};
use crate::error::{ResguardError, Result};

pub const SORTED_FLAG: u32 = 0x1;
pub const UTF8_FLAG: u32 = 0x100;

const POOL_HEADER_SIZE: usize = 28;

/// A decoded string pool chunk, holding on to its original bytes so untouched
/// strings can be copied without re-encoding.
#[derive(Debug, Clone)]
pub struct StringPool {
    raw: Vec<u8>,
    flags: u32,
    string_offsets: Vec<u32>,
    style_offsets: Vec<u32>,
    strings: Range<usize>,
    styles: Range<usize>,
}

impl StringPool {
    /// Read a pool whose chunk header was already consumed.
    pub fn read_body<R: Read>(reader: &mut R, header: &ChunkHeader) -> Result<Self> {
        header.expect(RES_STRING_POOL_TYPE)?;
        Self::parse(read_chunk_body(reader, header)?)
    }

    pub fn parse(raw: Vec<u8>) -> Result<Self> {
        if raw.len() < POOL_HEADER_SIZE {
            return Err(ResguardError::malformed("string pool shorter than its header"));
        }
        let chunk_type = LE::read_u16(&raw[0..2]);
        if chunk_type != RES_STRING_POOL_TYPE {
            return Err(ResguardError::malformed(format!(
                "expected string pool, found chunk 0x{:04x}",
                chunk_type
            )));
        }

        let header_size = LE::read_u16(&raw[2..4]) as usize;
        let size = raw.len();
        let string_count = LE::read_u32(&raw[8..12]) as usize;
        let style_count = LE::read_u32(&raw[12..16]) as usize;
        let flags = LE::read_u32(&raw[16..20]);
        let strings_start = LE::read_u32(&raw[20..24]) as usize;
        let styles_start = LE::read_u32(&raw[24..28]) as usize;

        let offsets_end = (string_count as u64 + style_count as u64)
            .checked_mul(4)
            .and_then(|len| len.checked_add(header_size as u64))
            .filter(|&end| header_size >= POOL_HEADER_SIZE && end <= size as u64)
            .ok_or_else(|| ResguardError::malformed("string pool offset table out of bounds"))?
            as usize;

        let read_offsets = |from: usize, count: usize| -> Vec<u32> {
            (0..count)
                .map(|i| LE::read_u32(&raw[from + i * 4..from + i * 4 + 4]))
                .collect()
        };
        let string_offsets = read_offsets(header_size, string_count);
        let style_offsets = read_offsets(header_size + string_count * 4, style_count);

        let strings = if string_count == 0 {
            offsets_end..offsets_end
        } else {
            let end = if style_count > 0 && styles_start != 0 {
                styles_start
            } else {
                size
            };
            if strings_start < offsets_end || strings_start > end || end > size {
                return Err(ResguardError::malformed(format!(
                    "string data range {}..{} is outside the pool ({} bytes)",
                    strings_start, end, size
                )));
            }
            strings_start..end
        };
        if strings.len() % 4 != 0 {
            return Err(ResguardError::malformed(format!(
                "string data length {} is not a multiple of 4",
                strings.len()
            )));
        }

        let styles = if style_count == 0 {
            size..size
        } else {
            if styles_start < strings.end || styles_start > size {
                return Err(ResguardError::malformed("style data range is outside the pool"));
            }
            styles_start..size
        };

        Ok(Self {
            raw,
            flags,
            string_offsets,
            style_offsets,
            strings,
            styles,
        })
    }

    pub fn is_utf8(&self) -> bool {
        self.flags & UTF8_FLAG != 0
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn len(&self) -> usize {
        self.string_offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.string_offsets.is_empty()
    }

    pub fn style_count(&self) -> usize {
        self.style_offsets.len()
    }

    /// Size of the whole chunk as read.
    pub fn chunk_size(&self) -> usize {
        self.raw.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Decode the string at `index`.
    pub fn get(&self, index: usize) -> Result<String> {
        let (value, _) = self.decode_at(index)?;
        Ok(value)
    }

    /// Decode every string of the pool in index order.
    pub fn strings(&self) -> Result<Vec<String>> {
        (0..self.len()).map(|index| self.get(index)).collect()
    }

    /// The encoded bytes of one string: length prefix, payload and terminator.
    pub fn encoded_entry(&self, index: usize) -> Result<&[u8]> {
        let start = self.string_offset(index)?;
        let (_, end) = self.decode_at(index)?;
        Ok(&self.string_data()[start..end])
    }

    fn string_data(&self) -> &[u8] {
        &self.raw[self.strings.clone()]
    }

    fn style_data(&self) -> &[u8] {
        &self.raw[self.styles.clone()]
    }

    fn string_offset(&self, index: usize) -> Result<usize> {
        self.string_offsets
            .get(index)
            .map(|&offset| offset as usize)
            .ok_or_else(|| {
                ResguardError::malformed(format!(
                    "string index {} out of range ({} strings)",
                    index,
                    self.len()
                ))
            })
    }

    /// Decode one string, also returning the offset just past its terminator.
    fn decode_at(&self, index: usize) -> Result<(String, usize)> {
        let offset = self.string_offset(index)?;
        let data = self.string_data();
        if self.is_utf8() {
            decode_utf8(data, offset)
        } else {
            decode_utf16(data, offset)
        }
    }

    /// Serialize a freshly generated pool made of exactly `names`, in order,
    /// keeping this pool's encoding. `index_out` receives each name's index.
    ///
    /// Returns the size delta (old chunk size minus new chunk size).
    pub fn write_replacement_set<W: Write, S: AsRef<str>>(
        &self,
        names: &[S],
        index_out: &mut HashMap<String, u32>,
        writer: &mut W,
    ) -> Result<i64> {
        for (index, name) in names.iter().enumerate() {
            index_out
                .entry(name.as_ref().to_string())
                .or_insert(index as u32);
        }
        let encoded = encode_pool(names, self.is_utf8())?;
        writer.write_all(&encoded)?;
        Ok(self.raw.len() as i64 - encoded.len() as i64)
    }

    /// Serialize this pool with the strings in `replacements` (keyed by index)
    /// re-encoded and every other string copied byte for byte.
    ///
    /// Returns the size delta (old chunk size minus new chunk size).
    pub fn write_sparse<W: Write>(
        &self,
        replacements: &BTreeMap<u32, String>,
        writer: &mut W,
    ) -> Result<i64> {
        if replacements.is_empty() {
            writer.write_all(&self.raw)?;
            return Ok(0);
        }

        let utf8 = self.is_utf8();
        let mut data = Vec::with_capacity(self.strings.len());
        let mut offsets = Vec::with_capacity(self.len());
        for index in 0..self.len() {
            offsets.push(data.len() as u32);
            match replacements.get(&(index as u32)) {
                Some(value) => encode_string(value, utf8, &mut data)?,
                None => data.extend_from_slice(self.encoded_entry(index)?),
            }
        }

        let encoded = assemble(
            self.flags & !SORTED_FLAG,
            &offsets,
            &self.style_offsets,
            data,
            self.style_data(),
        )?;
        writer.write_all(&encoded)?;
        Ok(self.raw.len() as i64 - encoded.len() as i64)
    }
}

/// Encode a style-less pool holding `strings` in order.
pub fn encode_pool<S: AsRef<str>>(strings: &[S], utf8: bool) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut offsets = Vec::with_capacity(strings.len());
    for value in strings {
        offsets.push(data.len() as u32);
        encode_string(value.as_ref(), utf8, &mut data)?;
    }
    let flags = if utf8 { UTF8_FLAG } else { 0 };
    assemble(flags, &offsets, &[], data, &[])
}

fn assemble(
    flags: u32,
    string_offsets: &[u32],
    style_offsets: &[u32],
    mut string_data: Vec<u8>,
    style_data: &[u8],
) -> Result<Vec<u8>> {
    string_data.resize(string_data.len().next_multiple_of(4), 0);

    let offsets_len = (string_offsets.len() + style_offsets.len()) * 4;
    let strings_start = POOL_HEADER_SIZE + offsets_len;
    let styles_start = if style_offsets.is_empty() {
        0
    } else {
        strings_start + string_data.len()
    };
    let size = strings_start + string_data.len() + style_data.len();
    let size = u32::try_from(size)
        .map_err(|_| ResguardError::malformed("string pool exceeds 4 GiB"))?;

    let mut out = Vec::with_capacity(size as usize);
    out.extend_from_slice(
        &ChunkHeader::new(RES_STRING_POOL_TYPE, POOL_HEADER_SIZE as u16, size).to_bytes(),
    );
    out.write_u32::<LE>(string_offsets.len() as u32)?;
    out.write_u32::<LE>(style_offsets.len() as u32)?;
    out.write_u32::<LE>(flags)?;
    out.write_u32::<LE>(strings_start as u32)?;
    out.write_u32::<LE>(styles_start as u32)?;
    for &offset in string_offsets.iter().chain(style_offsets) {
        out.write_u32::<LE>(offset)?;
    }
    out.extend_from_slice(&string_data);
    out.extend_from_slice(style_data);
    Ok(out)
}

fn encode_string(value: &str, utf8: bool, out: &mut Vec<u8>) -> Result<()> {
    if utf8 {
        write_utf8_len(out, value.encode_utf16().count())?;
        write_utf8_len(out, value.len())?;
        out.extend_from_slice(value.as_bytes());
        out.push(0);
    } else {
        let units: Vec<u16> = value.encode_utf16().collect();
        write_utf16_len(out, units.len())?;
        for unit in units {
            out.write_u16::<LE>(unit)?;
        }
        out.write_u16::<LE>(0)?;
    }
    Ok(())
}

fn write_utf8_len(out: &mut Vec<u8>, len: usize) -> Result<()> {
    if len > 0x7fff {
        return Err(ResguardError::malformed(format!(
            "string of length {} does not fit a UTF-8 pool",
            len
        )));
    }
    if len > 0x7f {
        out.push(((len >> 8) as u8) | 0x80);
        out.push((len & 0xff) as u8);
    } else {
        out.push(len as u8);
    }
    Ok(())
}

fn write_utf16_len(out: &mut Vec<u8>, len: usize) -> Result<()> {
    if len > 0x7fff_ffff {
        return Err(ResguardError::malformed(format!(
            "string of length {} does not fit a UTF-16 pool",
            len
        )));
    }
    if len > 0x7fff {
        out.write_u16::<LE>(((len >> 16) as u16) | 0x8000)?;
        out.write_u16::<LE>((len & 0xffff) as u16)?;
    } else {
        out.write_u16::<LE>(len as u16)?;
    }
    Ok(())
}

fn out_of_bounds(offset: usize) -> ResguardError {
    ResguardError::malformed(format!("string at offset {} runs past the pool", offset))
}

fn read_utf8_len(data: &[u8], pos: usize) -> Result<(usize, usize)> {
    let first = *data.get(pos).ok_or_else(|| out_of_bounds(pos))?;
    if first & 0x80 != 0 {
        let second = *data.get(pos + 1).ok_or_else(|| out_of_bounds(pos))?;
        Ok(((((first & 0x7f) as usize) << 8) | second as usize, pos + 2))
    } else {
        Ok((first as usize, pos + 1))
    }
}

fn read_u16_at(data: &[u8], pos: usize) -> Result<u16> {
    data.get(pos..pos + 2)
        .map(LE::read_u16)
        .ok_or_else(|| out_of_bounds(pos))
}

fn decode_utf8(data: &[u8], offset: usize) -> Result<(String, usize)> {
    let (_utf16_len, pos) = read_utf8_len(data, offset)?;
    let (byte_len, pos) = read_utf8_len(data, pos)?;
    let end = pos + byte_len;
    let bytes = data
        .get(pos..end)
        .filter(|_| end < data.len())
        .ok_or_else(|| out_of_bounds(offset))?;
    Ok((String::from_utf8_lossy(bytes).into_owned(), end + 1))
}

fn decode_utf16(data: &[u8], offset: usize) -> Result<(String, usize)> {
    let first = read_u16_at(data, offset)?;
    let (len, pos) = if first & 0x8000 != 0 {
        let second = read_u16_at(data, offset + 2)?;
        ((((first & 0x7fff) as usize) << 16) | second as usize, offset + 4)
    } else {
        (first as usize, offset + 2)
    };
    let end = pos + len * 2;
    let bytes = data
        .get(pos..end)
        .filter(|_| end + 2 <= data.len())
        .ok_or_else(|| out_of_bounds(offset))?;
    let units: Vec<u16> = bytes.chunks_exact(2).map(LE::read_u16).collect();
    Ok((String::from_utf16_lossy(&units), end + 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn pool_of(strings: &[&str], utf8: bool) -> StringPool {
        StringPool::parse(encode_pool(strings, utf8).unwrap()).unwrap()
    }

    #[test]
    fn test_decode_both_encodings() {
        for utf8 in [true, false] {
            let pool = pool_of(&["res/drawable/icon.png", "", "héllo"], utf8);
            assert_eq!(pool.is_utf8(), utf8);
            assert_eq!(pool.len(), 3);
            assert_eq!(pool.get(0).unwrap(), "res/drawable/icon.png");
            assert_eq!(pool.get(1).unwrap(), "");
            assert_eq!(pool.get(2).unwrap(), "héllo");
            assert_eq!(pool.chunk_size() % 4, 0);
        }
    }

    #[test]
    fn test_long_strings_use_two_byte_lengths() {
        let long = "x".repeat(300);
        let pool = pool_of(&[long.as_str()], true);
        // 2 + 2 length bytes, 300 payload bytes, terminator
        assert_eq!(pool.encoded_entry(0).unwrap().len(), 305);
        assert_eq!(pool.get(0).unwrap(), long);

        let wide = "y".repeat(0x8001);
        let pool = pool_of(&[wide.as_str()], false);
        assert_eq!(pool.encoded_entry(0).unwrap().len(), 4 + 0x8001 * 2 + 2);
        assert_eq!(pool.get(0).unwrap(), wide);
    }

    #[test]
    fn test_utf8_rejects_oversized_string() {
        let huge = "z".repeat(0x8000);
        assert!(encode_pool(&[huge.as_str()], true).is_err());
    }

    #[test]
    fn test_sparse_without_replacements_is_verbatim() {
        let pool = pool_of(&["a", "bb", "ccc"], false);
        let mut out = Vec::new();
        let delta = pool.write_sparse(&BTreeMap::new(), &mut out).unwrap();
        assert_eq!(delta, 0);
        assert_eq!(out, pool.as_bytes());
    }

    #[test]
    fn test_sparse_replaces_by_index() {
        let pool = pool_of(
            &["res/drawable/icon_a.png", "hello", "res/layout/main.xml"],
            true,
        );
        let replacements = BTreeMap::from([
            (0, "r/a/a.png".to_string()),
            (2, "r/b/a.xml".to_string()),
        ]);
        let mut out = Vec::new();
        let delta = pool.write_sparse(&replacements, &mut out).unwrap();

        let rewritten = StringPool::parse(out.clone()).unwrap();
        assert_eq!(
            rewritten.strings().unwrap(),
            vec!["r/a/a.png", "hello", "r/b/a.xml"]
        );
        assert_eq!(rewritten.encoded_entry(1).unwrap(), pool.encoded_entry(1).unwrap());
        assert_eq!(delta, pool.chunk_size() as i64 - out.len() as i64);
        assert_eq!(out.len() % 4, 0);
    }

    #[test]
    fn test_sparse_keeps_style_block() {
        let strings = ["res/drawable/icon_a.png", "hello", "b"];
        let mut data = Vec::new();
        let mut offsets = Vec::new();
        for value in strings {
            offsets.push(data.len() as u32);
            encode_string(value, true, &mut data).unwrap();
        }
        // one span: tag "b" over chars 0..=3 of "hello", then the end markers
        let mut style_data = Vec::new();
        for word in [2u32, 0, 3, 0xFFFF_FFFF, 0xFFFF_FFFF, 0xFFFF_FFFF] {
            style_data.write_u32::<LE>(word).unwrap();
        }
        let raw = assemble(UTF8_FLAG, &offsets, &[0], data, &style_data).unwrap();
        let pool = StringPool::parse(raw).unwrap();
        assert_eq!(pool.style_count(), 1);

        let replacements = BTreeMap::from([(0, "r/a/a.png".to_string())]);
        let mut out = Vec::new();
        let delta = pool.write_sparse(&replacements, &mut out).unwrap();

        let rewritten = StringPool::parse(out.clone()).unwrap();
        assert_eq!(rewritten.style_count(), 1);
        assert_eq!(rewritten.strings().unwrap(), vec!["r/a/a.png", "hello", "b"]);
        assert!(out.ends_with(&style_data));
        assert_eq!(LE::read_u32(&out[24..28]) as usize, out.len() - style_data.len());
        assert_eq!(delta, pool.chunk_size() as i64 - out.len() as i64);
        assert!(delta > 0);
    }

    #[test]
    fn test_replacement_set_fills_index_map() {
        let pool = pool_of(&["icon_a", "icon_b", "app_name"], false);
        let mut index = HashMap::new();
        let mut out = Cursor::new(Vec::new());
        let delta = pool
            .write_replacement_set(&["a", "b", "app_name"], &mut index, &mut out)
            .unwrap();

        let out = out.into_inner();
        let rewritten = StringPool::parse(out.clone()).unwrap();
        assert!(!rewritten.is_utf8());
        assert_eq!(rewritten.strings().unwrap(), vec!["a", "b", "app_name"]);
        assert_eq!(index.get("b"), Some(&1));
        assert_eq!(index.get("app_name"), Some(&2));
        assert!(delta > 0);
        assert_eq!(delta, pool.chunk_size() as i64 - out.len() as i64);
    }

    #[test]
    fn test_parse_rejects_misaligned_string_data() {
        let mut raw = encode_pool(&["abc"], true).unwrap();
        // Drop one padding byte and fix the declared size accordingly.
        raw.pop();
        let size = raw.len() as u32;
        raw[4..8].copy_from_slice(&size.to_le_bytes());
        assert!(matches!(
            StringPool::parse(raw),
            Err(ResguardError::MalformedTable(_))
        ));
    }

    #[test]
    fn test_get_out_of_range() {
        let pool = pool_of(&["only"], true);
        assert!(pool.get(1).is_err());
    }
}
