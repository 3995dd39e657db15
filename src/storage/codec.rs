//! Data block codec
//!
//! Decodes one on-disk block region into typed samples. Pure transform over
//! a byte buffer: callers supply already-read bytes, the codec never touches
//! a file.
//!
//! Layout (all integers little-endian):
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ HEADER (variable)                            │
//! │   magic: [u8; 4] = "CABL"                    │
//! │   version: u16                               │
//! │   name: u16 len + bytes                      │
//! │   field_type: u8                             │
//! │   element_count: u16                         │
//! │   sample_count: u32                          │
//! │   start, end: (i64 secs, u32 nanos) each     │
//! │   unit: u16 len + bytes                      │
//! │   status dict: u16 count, then len + bytes   │
//! │   header_crc: u32                            │
//! ├──────────────────────────────────────────────┤
//! │ RECORDS (sample_count × fixed width)         │
//! │   secs: i64, nanos: u32                      │
//! │   status: u16, severity: u16                 │
//! │   value: element_count × element width       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Every structural mismatch maps to `BlockCorrupt { reason, offset }`; the
//! caller decides whether to skip the block or degrade the channel. Reads
//! are bounds-checked, so a truncated or hostile buffer can never take the
//! decoder out of bounds.

use crate::error::{ArchiveError, ArchiveResult};
use crate::storage::types::{FieldType, Sample, Time, TimeRange, Value};

/// Magic bytes identifying a data block
pub const BLOCK_MAGIC: [u8; 4] = *b"CABL";

/// Current block format version
pub const BLOCK_VERSION: u16 = 1;

/// Fixed width of the per-record prefix: secs + nanos + status + severity
pub const RECORD_PREFIX_SIZE: usize = 8 + 4 + 2 + 2;

/// Width of one string cell (NUL padded)
pub const STRING_CELL_SIZE: usize = 40;

/// Upper bound on array width; anything larger is treated as corruption
pub const MAX_ELEMENT_COUNT: u16 = 4096;

/// A fully decoded block
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    /// Channel identity tag from the header
    pub name: String,
    /// Element type of each value
    pub field_type: FieldType,
    /// Elements per sample (1 = scalar)
    pub element_count: u16,
    /// Declared coverage, half-open; bounds every decoded timestamp
    pub declared: TimeRange,
    /// Engineering unit label
    pub unit: String,
    /// Status / enum-state lookup strings
    pub status_dict: Vec<String>,
    /// Decoded samples, non-decreasing in time
    pub samples: Vec<Sample>,
}

/// Bounds-checked reader over a block buffer. Every read that would run past
/// the end fails with `BlockCorrupt` carrying the current offset.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> ArchiveResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(ArchiveError::block(
                self.pos,
                format!("buffer exhausted: need {} bytes, {} left", n, self.remaining()),
            ));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> ArchiveResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> ArchiveResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> ArchiveResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i16(&mut self) -> ArchiveResult<i16> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    fn read_i32(&mut self) -> ArchiveResult<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i64(&mut self) -> ArchiveResult<i64> {
        let b = self.take(8)?;
        Ok(i64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_f64(&mut self) -> ArchiveResult<f64> {
        let b = self.take(8)?;
        Ok(f64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_time(&mut self) -> ArchiveResult<Time> {
        let at = self.pos;
        let secs = self.read_i64()?;
        let nanos = self.read_u32()?;
        if nanos >= 1_000_000_000 {
            return Err(ArchiveError::block(
                at,
                format!("nanoseconds out of range: {}", nanos),
            ));
        }
        Ok(Time { secs, nanos })
    }

    /// Length-prefixed UTF-8 string (u16 length)
    fn read_string(&mut self) -> ArchiveResult<String> {
        let at = self.pos;
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| ArchiveError::block(at, "invalid UTF-8 in string field"))
    }

    /// Fixed-width NUL-padded string cell; undecodable bytes are replaced
    fn read_string_cell(&mut self) -> ArchiveResult<String> {
        let bytes = self.take(STRING_CELL_SIZE)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

/// Byte width of one packed record for the given shape
pub fn record_width(field_type: FieldType, element_count: u16) -> usize {
    RECORD_PREFIX_SIZE + field_type.element_width() * element_count as usize
}

/// Decode a complete block region.
///
/// When `expected_name` is given, a header naming a different channel fails
/// as corruption; the index pointed the caller at the wrong region.
pub fn decode_block(buf: &[u8], expected_name: Option<&str>) -> ArchiveResult<DataBlock> {
    let mut cur = Cursor::new(buf);

    let magic = cur.take(4)?;
    if magic != BLOCK_MAGIC {
        return Err(ArchiveError::block(0, "bad block magic"));
    }
    let version = cur.read_u16()?;
    if version != BLOCK_VERSION {
        return Err(ArchiveError::block(
            4,
            format!("unsupported block version: {}", version),
        ));
    }

    let name = cur.read_string()?;
    if let Some(expected) = expected_name {
        if name != expected {
            return Err(ArchiveError::block(
                6,
                format!("block belongs to channel '{}', expected '{}'", name, expected),
            ));
        }
    }

    let ft_at = cur.pos;
    let raw_type = cur.read_u8()?;
    let field_type = FieldType::try_from(raw_type)
        .map_err(|t| ArchiveError::block(ft_at, format!("unknown field type: {}", t)))?;

    let ec_at = cur.pos;
    let element_count = cur.read_u16()?;
    if element_count == 0 || element_count > MAX_ELEMENT_COUNT {
        return Err(ArchiveError::block(
            ec_at,
            format!("element count out of range: {}", element_count),
        ));
    }
    if element_count > 1 && matches!(field_type, FieldType::Enum | FieldType::Str) {
        return Err(ArchiveError::block(
            ec_at,
            "enum and string channels must be scalar",
        ));
    }

    let sample_count = cur.read_u32()?;

    let range_at = cur.pos;
    let start = cur.read_time()?;
    let end = cur.read_time()?;
    let declared = TimeRange::try_new(start, end)
        .ok_or_else(|| ArchiveError::block(range_at, "declared time range is empty"))?;

    let unit = cur.read_string()?;

    let dict_count = cur.read_u16()? as usize;
    let mut status_dict = Vec::with_capacity(dict_count.min(256));
    for _ in 0..dict_count {
        status_dict.push(cur.read_string()?);
    }

    let crc_at = cur.pos;
    let stored_crc = cur.read_u32()?;
    let computed_crc = crc32fast::hash(&buf[..crc_at]);
    if stored_crc != computed_crc {
        return Err(ArchiveError::block(
            crc_at,
            format!(
                "header checksum mismatch: stored={:#010x}, computed={:#010x}",
                stored_crc, computed_crc
            ),
        ));
    }

    // The record region must match the declared count exactly; trailing
    // bytes mean the header lies about what this region holds.
    let width = record_width(field_type, element_count);
    let expected_len = sample_count as usize * width;
    if cur.remaining() != expected_len {
        return Err(ArchiveError::block(
            cur.pos,
            format!(
                "record region is {} bytes, header declares {} samples ({} bytes)",
                cur.remaining(),
                sample_count,
                expected_len
            ),
        ));
    }

    let mut samples = Vec::with_capacity(sample_count as usize);
    let mut prev_time: Option<Time> = None;
    for _ in 0..sample_count {
        let rec_at = cur.pos;
        let time = cur.read_time()?;
        let status = cur.read_u16()?;
        let severity = cur.read_u16()?;
        let value = decode_value(&mut cur, field_type, element_count)?;

        if let Some(prev) = prev_time {
            if time < prev {
                return Err(ArchiveError::block(
                    rec_at,
                    format!("timestamps regress: {} after {}", time, prev),
                ));
            }
        }
        if time < declared.start || time >= declared.end {
            return Err(ArchiveError::block(
                rec_at,
                format!("sample at {} outside declared range", time),
            ));
        }
        if !status_dict.is_empty() && (status as usize) >= status_dict.len() {
            return Err(ArchiveError::block(
                rec_at,
                format!("status index {} outside dictionary", status),
            ));
        }
        prev_time = Some(time);
        samples.push(Sample {
            time,
            value,
            status,
            severity,
        });
    }

    Ok(DataBlock {
        name,
        field_type,
        element_count,
        declared,
        unit,
        status_dict,
        samples,
    })
}

fn decode_value(
    cur: &mut Cursor<'_>,
    field_type: FieldType,
    element_count: u16,
) -> ArchiveResult<Value> {
    let n = element_count as usize;
    match field_type {
        FieldType::Double => {
            if n == 1 {
                Ok(Value::Double(cur.read_f64()?))
            } else {
                let mut v = Vec::with_capacity(n);
                for _ in 0..n {
                    v.push(cur.read_f64()?);
                }
                Ok(Value::DoubleArray(v))
            }
        }
        FieldType::Int32 => {
            if n == 1 {
                Ok(Value::Int(cur.read_i32()?))
            } else {
                let mut v = Vec::with_capacity(n);
                for _ in 0..n {
                    v.push(cur.read_i32()?);
                }
                Ok(Value::IntArray(v))
            }
        }
        FieldType::Int16 => {
            if n == 1 {
                Ok(Value::Int(cur.read_i16()? as i32))
            } else {
                let mut v = Vec::with_capacity(n);
                for _ in 0..n {
                    v.push(cur.read_i16()? as i32);
                }
                Ok(Value::IntArray(v))
            }
        }
        FieldType::UInt8 => {
            if n == 1 {
                Ok(Value::Int(cur.read_u8()? as i32))
            } else {
                let mut v = Vec::with_capacity(n);
                for _ in 0..n {
                    v.push(cur.read_u8()? as i32);
                }
                Ok(Value::IntArray(v))
            }
        }
        FieldType::Enum => Ok(Value::Enum(cur.read_u16()?)),
        FieldType::Str => Ok(Value::Str(cur.read_string_cell()?)),
    }
}
