//! Core data types for the archive read path
//!
//! - `Time`: archive timestamp (seconds + nanoseconds)
//! - `TimeRange`: half-open query interval `[start, end)`
//! - `Value`: sample payload, polymorphic over scalar/array/enum/string shape
//! - `Sample`: one (time, value, status, severity) record
//! - `FieldType`: self-describing element type tag from the block header

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Alarm severities 0..=3; anything with the bookkeeping bits set marks an
/// archiver-internal record (disconnect, archive off) that carries no value.
pub const SEVERITY_INFO_MASK: u16 = 0x0f00;

/// Archiver bookkeeping severities
pub const SEVERITY_DISCONNECTED: u16 = 0x0f10;
pub const SEVERITY_ARCHIVE_OFF: u16 = 0x0f18;
pub const SEVERITY_ARCHIVE_DISABLED: u16 = 0x0f20;

/// Human-readable name for a severity code
pub fn severity_name(severity: u16) -> &'static str {
    match severity {
        0 => "NO_ALARM",
        1 => "MINOR",
        2 => "MAJOR",
        3 => "INVALID",
        SEVERITY_DISCONNECTED => "Disconnected",
        SEVERITY_ARCHIVE_OFF => "Archive_Off",
        SEVERITY_ARCHIVE_DISABLED => "Archive_Disabled",
        _ => "Unknown",
    }
}

/// An archive timestamp: seconds since the Unix epoch plus nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Time {
    pub secs: i64,
    pub nanos: u32,
}

impl Time {
    pub const MIN: Time = Time {
        secs: i64::MIN,
        nanos: 0,
    };
    pub const MAX: Time = Time {
        secs: i64::MAX,
        nanos: 999_999_999,
    };

    /// Create a timestamp; nanoseconds beyond one second carry into seconds
    pub fn new(secs: i64, nanos: u32) -> Self {
        let carry = (nanos / 1_000_000_000) as i64;
        Self {
            secs: secs + carry,
            nanos: nanos % 1_000_000_000,
        }
    }

    /// Whole seconds, zero fraction
    pub fn from_secs(secs: i64) -> Self {
        Self { secs, nanos: 0 }
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            secs: now.timestamp(),
            nanos: now.timestamp_subsec_nanos(),
        }
    }

    /// The smallest representable time strictly after `self`
    pub fn next(self) -> Self {
        if self.nanos == 999_999_999 {
            Self {
                secs: self.secs + 1,
                nanos: 0,
            }
        } else {
            Self {
                secs: self.secs,
                nanos: self.nanos + 1,
            }
        }
    }

    /// Seconds as a float, for display and rough arithmetic only
    pub fn as_secs_f64(self) -> f64 {
        self.secs as f64 + self.nanos as f64 / 1e9
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match chrono::DateTime::from_timestamp(self.secs, self.nanos) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.9f")),
            None => write!(f, "{}s+{}ns", self.secs, self.nanos),
        }
    }
}

/// Half-open time interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp (inclusive)
    pub start: Time,
    /// End timestamp (exclusive)
    pub end: Time,
}

impl TimeRange {
    /// Create a range; returns `None` when `start >= end`
    pub fn try_new(start: Time, end: Time) -> Option<Self> {
        if start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// Create a range without validation (caller guarantees `start < end`)
    pub fn new(start: Time, end: Time) -> Self {
        Self { start, end }
    }

    /// Check if a timestamp falls within this range
    pub fn contains(&self, t: Time) -> bool {
        t >= self.start && t < self.end
    }

    /// Check if another half-open range is entirely inside this one
    pub fn contains_range(&self, other: &TimeRange) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Check if this range overlaps another
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Element type of a channel's values, declared in every block header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FieldType {
    Double = 0,
    Int32 = 1,
    Int16 = 2,
    UInt8 = 3,
    Enum = 4,
    Str = 5,
}

impl FieldType {
    /// Byte width of one element in a packed record
    pub fn element_width(self) -> usize {
        match self {
            FieldType::Double => 8,
            FieldType::Int32 => 4,
            FieldType::Int16 => 2,
            FieldType::UInt8 => 1,
            FieldType::Enum => 2,
            // Fixed 40-byte cells, NUL padded
            FieldType::Str => 40,
        }
    }
}

impl TryFrom<u8> for FieldType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FieldType::Double),
            1 => Ok(FieldType::Int32),
            2 => Ok(FieldType::Int16),
            3 => Ok(FieldType::UInt8),
            4 => Ok(FieldType::Enum),
            5 => Ok(FieldType::Str),
            other => Err(other),
        }
    }
}

/// A sample's payload. Callers that only care about numbers can use
/// [`Value::as_f64`]; waveform channels produce the array variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Double(f64),
    DoubleArray(Vec<f64>),
    Int(i32),
    IntArray(Vec<i32>),
    Enum(u16),
    Str(String),
}

impl Value {
    /// Scalar view of the value, when one exists
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::Enum(v) => Some(*v as f64),
            Value::DoubleArray(_) | Value::IntArray(_) | Value::Str(_) => None,
        }
    }

    /// Number of elements (1 for scalars)
    pub fn element_count(&self) -> usize {
        match self {
            Value::DoubleArray(v) => v.len(),
            Value::IntArray(v) => v.len(),
            _ => 1,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::DoubleArray(_) | Value::IntArray(_))
    }
}

/// One archived measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Timestamp (monotonic within a channel)
    pub time: Time,
    /// Decoded payload
    pub value: Value,
    /// Status code; resolves against the block's status dictionary
    pub status: u16,
    /// Alarm severity
    pub severity: u16,
}

impl Sample {
    pub fn new(time: Time, value: Value) -> Self {
        Self {
            time,
            value,
            status: 0,
            severity: 0,
        }
    }

    /// Archiver bookkeeping record (disconnect, archive off)?
    /// These carry no meaningful value and are dropped from query results.
    pub fn is_info(&self) -> bool {
        self.severity & SEVERITY_INFO_MASK != 0
    }

    /// Human-readable severity
    pub fn severity_name(&self) -> &'static str {
        severity_name(self.severity)
    }

    /// Resolve an enum value's state label against a status dictionary
    pub fn enum_label<'a>(&self, dict: &'a [String]) -> Option<&'a str> {
        match self.value {
            Value::Enum(v) => dict.get(v as usize).map(|s| s.as_str()),
            _ => None,
        }
    }
}

/// Location of one data block: file + region + covered time range.
/// Produced by the interval index, consumed by the query engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    /// Index into the catalog's data-file table
    pub file_id: u32,
    /// Byte offset of the block header within the file
    pub offset: u64,
    /// Byte length of the block region
    pub length: u32,
    /// Declared coverage, half-open
    pub range: TimeRange,
}
