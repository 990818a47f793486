//! Scalar domain types shared by the format, registry, and record modules.

use serde::{Deserialize, Serialize};

/// One variant per DataFlash format character.
///
/// Each variant carries its on-wire width and whether a fixed metric
/// multiplier is applied at decode time. Letters not listed here
/// (`FormatDescriptor::build`) are rejected as `UnsupportedFormatChar`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// `a`: 64 raw bytes, reinterpreted little-endian as 32 `i16`s.
    Int16Array,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// `n`: 4-byte null-terminated ASCII string.
    Str4,
    /// `N`: 16-byte null-terminated ASCII string.
    Str16,
    /// `Z`: 64-byte null-terminated ASCII string.
    Str64,
    /// `c`: `i16` x 0.01.
    ScaledI16,
    /// `C`: `u16` x 0.01.
    ScaledU16,
    /// `e`: `i32` x 0.01.
    ScaledI32,
    /// `E`: `u32` x 0.01.
    ScaledU32,
    /// `L`: `i32` x 1e-7 (latitude/longitude scaled degrees).
    LatLon,
    /// `M`: `i8` mode value, never scaled.
    Mode,
}

impl FieldKind {
    /// Parse a single format character. `None` for an unrecognised letter.
    pub fn from_char(c: char) -> Option<Self> {
        use FieldKind::*;
        Some(match c {
            'a' => Int16Array,
            'b' => I8,
            'B' => U8,
            'h' => I16,
            'H' => U16,
            'i' => I32,
            'I' => U32,
            'q' => I64,
            'Q' => U64,
            'f' => F32,
            'd' => F64,
            'n' => Str4,
            'N' => Str16,
            'Z' => Str64,
            'c' => ScaledI16,
            'C' => ScaledU16,
            'e' => ScaledI32,
            'E' => ScaledU32,
            'L' => LatLon,
            'M' => Mode,
            _ => return None,
        })
    }

    /// On-wire byte width of this field.
    pub fn width(self) -> usize {
        use FieldKind::*;
        match self {
            Int16Array => 64,
            I8 | U8 | Mode => 1,
            I16 | U16 | ScaledI16 | ScaledU16 => 2,
            I32 | U32 | F32 | ScaledI32 | ScaledU32 | LatLon => 4,
            I64 | U64 | F64 => 8,
            Str4 => 4,
            Str16 => 16,
            Str64 => 64,
        }
    }

    /// Fixed multiplier applied to the raw on-wire integer, if any.
    pub fn multiplier(self) -> Option<f64> {
        use FieldKind::*;
        match self {
            ScaledI16 | ScaledU16 | ScaledI32 | ScaledU32 => Some(0.01),
            LatLon => Some(1.0e-7),
            _ => None,
        }
    }

    /// True for the three null-terminated ASCII string kinds.
    pub fn is_string(self) -> bool {
        matches!(self, FieldKind::Str4 | FieldKind::Str16 | FieldKind::Str64)
    }
}

/// A decoded field value. Strings and byte arrays are owned so that a
/// `Record` can outlive the buffer it was parsed from (see the
/// concurrency/resource model: records are owning, not aliasing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    I64(i64),
    U64(u64),
    F64(f64),
    Bytes(Vec<u8>),
    I16Array(Vec<i16>),
    Str(String),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            Value::U64(v) => i64::try_from(*v).ok(),
            Value::F64(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::I64(v) => Some(*v as f64),
            Value::U64(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// MAVLink `MAV_TYPE` vehicle classification, inferred from the text of
/// `MSG` records the way the reader infers `flight_mode`. Only the prefixes
/// the reference implementation matches are ever produced by the classifier
/// (see `reader::classify_mav_type`); the remaining variant (`Generic`)
/// covers every `MSG` text that matches none of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VehicleType {
    #[default]
    Generic,
    FixedWing,
    Quadrotor,
    GroundRover,
    AntennaTracker,
    Submarine,
    Airship,
}
