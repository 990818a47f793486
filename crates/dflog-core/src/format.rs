//! Format descriptor: parses a FMT record's format string into an ordered
//! list of [`FieldKind`]s and knows how to decode/encode a record body.

use crate::io_utils::{write_fixed_bytes, BinaryReader};
use crate::types::{FieldKind, Value};
use crate::DfError;
use std::collections::HashMap;

/// Layout for one record type, built once per `type_id` from its FMT
/// record and annotated in place by any later FMTU record.
#[derive(Debug, Clone)]
pub struct FormatDescriptor {
    pub type_id: u8,
    pub name: String,
    /// Declared on-wire length including the 3-byte header.
    pub record_length: usize,
    pub format_chars: Vec<FieldKind>,
    pub columns: Vec<String>,
    pub column_index: HashMap<String, usize>,
    /// Column positions holding a format-char `a` (int16 array) field.
    pub array_indices: Vec<usize>,
    pub unit_ids: Option<String>,
    pub mult_ids: Option<String>,
    /// Byte offset of the instance-key column within the body, if the
    /// FMTU `unit_ids` string marks one with `#`.
    pub instance_offset: Option<usize>,
    pub instance_length: Option<usize>,
}

impl FormatDescriptor {
    /// Build a descriptor from a decoded FMT record's fields.
    ///
    /// Walks `format` character by character, stopping at the first NUL
    /// (or the end of the string). Unknown characters are rejected.
    pub fn build(
        type_id: u8,
        name: &str,
        record_length: usize,
        format: &str,
        columns: &[String],
    ) -> Result<Self, DfError> {
        let name = name.trim_end_matches('\0').to_string();
        let mut format_chars = Vec::new();
        for c in format.chars() {
            if c == '\0' {
                break;
            }
            match FieldKind::from_char(c) {
                Some(kind) => format_chars.push(kind),
                None => {
                    return Err(DfError::UnsupportedFormatChar { ch: c, name });
                }
            }
        }

        let columns: Vec<String> = columns.iter().map(|c| c.trim().to_string()).collect();
        let mut column_index = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            column_index.insert(col.clone(), i);
        }

        let array_indices = format_chars
            .iter()
            .enumerate()
            .filter(|(_, k)| matches!(k, FieldKind::Int16Array))
            .map(|(i, _)| i)
            .collect();

        Ok(Self {
            type_id,
            name,
            record_length,
            format_chars,
            columns,
            column_index,
            array_indices,
            unit_ids: None,
            mult_ids: None,
            instance_offset: None,
            instance_length: None,
        })
    }

    /// Total on-wire body width implied by `format_chars` (invariant 2:
    /// must equal `record_length - 3`).
    pub fn body_width(&self) -> usize {
        self.format_chars.iter().map(|k| k.width()).sum()
    }

    /// Decode a record body (everything after the 3-byte header) into an
    /// ordered list of typed values. String fields are returned as raw,
    /// un-trimmed bytes; null-termination happens at field access time.
    pub fn decode(&self, body: &[u8]) -> Result<Vec<Value>, DfError> {
        let expected = self.body_width();
        if body.len() < expected {
            return Err(DfError::LengthMismatch {
                name: self.name.clone(),
                expected,
                actual: body.len(),
            });
        }

        let mut reader = BinaryReader::new(body);
        let mut values = Vec::with_capacity(self.format_chars.len());
        for kind in &self.format_chars {
            let value = match kind {
                FieldKind::Int16Array => Value::I16Array(reader.read_i16_array(kind.width())?),
                FieldKind::I8 | FieldKind::Mode => Value::I64(reader.read_i8()? as i64),
                FieldKind::U8 => Value::I64(reader.read_u8()? as i64),
                FieldKind::I16 => Value::I64(reader.read_i16()? as i64),
                FieldKind::U16 => Value::I64(reader.read_u16()? as i64),
                FieldKind::I32 => Value::I64(reader.read_i32()? as i64),
                FieldKind::U32 => Value::I64(reader.read_u32()? as i64),
                FieldKind::I64 => Value::I64(reader.read_i64()?),
                FieldKind::U64 => Value::U64(reader.read_u64()?),
                FieldKind::F32 => Value::F64(reader.read_f32()? as f64),
                FieldKind::F64 => Value::F64(reader.read_f64()?),
                FieldKind::Str4 | FieldKind::Str16 | FieldKind::Str64 => {
                    Value::Bytes(reader.read_bytes(kind.width())?)
                }
                FieldKind::ScaledI16 => {
                    Value::F64(reader.read_i16()? as f64 * kind.multiplier().unwrap())
                }
                FieldKind::ScaledU16 => {
                    Value::F64(reader.read_u16()? as f64 * kind.multiplier().unwrap())
                }
                FieldKind::ScaledI32 => {
                    Value::F64(reader.read_i32()? as f64 * kind.multiplier().unwrap())
                }
                FieldKind::ScaledU32 => {
                    Value::F64(reader.read_u32()? as f64 * kind.multiplier().unwrap())
                }
                FieldKind::LatLon => {
                    Value::F64(reader.read_i32()? as f64 * kind.multiplier().unwrap())
                }
            };
            values.push(value);
        }
        Ok(values)
    }

    /// Reverse of [`decode`]: reapply inverse multipliers and emit
    /// little-endian bytes, prefixed with the `A3 95 <type_id>` header.
    /// Used by `Record::to_bytes` for the round-trip invariant.
    pub fn encode(&self, values: &[Value]) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + self.body_width());
        out.push(0xA3);
        out.push(0x95);
        out.push(self.type_id);

        for (kind, value) in self.format_chars.iter().zip(values.iter()) {
            match kind {
                FieldKind::Int16Array => {
                    let arr = match value {
                        Value::I16Array(a) => a.clone(),
                        _ => vec![0i16; 32],
                    };
                    for v in arr {
                        out.extend_from_slice(&v.to_le_bytes());
                    }
                }
                FieldKind::I8 | FieldKind::Mode => out.push(value.as_i64().unwrap_or(0) as u8),
                FieldKind::U8 => out.push(value.as_i64().unwrap_or(0) as u8),
                FieldKind::I16 => out.extend_from_slice(&(value.as_i64().unwrap_or(0) as i16).to_le_bytes()),
                FieldKind::U16 => out.extend_from_slice(&(value.as_i64().unwrap_or(0) as u16).to_le_bytes()),
                FieldKind::I32 => out.extend_from_slice(&(value.as_i64().unwrap_or(0) as i32).to_le_bytes()),
                FieldKind::U32 => out.extend_from_slice(&(value.as_i64().unwrap_or(0) as u32).to_le_bytes()),
                FieldKind::I64 => out.extend_from_slice(&value.as_i64().unwrap_or(0).to_le_bytes()),
                FieldKind::U64 => {
                    let raw = match value {
                        Value::U64(v) => *v,
                        other => other.as_i64().unwrap_or(0) as u64,
                    };
                    out.extend_from_slice(&raw.to_le_bytes());
                }
                FieldKind::F32 => out.extend_from_slice(&(value.as_f64().unwrap_or(0.0) as f32).to_le_bytes()),
                FieldKind::F64 => out.extend_from_slice(&value.as_f64().unwrap_or(0.0).to_le_bytes()),
                FieldKind::Str4 | FieldKind::Str16 | FieldKind::Str64 => {
                    let bytes = match value {
                        Value::Bytes(b) => b.clone(),
                        Value::Str(s) => s.as_bytes().to_vec(),
                        _ => Vec::new(),
                    };
                    write_fixed_bytes(&mut out, &bytes, kind.width());
                }
                FieldKind::ScaledI16 => {
                    let raw = (value.as_f64().unwrap_or(0.0) / kind.multiplier().unwrap()).round() as i16;
                    out.extend_from_slice(&raw.to_le_bytes());
                }
                FieldKind::ScaledU16 => {
                    let raw = (value.as_f64().unwrap_or(0.0) / kind.multiplier().unwrap()).round() as u16;
                    out.extend_from_slice(&raw.to_le_bytes());
                }
                FieldKind::ScaledI32 => {
                    let raw = (value.as_f64().unwrap_or(0.0) / kind.multiplier().unwrap()).round() as i32;
                    out.extend_from_slice(&raw.to_le_bytes());
                }
                FieldKind::ScaledU32 => {
                    let raw = (value.as_f64().unwrap_or(0.0) / kind.multiplier().unwrap()).round() as u32;
                    out.extend_from_slice(&raw.to_le_bytes());
                }
                FieldKind::LatLon => {
                    let raw = (value.as_f64().unwrap_or(0.0) / kind.multiplier().unwrap()).round() as i32;
                    out.extend_from_slice(&raw.to_le_bytes());
                }
            }
        }
        out
    }

    /// Apply an FMTU record's `UnitIds` string: if it contains `#`, the
    /// column at that position becomes the instance key, and its byte
    /// offset/width within the body are cached.
    ///
    /// Width is taken from the field's actual on-wire size. (The original
    /// source computes this via `binary.Size` of a single format-char
    /// byte, which degenerates to 1 regardless of the field's real width;
    /// this implementation uses the real width instead — see DESIGN.md.)
    pub fn set_unit_ids(&mut self, unit_ids: &str) {
        self.unit_ids = Some(unit_ids.to_string());
        if let Some(instance_index) = unit_ids.find('#') {
            if instance_index < self.format_chars.len() {
                let offset: usize = self.format_chars[..instance_index]
                    .iter()
                    .map(|k| k.width())
                    .sum();
                self.instance_offset = Some(offset);
                self.instance_length = Some(self.format_chars[instance_index].width());
            }
        }
    }

    pub fn set_mult_ids(&mut self, mult_ids: &str) {
        self.mult_ids = Some(mult_ids.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_rejects_unknown_char() {
        let err = FormatDescriptor::build(200, "X", 8, "Z$", &cols(&["v", "w"])).unwrap_err();
        assert!(matches!(err, DfError::UnsupportedFormatChar { ch: '$', .. }));
    }

    #[test]
    fn test_build_stops_at_nul() {
        let d = FormatDescriptor::build(200, "X", 8, "B\0junk", &cols(&["v"])).unwrap();
        assert_eq!(d.format_chars.len(), 1);
    }

    #[test]
    fn test_decode_scaled_field() {
        let d = FormatDescriptor::build(201, "GPS", 7, "L", &cols(&["Lat"])).unwrap();
        let body: [u8; 4] = 657_960_960i32.to_le_bytes();
        let values = d.decode(&body).unwrap();
        let lat = values[0].as_f64().unwrap();
        assert!((lat - 65.796096).abs() < 1e-9);
    }

    #[test]
    fn test_decode_length_mismatch() {
        let d = FormatDescriptor::build(200, "X", 8, "B", &cols(&["v"])).unwrap();
        assert!(d.decode(&[]).is_err());
    }

    #[test]
    fn test_encode_decode_roundtrip_int() {
        let d = FormatDescriptor::build(200, "X", 8, "B", &cols(&["v"])).unwrap();
        let values = vec![Value::I64(42)];
        let bytes = d.encode(&values);
        assert_eq!(bytes, vec![0xA3, 0x95, 200, 42]);
        let decoded = d.decode(&bytes[3..]).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_set_unit_ids_instance_offset() {
        let mut d = FormatDescriptor::build(202, "IMU", 12, "BBi", &cols(&["Status", "Inst", "Val"])).unwrap();
        d.set_unit_ids("--#");
        assert_eq!(d.instance_offset, Some(1));
        assert_eq!(d.instance_length, Some(1));
    }
}
