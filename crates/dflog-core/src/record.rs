//! Typed view over a decoded record: field lookup by name, mode/message
//! extraction, and binary repacking for round-trip tests.

use crate::format::FormatDescriptor;
use crate::types::{FieldKind, Value};
use crate::DfError;
use std::collections::HashMap;
use std::sync::Arc;

/// A decoded record. Owns its field values (and a shared handle to the
/// descriptor that produced them) so it can outlive the reader — see the
/// concurrency/resource model: this implementation chooses owning records
/// over buffer-aliasing ones.
#[derive(Debug, Clone)]
pub struct Record {
    pub descriptor: Arc<FormatDescriptor>,
    values: Vec<Value>,
    timestamp: f64,
}

impl Record {
    pub fn new(descriptor: Arc<FormatDescriptor>, values: Vec<Value>) -> Self {
        Self {
            descriptor,
            values,
            timestamp: f64::NAN,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn type_id(&self) -> u8 {
        self.descriptor.type_id
    }

    pub fn columns(&self) -> &[String] {
        &self.descriptor.columns
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, ts: f64) {
        self.timestamp = ts;
    }

    /// Field lookup by column name, with null-termination and the `FILE`
    /// payload exception applied (see §4.E).
    pub fn get(&self, field: &str) -> Result<Value, DfError> {
        let idx = *self
            .descriptor
            .column_index
            .get(field)
            .ok_or_else(|| DfError::UnknownField(field.to_string()))?;
        let kind = self.descriptor.format_chars[idx];
        let raw = &self.values[idx];

        if kind == FieldKind::Str64 && self.descriptor.name == "FILE" {
            return Ok(raw.clone());
        }

        if kind.is_string() {
            if let Value::Bytes(bytes) = raw {
                let s = String::from_utf8_lossy(bytes);
                let trimmed = s.split('\0').next().unwrap_or("").to_string();
                return Ok(Value::Str(trimmed));
            }
        }

        Ok(raw.clone())
    }

    /// Overwrite a field's value in place. Values are stored already in
    /// physical units for scaled fields (decode applies the multiplier
    /// eagerly), so no inverse scaling happens here — only `to_bytes`
    /// reverses the multiplier, when emitting raw on-wire integers.
    ///
    /// Rejects a `value` whose `Value` variant doesn't match the column's
    /// `FieldKind` (e.g. writing a `Value::Str` into an integer column).
    pub fn set(&mut self, field: &str, value: Value) -> Result<(), DfError> {
        let idx = *self
            .descriptor
            .column_index
            .get(field)
            .ok_or_else(|| DfError::UnknownField(field.to_string()))?;
        let kind = self.descriptor.format_chars[idx];
        let expected = expected_value_kind(kind);
        if !value_matches_kind(kind, &value) {
            return Err(DfError::TypeMismatch {
                field: field.to_string(),
                expected,
            });
        }
        self.values[idx] = value;
        Ok(())
    }

    /// `ModeNum` if present, else `Mode`, else `-1`.
    pub fn mode(&self) -> i64 {
        for name in ["ModeNum", "Mode"] {
            if let Some(&idx) = self.descriptor.column_index.get(name) {
                if let Some(v) = self.values[idx].as_i64() {
                    return v;
                }
            }
        }
        -1
    }

    /// NUL-trimmed `Message` text, only for `MSG` records.
    pub fn message(&self) -> Option<String> {
        if self.descriptor.name != "MSG" {
            return None;
        }
        match self.get("Message").ok()? {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Materialise `{column -> value}` plus `packet_type`.
    pub fn as_map(&self) -> HashMap<String, Value> {
        let mut map = HashMap::with_capacity(self.descriptor.columns.len() + 1);
        map.insert(
            "packet_type".to_string(),
            Value::Str(self.descriptor.name.clone()),
        );
        for name in &self.descriptor.columns {
            if let std::collections::hash_map::Entry::Vacant(e) = map.entry(name.clone()) {
                if let Ok(v) = self.get(name) {
                    e.insert(v);
                }
            }
        }
        map
    }

    /// Reverse of decoding: header + per-field LE bytes with multipliers
    /// inverted. Used by the round-trip test (invariant 5).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.descriptor.encode(&self.values)
    }
}

/// Whether `value`'s variant is a legal decode/set result for `kind`.
fn value_matches_kind(kind: FieldKind, value: &Value) -> bool {
    use FieldKind::*;
    match kind {
        Int16Array => matches!(value, Value::I16Array(_)),
        I8 | U8 | I16 | U16 | I32 | U32 | I64 | Mode => matches!(value, Value::I64(_)),
        U64 => matches!(value, Value::U64(_)),
        F32 | F64 | ScaledI16 | ScaledU16 | ScaledI32 | ScaledU32 | LatLon => {
            matches!(value, Value::F64(_))
        }
        Str4 | Str16 | Str64 => matches!(value, Value::Bytes(_) | Value::Str(_)),
    }
}

/// Human-readable description of the `Value` variant `kind` expects, for
/// `DfError::TypeMismatch`.
fn expected_value_kind(kind: FieldKind) -> &'static str {
    use FieldKind::*;
    match kind {
        Int16Array => "I16Array",
        I8 | U8 | I16 | U16 | I32 | U32 | I64 | Mode => "I64",
        U64 => "U64",
        F32 | F64 | ScaledI16 | ScaledU16 | ScaledI32 | ScaledU32 | LatLon => "F64",
        Str4 | Str16 | Str64 => "Bytes or Str",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(name: &str, format: &str, columns: &[&str], record_length: usize) -> Arc<FormatDescriptor> {
        let cols: Vec<String> = columns.iter().map(|s| s.to_string()).collect();
        Arc::new(FormatDescriptor::build(200, name, record_length, format, &cols).unwrap())
    }

    #[test]
    fn test_get_unknown_field() {
        let d = build("X", "B", &["v"], 8);
        let r = Record::new(d, vec![Value::I64(5)]);
        assert!(r.get("nope").is_err());
    }

    #[test]
    fn test_mode_fallback() {
        let d = build("MODE", "BB", &["Other", "Mode"], 9);
        let r = Record::new(d, vec![Value::I64(0), Value::I64(3)]);
        assert_eq!(r.mode(), 3);
    }

    #[test]
    fn test_mode_absent() {
        let d = build("X", "B", &["v"], 8);
        let r = Record::new(d, vec![Value::I64(1)]);
        assert_eq!(r.mode(), -1);
    }

    #[test]
    fn test_message_only_for_msg_type() {
        let d = build("X", "Z", &["Message"], 67);
        let r = Record::new(d, vec![Value::Bytes(b"hi\0\0".to_vec())]);
        assert_eq!(r.message(), None);
    }

    #[test]
    fn test_message_trims_nul() {
        let mut bytes = b"hello".to_vec();
        bytes.resize(64, 0);
        let d = build("MSG", "Z", &["Message"], 67);
        let r = Record::new(d, vec![Value::Bytes(bytes)]);
        assert_eq!(r.message(), Some("hello".to_string()));
    }

    #[test]
    fn test_as_map_has_packet_type() {
        let d = build("X", "B", &["v"], 8);
        let r = Record::new(d, vec![Value::I64(9)]);
        let map = r.as_map();
        assert_eq!(map.get("packet_type"), Some(&Value::Str("X".to_string())));
        assert_eq!(map.get("v"), Some(&Value::I64(9)));
    }

    #[test]
    fn test_file_type_z_field_not_string_converted() {
        let d = build("FILE", "Z", &["Data"], 67);
        let raw = vec![1u8, 2, 0, 3];
        let r = Record::new(d, vec![Value::Bytes(raw.clone())]);
        assert_eq!(r.get("Data").unwrap(), Value::Bytes(raw));
    }

    #[test]
    fn test_set_accepts_matching_kind() {
        let d = build("X", "B", &["v"], 8);
        let mut r = Record::new(d, vec![Value::I64(1)]);
        r.set("v", Value::I64(9)).unwrap();
        assert_eq!(r.get("v").unwrap(), Value::I64(9));
    }

    #[test]
    fn test_set_rejects_mismatched_kind() {
        let d = build("X", "B", &["v"], 8);
        let mut r = Record::new(d, vec![Value::I64(1)]);
        let err = r.set("v", Value::Str("nope".to_string())).unwrap_err();
        assert!(matches!(
            err,
            DfError::TypeMismatch { field, .. } if field == "v"
        ));
        // rejected write leaves the original value untouched
        assert_eq!(r.get("v").unwrap(), Value::I64(1));
    }
}
