//! Resynchronising frame scanner: byte-stream alignment recovery, the
//! index-building prepass, and sequential `parse_next`.

use crate::record::Record;
use crate::registry::{FormatRegistry, FMT_TYPE_ID};
use crate::types::Value;
use crate::DfError;
use std::collections::{HashMap, HashSet};

const HEAD1: u8 = 0xA3;
const HEAD2: u8 = 0x95;

/// Bytes of trailing garbage below which short reads and resync failures
/// are treated as benign EOF padding rather than hard errors.
const EOF_GARBAGE_LIMIT: usize = 528;

pub struct FrameScanner {
    pub registry: FormatRegistry,
    offset: usize,
    remaining: usize,
    prev_type: Option<u8>,
    frame_index: HashMap<u8, Vec<usize>>,
    counts: HashMap<u8, u64>,
    seen_instances: HashMap<u8, HashSet<Vec<u8>>>,
    pub percent: f64,
}

impl Default for FrameScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScanner {
    pub fn new() -> Self {
        let mut registry = FormatRegistry::new();
        registry.seed();
        Self {
            registry,
            offset: 0,
            remaining: 0,
            prev_type: None,
            frame_index: HashMap::new(),
            counts: HashMap::new(),
            seen_instances: HashMap::new(),
            percent: 0.0,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn prev_type(&self) -> Option<u8> {
        self.prev_type
    }

    pub fn offsets_for(&self, type_id: u8) -> &[usize] {
        self.frame_index.get(&type_id).map_or(&[], |v| v.as_slice())
    }

    pub fn count_for(&self, type_id: u8) -> u64 {
        self.counts.get(&type_id).copied().unwrap_or(0)
    }

    pub fn instances_seen(&self, type_id: u8) -> usize {
        self.seen_instances.get(&type_id).map_or(0, |s| s.len())
    }

    pub fn rewind(&mut self) {
        self.offset = 0;
        self.remaining = 0;
        self.prev_type = None;
        self.percent = 0.0;
    }

    /// Walk the whole buffer once, populating the frame index and growing
    /// the registry from every FMT/FMTU record encountered. Must run
    /// before the first `parse_next` call.
    pub fn prepass(&mut self, data: &[u8]) -> Result<(), DfError> {
        let len = data.len();
        let mut offset = 0usize;

        while offset + 3 <= len {
            let b0 = data[offset];
            let b1 = data[offset + 1];
            let type_id = data[offset + 2];

            if b0 != HEAD1 || b1 != HEAD2 {
                if len - offset >= EOF_GARBAGE_LIMIT {
                    log::debug!("bad header 0x{:02x} 0x{:02x} at {}", b0, b1, offset);
                }
                offset += 1;
                continue;
            }
            if !self.registry.contains(type_id) {
                if len - offset >= EOF_GARBAGE_LIMIT {
                    log::debug!("unknown msg type {} (0x{:02x}) at {}", type_id, type_id, offset);
                }
                offset += 1;
                continue;
            }

            let descriptor = self.registry.lookup(type_id).expect("just checked contains");
            let record_length = descriptor.record_length;
            if offset + record_length > len {
                if len - offset >= EOF_GARBAGE_LIMIT {
                    log::debug!(
                        "short read for type {} at {}: need {} bytes, {} remain",
                        type_id,
                        offset,
                        record_length,
                        len - offset
                    );
                }
                break;
            }

            self.frame_index.entry(type_id).or_default().push(offset);
            *self.counts.entry(type_id).or_insert(0) += 1;

            let body = &data[offset + 3..offset + record_length];

            if type_id == FMT_TYPE_ID {
                if let Ok(values) = descriptor.decode(body) {
                    let record = Record::new(descriptor.clone(), values);
                    self.install_fmt_record(&record)?;
                }
            }
            if descriptor.name == "FMTU" {
                if let Ok(values) = descriptor.decode(body) {
                    let record = Record::new(descriptor.clone(), values);
                    self.registry.apply_fmtu(&record)?;
                }
            }
            if let (Some(inst_off), Some(inst_len)) =
                (descriptor.instance_offset, descriptor.instance_length)
            {
                if inst_off + inst_len <= body.len() {
                    let key = body[inst_off..inst_off + inst_len].to_vec();
                    self.seen_instances.entry(type_id).or_default().insert(key);
                }
            }

            offset += record_length;
        }

        self.rewind();
        Ok(())
    }

    /// Decode the next record from the current offset, resynchronising
    /// over unknown bytes as needed. Returns `Ok(None)` on clean EOF.
    pub fn parse_next(&mut self, data: &[u8]) -> Result<Option<Record>, DfError> {
        let len = data.len();

        loop {
            loop {
                if self.offset + 3 > len {
                    return Ok(None);
                }
                let b0 = data[self.offset];
                let b1 = data[self.offset + 1];
                let t = data[self.offset + 2];
                if b0 == HEAD1 && b1 == HEAD2 && self.registry.contains(t) {
                    self.prev_type = Some(t);
                    break;
                }
                if len - self.offset >= EOF_GARBAGE_LIMIT {
                    log::warn!("bad header 0x{:02x} 0x{:02x} at {}", b0, b1, self.offset);
                }
                self.offset += 1;
            }

            let type_id = data[self.offset + 2];
            self.offset += 3;
            self.remaining = len - self.offset;

            let descriptor = self
                .registry
                .lookup(type_id)
                .ok_or(DfError::NoSuchDescriptor(type_id))?;
            let body_len = descriptor.record_length.saturating_sub(3);

            if self.remaining < body_len {
                if self.remaining < EOF_GARBAGE_LIMIT {
                    return Ok(None);
                }
                return Err(DfError::ShortRead {
                    offset: self.offset,
                    expected: body_len,
                    actual: self.remaining,
                });
            }

            let body = &data[self.offset..self.offset + body_len];
            let values = match descriptor.decode(body) {
                Ok(v) => v,
                Err(e) => {
                    if self.remaining < EOF_GARBAGE_LIMIT {
                        return Ok(None);
                    }
                    log::warn!("failed to decode {} at {}: {}", descriptor.name, self.offset, e);
                    self.offset += body_len;
                    continue;
                }
            };

            let record = Record::new(descriptor.clone(), values);

            if type_id == FMT_TYPE_ID {
                self.install_fmt_record(&record)?;
            }
            if descriptor.name == "FMTU" {
                self.registry.apply_fmtu(&record)?;
            }

            self.offset += body_len;
            self.remaining = len - self.offset;
            self.percent = if len > 0 {
                100.0 * self.offset as f64 / len as f64
            } else {
                100.0
            };

            return Ok(Some(record));
        }
    }

    /// Build and install the descriptor declared by a decoded FMT record.
    /// A malformed declaration (`UnsupportedFormatChar`) is logged and
    /// skipped: that record type becomes unreadable, the stream continues.
    fn install_fmt_record(&mut self, record: &Record) -> Result<(), DfError> {
        let type_id = record.get("Type")?.as_i64().unwrap_or(-1);
        if !(0..=254).contains(&type_id) {
            return Ok(());
        }
        let length = record.get("Length")?.as_i64().unwrap_or(0).max(0) as usize;
        let name = match record.get("Name")? {
            Value::Str(s) => s,
            _ => return Ok(()),
        };
        let format = match record.get("Format")? {
            Value::Str(s) => s,
            _ => return Ok(()),
        };
        let columns: Vec<String> = match record.get("Columns")? {
            Value::Str(s) => s
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            _ => return Ok(()),
        };

        match crate::format::FormatDescriptor::build(type_id as u8, &name, length, &format, &columns) {
            Ok(descriptor) => self.registry.install(descriptor),
            Err(e) => log::warn!("failed to install FMT descriptor for '{}': {}", name, e),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_record(buf: &mut Vec<u8>, type_id: u8, body: &[u8]) {
        buf.push(0xA3);
        buf.push(0x95);
        buf.push(type_id);
        buf.extend_from_slice(body);
    }

    fn fmt_body(type_id: u8, length: u8, name: &str, format: &str, columns: &str) -> Vec<u8> {
        let mut body = vec![type_id, length];
        let mut n = name.as_bytes().to_vec();
        n.resize(4, 0);
        body.extend_from_slice(&n);
        let mut f = format.as_bytes().to_vec();
        f.resize(16, 0);
        body.extend_from_slice(&f);
        let mut c = columns.as_bytes().to_vec();
        c.resize(64, 0);
        body.extend_from_slice(&c);
        body
    }

    #[test]
    fn test_prepass_and_parse_minimal_stream() {
        let mut data = Vec::new();
        push_record(&mut data, 128, &fmt_body(128, 89, "FMT", "BBnNZ", "Type,Length,Name,Format,Columns"));
        push_record(&mut data, 128, &fmt_body(200, 4, "X", "B", "v"));
        push_record(&mut data, 200, &[42]);

        let mut scanner = FrameScanner::new();
        scanner.prepass(&data).unwrap();

        let r1 = scanner.parse_next(&data).unwrap().unwrap();
        assert_eq!(r1.type_name(), "FMT");
        let r2 = scanner.parse_next(&data).unwrap().unwrap();
        assert_eq!(r2.type_name(), "X");
        assert_eq!(r2.get("v").unwrap(), Value::I64(42));
        assert!(scanner.parse_next(&data).unwrap().is_none());
    }

    #[test]
    fn test_resync_skips_garbage() {
        let mut data = vec![0xDE, 0xAD, 0xBE, 0xEF];
        push_record(&mut data, 128, &fmt_body(128, 89, "FMT", "BBnNZ", "Type,Length,Name,Format,Columns"));
        push_record(&mut data, 128, &fmt_body(200, 4, "X", "B", "v"));
        push_record(&mut data, 200, &[7]);

        let mut scanner = FrameScanner::new();
        scanner.prepass(&data).unwrap();
        let r1 = scanner.parse_next(&data).unwrap().unwrap();
        assert_eq!(r1.type_name(), "FMT");
        let r2 = scanner.parse_next(&data).unwrap().unwrap();
        assert_eq!(r2.get("v").unwrap(), Value::I64(7));
    }

    #[test]
    fn test_eof_padding_tolerance() {
        let mut data = Vec::new();
        push_record(&mut data, 128, &fmt_body(128, 89, "FMT", "BBnNZ", "Type,Length,Name,Format,Columns"));
        push_record(&mut data, 128, &fmt_body(200, 4, "X", "B", "v"));
        push_record(&mut data, 200, &[1]);
        data.extend(std::iter::repeat(0u8).take(200));

        let mut scanner = FrameScanner::new();
        scanner.prepass(&data).unwrap();
        scanner.parse_next(&data).unwrap();
        scanner.parse_next(&data).unwrap();
        assert!(scanner.parse_next(&data).unwrap().is_none());
    }

    #[test]
    fn test_instance_field_tracked_in_prepass() {
        let mut data = Vec::new();
        push_record(&mut data, 128, &fmt_body(128, 89, "FMT", "BBnNZ", "Type,Length,Name,Format,Columns"));
        push_record(&mut data, 128, &fmt_body(201, 5, "IMU", "BB", "Inst,Val"));
        // FMTU declared via FMT: type 202, name FMTU, format "BNN" cols FmtType,UnitIds,MultIds
        push_record(
            &mut data,
            128,
            &fmt_body(202, 36, "FMTU", "BNN", "FmtType,UnitIds,MultIds"),
        );
        let mut fmtu_payload = vec![201u8];
        let mut unit_ids = b"#-".to_vec();
        unit_ids.resize(16, 0);
        fmtu_payload.extend_from_slice(&unit_ids);
        let mut mult_ids = b"--".to_vec();
        mult_ids.resize(16, 0);
        fmtu_payload.extend_from_slice(&mult_ids);
        push_record(&mut data, 202, &fmtu_payload);

        push_record(&mut data, 201, &[1, 10]);
        push_record(&mut data, 201, &[2, 20]);
        push_record(&mut data, 201, &[1, 11]);

        let mut scanner = FrameScanner::new();
        scanner.prepass(&data).unwrap();
        assert_eq!(scanner.instances_seen(201), 2);
    }
}
