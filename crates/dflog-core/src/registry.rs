//! Format registry: dense `type_id -> FormatDescriptor` mapping, bootstrapped
//! with the hard-coded FMT descriptor and grown as FMT/FMTU records arrive.

use crate::format::FormatDescriptor;
use crate::record::Record;
use crate::types::Value;
use crate::DfError;
use std::collections::HashMap;
use std::sync::Arc;

/// The bootstrap FMT descriptor: `type_id=128, name="FMT", record_length=89,
/// format="BBnNZ"`. Every other descriptor is learned from the stream; this
/// one must exist before any byte is read.
pub const FMT_TYPE_ID: u8 = 128;
const FMT_RECORD_LENGTH: usize = 89;
const FMT_FORMAT: &str = "BBnNZ";

pub struct FormatRegistry {
    descriptors: HashMap<u8, Arc<FormatDescriptor>>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self {
            descriptors: HashMap::new(),
        }
    }

    /// Install the bootstrap FMT descriptor. Must be called before the
    /// first byte of the stream is scanned.
    pub fn seed(&mut self) {
        let columns = ["Type", "Length", "Name", "Format", "Columns"]
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>();
        let descriptor = FormatDescriptor::build(
            FMT_TYPE_ID,
            "FMT",
            FMT_RECORD_LENGTH,
            FMT_FORMAT,
            &columns,
        )
        .expect("bootstrap FMT descriptor is well-formed by construction");
        self.install(descriptor);
    }

    pub fn install(&mut self, descriptor: FormatDescriptor) {
        self.descriptors.insert(descriptor.type_id, Arc::new(descriptor));
    }

    pub fn lookup(&self, type_id: u8) -> Option<Arc<FormatDescriptor>> {
        self.descriptors.get(&type_id).cloned()
    }

    pub fn contains(&self, type_id: u8) -> bool {
        self.descriptors.contains_key(&type_id)
    }

    /// Annotate the descriptor named by a decoded FMTU record's `FmtType`
    /// column with its `UnitIds`/`MultIds` strings. Missing columns (not
    /// every FMTU variant carries both) are silently ignored, matching the
    /// original source's optional-column handling.
    pub fn apply_fmtu(&mut self, record: &Record) -> Result<(), DfError> {
        let fmt_type = match record.get("FmtType") {
            Ok(v) => v.as_i64(),
            Err(_) => return Ok(()),
        };
        let Some(fmt_type) = fmt_type else { return Ok(()) };
        if !(0..=254).contains(&fmt_type) {
            return Ok(());
        }
        let target_id = fmt_type as u8;

        let unit_ids = record
            .get("UnitIds")
            .ok()
            .and_then(|v| matches!(v, Value::Str(_)).then_some(v))
            .and_then(|v| match v {
                Value::Str(s) => Some(s),
                _ => None,
            });
        let mult_ids = record
            .get("MultIds")
            .ok()
            .and_then(|v| match v {
                Value::Str(s) => Some(s),
                _ => None,
            });

        if unit_ids.is_none() && mult_ids.is_none() {
            return Ok(());
        }

        if let Some(existing) = self.descriptors.get(&target_id).cloned() {
            let mut updated = (*existing).clone();
            if let Some(u) = &unit_ids {
                updated.set_unit_ids(u);
            }
            if let Some(m) = &mult_ids {
                updated.set_mult_ids(m);
            }
            self.descriptors.insert(target_id, Arc::new(updated));
        }
        Ok(())
    }

    /// Scan 254..=2 for a free type id, for registering a synthetic type.
    pub fn find_unused(&self) -> Option<u8> {
        (2..=254).rev().find(|id| !self.descriptors.contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_installs_fmt() {
        let mut reg = FormatRegistry::new();
        reg.seed();
        let d = reg.lookup(FMT_TYPE_ID).unwrap();
        assert_eq!(d.name, "FMT");
        assert_eq!(d.record_length, FMT_RECORD_LENGTH);
    }

    #[test]
    fn test_find_unused_skips_installed() {
        let mut reg = FormatRegistry::new();
        reg.seed();
        let id = reg.find_unused().unwrap();
        assert_ne!(id, FMT_TYPE_ID);
        assert!(!reg.contains(id));
    }

    #[test]
    fn test_apply_fmtu_sets_instance_offset() {
        let mut reg = FormatRegistry::new();
        let cols = ["Status", "Inst", "Val"].iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let target = FormatDescriptor::build(201, "IMU", 12, "BBi", &cols).unwrap();
        reg.install(target);

        let fmtu_cols = ["FmtType", "UnitIds", "MultIds"].iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let fmtu_descriptor = Arc::new(
            FormatDescriptor::build(202, "FMTU", 11, "BNN", &fmtu_cols).unwrap(),
        );
        let mut unit_ids = b"--#".to_vec();
        unit_ids.resize(16, 0);
        let mut mult_ids = b"---".to_vec();
        mult_ids.resize(16, 0);
        let fmtu_record = Record::new(
            fmtu_descriptor,
            vec![Value::I64(201), Value::Bytes(unit_ids), Value::Bytes(mult_ids)],
        );

        reg.apply_fmtu(&fmtu_record).unwrap();
        let updated = reg.lookup(201).unwrap();
        assert_eq!(updated.instance_offset, Some(1));
        assert_eq!(updated.instance_length, Some(1));
    }
}
