//! Top-level entry point: open and iterate a DataFlash log.

use crate::clock::GpsClock;
use crate::record::Record;
use crate::scanner::FrameScanner;
use crate::types::VehicleType;
use crate::DfError;
use std::collections::HashMap;
use std::ops::Deref;
use std::path::Path;

/// Abstraction over file data sources (owned bytes or memory-mapped),
/// mirroring the workspace's existing `FileData` pattern.
enum FileData {
    Owned(Vec<u8>),
    Mapped(memmap2::Mmap),
}

impl Deref for FileData {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        match self {
            FileData::Owned(v) => v,
            FileData::Mapped(m) => m,
        }
    }
}

const MODE_MAPPING_ACM: &[(i64, &str)] = &[
    (0, "STABILIZE"),
    (1, "ACRO"),
    (2, "ALT_HOLD"),
    (3, "AUTO"),
    (4, "GUIDED"),
    (5, "LOITER"),
    (6, "RTL"),
    (7, "CIRCLE"),
    (8, "POSITION"),
    (9, "LAND"),
    (10, "OF_LOITER"),
    (11, "DRIFT"),
    (13, "SPORT"),
    (14, "FLIP"),
    (15, "AUTOTUNE"),
    (16, "POSHOLD"),
    (17, "BRAKE"),
    (18, "THROW"),
    (19, "AVOID_ADSB"),
    (20, "GUIDED_NOGPS"),
    (21, "SMART_RTL"),
    (22, "FLOWHOLD"),
    (23, "FOLLOW"),
    (24, "ZIGZAG"),
    (25, "SYSTEMID"),
    (26, "AUTOROTATE"),
    (27, "AUTO_RTL"),
];

fn mode_string_acm(mode: i64) -> String {
    MODE_MAPPING_ACM
        .iter()
        .find(|(n, _)| *n == mode)
        .map(|(_, s)| s.to_string())
        .unwrap_or_else(|| format!("Mode({mode})"))
}

/// Classify vehicle type from a `MSG` record's text, checking prefixes in
/// the same order the reference implementation does. `None` if the text
/// matches none of the known substrings.
fn classify_mav_type(message: &str) -> Option<VehicleType> {
    if message.contains("Rover") {
        Some(VehicleType::GroundRover)
    } else if message.contains("Plane") {
        Some(VehicleType::FixedWing)
    } else if message.contains("Copter") {
        Some(VehicleType::Quadrotor)
    } else if message.starts_with("Antenna") {
        Some(VehicleType::AntennaTracker)
    } else if message.contains("ArduSub") {
        Some(VehicleType::Submarine)
    } else if message.contains("Blimp") {
        Some(VehicleType::Airship)
    } else {
        None
    }
}

/// A DataFlash log opened for reading.
pub struct DataFlashReader {
    data: FileData,
    scanner: FrameScanner,
    clock: GpsClock,
    zero_time_base: bool,
    mav_type: VehicleType,
    flight_mode: String,
    messages: HashMap<String, Record>,
}

impl DataFlashReader {
    /// Open a log file, reading it entirely into memory.
    pub fn open(path: impl AsRef<Path>, zero_time_base: bool) -> Result<Self, DfError> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_data(FileData::Owned(data), zero_time_base)
    }

    /// Open a log file using memory-mapping.
    ///
    /// # Safety
    /// The file must not be modified while the reader is open.
    pub fn open_mmap(path: impl AsRef<Path>, zero_time_base: bool) -> Result<Self, DfError> {
        let file = std::fs::File::open(path.as_ref())?;
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Self::from_data(FileData::Mapped(mmap), zero_time_base)
    }

    /// Parse an in-memory buffer directly (used by tests and by callers
    /// that already hold the bytes).
    pub fn from_bytes(data: Vec<u8>, zero_time_base: bool) -> Result<Self, DfError> {
        Self::from_data(FileData::Owned(data), zero_time_base)
    }

    fn from_data(data: FileData, zero_time_base: bool) -> Result<Self, DfError> {
        let mut reader = Self {
            data,
            scanner: FrameScanner::new(),
            clock: GpsClock::new(),
            zero_time_base,
            mav_type: VehicleType::Generic,
            flight_mode: mode_string_acm(0),
            messages: HashMap::new(),
        };

        reader.bootstrap_clock()?;
        reader.scanner.rewind();
        reader.clock.rewind_event();

        let bytes: &[u8] = &reader.data;
        reader.scanner.prepass(bytes)?;

        Ok(reader)
    }

    /// Scan forward from the start of the stream, growing the registry
    /// from every FMT/FMTU record seen along the way, until a GPS/GPS2
    /// record with a usable time pair establishes the clock's time base.
    fn bootstrap_clock(&mut self) -> Result<(), DfError> {
        let mut first_ms_stamp: i64 = 0;

        loop {
            let data: &[u8] = &self.data;
            let record = match self.scanner.parse_next(data) {
                Ok(Some(r)) => r,
                Ok(None) => break,
                Err(_) => break,
            };

            let type_name = record.type_name();
            if type_name != "GPS" && type_name != "GPS2" {
                if first_ms_stamp == 0 {
                    if let Some(ms) = record.get("TimeMS").ok().and_then(|v| v.as_i64()) {
                        if ms != 0 {
                            first_ms_stamp = ms;
                        }
                    }
                }
            } else if self.process_gps_time(&record, first_ms_stamp) {
                break;
            }
        }
        Ok(())
    }

    /// Decide whether this GPS/GPS2 record carries a usable time-base
    /// pair, trying the usec-style (`TimeUS`/`GWk`) fields before falling
    /// back to the millisecond-style (`T`/`Week`) fields. Returns `true`
    /// once a pair is found, regardless of `zero_time_base` (which only
    /// suppresses the actual clock update).
    fn process_gps_time(&mut self, record: &Record, first_ms_stamp: i64) -> bool {
        let time_us = record.get("TimeUS").ok().and_then(|v| v.as_i64()).unwrap_or(0);
        let gwk = record.get("GWk").ok().and_then(|v| v.as_i64()).unwrap_or(0);
        if time_us != 0 && gwk != 0 {
            if !self.zero_time_base {
                self.clock.find_time_base(record, first_ms_stamp);
            }
            return true;
        }

        let Some(t) = record.get("T").ok().and_then(|v| v.as_i64()) else {
            return false;
        };
        let Some(week) = record.get("Week").ok().and_then(|v| v.as_i64()) else {
            return false;
        };

        if t != 0 && week != 0 {
            let stamp = if first_ms_stamp == 0 { t } else { first_ms_stamp };
            if !self.zero_time_base {
                self.clock.find_time_base(record, stamp);
            }
            return true;
        }
        false
    }

    /// Decode the next record, stamp it with an interpolated timestamp,
    /// and fold it into the reader's running state (`messages`,
    /// `mav_type`, `flight_mode`).
    pub fn next(&mut self) -> Result<Option<Record>, DfError> {
        let data: &[u8] = &self.data;
        let mut record = match self.scanner.parse_next(data)? {
            Some(r) => r,
            None => return Ok(None),
        };

        self.clock.message_arrived(&record);
        self.clock.set_message_timestamp(&mut record);
        self.add_message(&record);

        Ok(Some(record))
    }

    fn add_message(&mut self, record: &Record) {
        self.messages.insert(record.type_name().to_string(), record.clone());

        if record.type_name() == "MSG" {
            if let Some(message) = record.message() {
                if let Some(mav_type) = classify_mav_type(&message) {
                    self.mav_type = mav_type;
                }
            }
        }

        if record.type_name() == "MODE" {
            let mode = record.mode();
            self.flight_mode = if mode != -1 {
                mode_string_acm(mode)
            } else {
                "UNKNOWN".to_string()
            };
        }
    }

    /// Reset iteration to the start of the stream. The frame index built
    /// by the prepass and the registry's learned descriptors survive;
    /// only per-record iteration state is cleared.
    pub fn rewind(&mut self) {
        self.scanner.rewind();
        self.clock.rewind_event();
        self.messages.clear();
        self.flight_mode = mode_string_acm(0);
        self.mav_type = VehicleType::Generic;
    }

    pub fn percent(&self) -> f64 {
        self.scanner.percent
    }

    pub fn mav_type(&self) -> VehicleType {
        self.mav_type
    }

    pub fn flight_mode(&self) -> &str {
        &self.flight_mode
    }

    pub fn messages(&self) -> &HashMap<String, Record> {
        &self.messages
    }

    pub fn registry(&self) -> &crate::registry::FormatRegistry {
        &self.scanner.registry
    }

    pub fn offsets_for(&self, type_id: u8) -> &[usize] {
        self.scanner.offsets_for(type_id)
    }

    pub fn count_for(&self, type_id: u8) -> u64 {
        self.scanner.count_for(type_id)
    }
}
