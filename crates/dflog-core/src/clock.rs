//! GPS-interpolated wall-clock reconstruction.
//!
//! DataFlash logs stamp every record with a monotonic counter, not a wall
//! clock. `GpsClock` tracks a `time_base` anchored at the most recent GPS
//! fix and interpolates between fixes using a learned per-type message
//! rate, so every record (not just GPS ones) gets a Unix timestamp.

use crate::record::Record;
use std::collections::HashMap;

const SECONDS_IN_DAY: i64 = 86400;
const DAYS_IN_YEAR: i64 = 365;
const YEARS_IN_LEAP_CYCLE: i64 = 4;
const EPOCH_LEAP_YEAR_OFFSET: i64 = 1980;
const EPOCH_START_YEAR: i64 = 1969;
const EPOCH_DAYS_FROM_YEAR: i64 = 6;
const EPOCH_DAYS_FROM_WEEKDAY: i64 = 2;
const DAYS_IN_WEEK: i64 = 7;
const EPOCH_DAYS_OFFSET: i64 = 10;
const LEAP_YEAR_ADJUSTMENT: i64 = 1;
const LEAP_SECONDS_ADJUSTMENT: f64 = 18.0;
const MILLISECONDS_IN_SECOND: f64 = 0.001;

/// Default message rate (Hz) assumed until the first GPS fix lets the
/// clock learn real per-type rates.
const DEFAULT_RATE_HZ: f64 = 50.0;

#[derive(Debug, Default)]
pub struct GpsClock {
    msg_rate: HashMap<String, f64>,
    counts_since_gps: HashMap<String, u64>,
    time_base: f64,
    timestamp: f64,
}

impl GpsClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time_base(&self) -> f64 {
        self.time_base
    }

    pub fn set_time_base(&mut self, base: f64) {
        self.time_base = base;
    }

    /// Drop accumulated per-type counts. Called when the scanner rewinds
    /// to the start of the stream for a second pass.
    pub fn rewind_event(&mut self) {
        self.counts_since_gps.clear();
    }

    /// GPS week + time-of-week (ms) to Unix seconds, leap seconds applied.
    pub fn gps_time_to_unix_time(week: i64, msec: i64) -> f64 {
        let epoch = SECONDS_IN_DAY
            * (EPOCH_DAYS_OFFSET * DAYS_IN_YEAR
                + (EPOCH_LEAP_YEAR_OFFSET - EPOCH_START_YEAR) / YEARS_IN_LEAP_CYCLE
                + LEAP_YEAR_ADJUSTMENT
                + EPOCH_DAYS_FROM_YEAR
                - EPOCH_DAYS_FROM_WEEKDAY);

        epoch as f64 + (SECONDS_IN_DAY * DAYS_IN_WEEK * week) as f64
            + msec as f64 * MILLISECONDS_IN_SECOND
            - LEAP_SECONDS_ADJUSTMENT
    }

    /// Bootstrap the time base from the first GPS record seen while
    /// scanning forward from the start of the file, given the monotonic
    /// counter value (`TimeUS`/equivalent) that record carried.
    pub fn find_time_base(&mut self, record: &Record, first_stamp: i64) {
        let Some(week) = record.get("Week").ok().and_then(|v| v.as_i64()) else {
            return;
        };
        let Some(time_ms) = record.get("TimeMS").ok().and_then(|v| v.as_i64()) else {
            return;
        };

        let t = Self::gps_time_to_unix_time(week, time_ms);
        let base = t - first_stamp as f64 * MILLISECONDS_IN_SECOND;
        self.time_base = base;
        self.timestamp = self.time_base + first_stamp as f64 * MILLISECONDS_IN_SECOND;
    }

    /// Steady-state per-record bookkeeping: bump the type's count, and if
    /// this is a GPS record, attempt to re-anchor the time base.
    pub fn message_arrived(&mut self, record: &Record) {
        let type_name = record.type_name();
        *self.counts_since_gps.entry(type_name.to_string()).or_insert(0) += 1;

        if type_name == "GPS" || type_name == "GPS2" {
            self.gps_message_arrived(record);
        }
    }

    /// Try each known GPS field-name convention in turn: `Week`/`TimeMS`,
    /// then `GWk`/`GMS`, then bail on a PX4-style `GPSTime` field (handled
    /// elsewhere, not by this clock), then `Wk`/`TWk`.
    fn gps_message_arrived(&mut self, record: &Record) {
        let mut week = record.get("Week").ok().and_then(|v| v.as_i64());
        let mut time_ms = record.get("TimeMS").ok().and_then(|v| v.as_i64());

        if week.is_none() {
            week = record.get("GWk").ok().and_then(|v| v.as_i64());
            time_ms = record.get("GMS").ok().and_then(|v| v.as_i64());
        }

        if week.is_none() {
            if record.get("GPSTime").is_ok() {
                return;
            }
            week = record.get("Wk").ok().and_then(|v| v.as_i64());
            if week.is_some() {
                time_ms = record.get("TWk").ok().and_then(|v| v.as_i64());
            }
        }

        let (Some(week), Some(time_ms)) = (week, time_ms) else {
            return;
        };

        let t = Self::gps_time_to_unix_time(week, time_ms);
        let deltat = t - self.time_base;
        if deltat <= 0.0 {
            return;
        }

        for (type_name, count) in &self.counts_since_gps {
            let rate = *count as f64 / deltat;
            let entry = self.msg_rate.entry(type_name.clone()).or_insert(0.0);
            if rate > *entry {
                *entry = rate;
            }
        }
        self.msg_rate.insert("IMU".to_string(), DEFAULT_RATE_HZ);

        self.time_base = t;
        self.counts_since_gps.clear();
    }

    /// Stamp `record` with an interpolated Unix timestamp: `time_base`
    /// plus how far into the current inter-fix window this type's count
    /// has progressed, at its learned (or default 50Hz) rate.
    pub fn set_message_timestamp(&self, record: &mut Record) {
        let type_name = record.type_name().to_string();
        let mut rate = self.msg_rate.get(&type_name).copied().unwrap_or(0.0);
        if rate == 0.0 {
            rate = DEFAULT_RATE_HZ;
        }
        let count = self.counts_since_gps.get(&type_name).copied().unwrap_or(0);
        record.set_timestamp(self.time_base + count as f64 / rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatDescriptor;
    use crate::types::Value;
    use std::sync::Arc;

    fn gps_record(week: i64, time_ms: i64) -> Record {
        let cols = ["Week", "TimeMS"].iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let d = Arc::new(FormatDescriptor::build(201, "GPS", 11, "Hi", &cols).unwrap());
        Record::new(d, vec![Value::I64(week), Value::I64(time_ms)])
    }

    #[test]
    fn test_gps_time_to_unix_time_epoch() {
        // Week 0, ms 0 should land on the GPS epoch (1980-01-06) minus leap seconds.
        let t = GpsClock::gps_time_to_unix_time(0, 0);
        assert!((t - (315_964_800.0 - 18.0)).abs() < 1e-6);
    }

    #[test]
    fn test_find_time_base() {
        let mut clock = GpsClock::new();
        let record = gps_record(2000, 123_000);
        clock.find_time_base(&record, 5_000_000);
        let expected = GpsClock::gps_time_to_unix_time(2000, 123_000) - 5000.0;
        assert!((clock.time_base() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_message_arrived_learns_rate_and_resets_counts() {
        let mut clock = GpsClock::new();
        clock.set_time_base(GpsClock::gps_time_to_unix_time(2000, 0));

        let imu_cols = vec!["v".to_string()];
        let imu_descriptor = Arc::new(FormatDescriptor::build(210, "IMU", 4, "B", &imu_cols).unwrap());
        for _ in 0..50 {
            let record = Record::new(imu_descriptor.clone(), vec![Value::I64(0)]);
            clock.message_arrived(&record);
        }

        let fix = gps_record(2000, 1_000);
        clock.message_arrived(&fix);

        assert_eq!(clock.msg_rate.get("IMU"), Some(&50.0));
        assert_eq!(clock.counts_since_gps.get("IMU"), None);
    }

    #[test]
    fn test_gps_message_arrived_ignores_non_positive_delta() {
        let mut clock = GpsClock::new();
        let base = GpsClock::gps_time_to_unix_time(2000, 5_000);
        clock.set_time_base(base);
        let earlier = gps_record(2000, 1_000);
        clock.gps_message_arrived(&earlier);
        assert_eq!(clock.time_base(), base);
    }

    #[test]
    fn test_set_message_timestamp_uses_default_rate() {
        let mut clock = GpsClock::new();
        clock.set_time_base(1000.0);
        let cols = vec!["v".to_string()];
        let d = Arc::new(FormatDescriptor::build(210, "ATT", 4, "B", &cols).unwrap());
        let mut record = Record::new(d, vec![Value::I64(0)]);
        clock.set_message_timestamp(&mut record);
        assert!((record.timestamp() - 1000.0).abs() < 1e-9);
    }
}
