//! Reader for ArduPilot DataFlash (`.bin`) telemetry logs.
//!
//! This crate provides a self-describing binary decoder for the format:
//!
//! - A format registry bootstrapped from the hard-coded `FMT` descriptor
//!   and grown from `FMT`/`FMTU` records as the stream is read
//! - A resynchronising frame scanner with an index-building prepass
//! - GPS-interpolated wall-clock reconstruction for every record
//!
//! # Example
//!
//! ```no_run
//! use dflog_core::DataFlashReader;
//!
//! let mut reader = DataFlashReader::open("flight.bin", false).unwrap();
//! while let Some(record) = reader.next().unwrap() {
//!     println!("{} @ {:?}", record.type_name(), record.timestamp());
//! }
//! ```

pub mod clock;
pub mod error;
pub mod format;
pub mod io_utils;
pub mod progress;
pub mod reader;
pub mod record;
pub mod registry;
pub mod scanner;
pub mod types;

pub use clock::GpsClock;
pub use error::DfError;
pub use progress::{new_counter, ProgressCounter};
pub use reader::DataFlashReader;
pub use record::Record;
pub use registry::FormatRegistry;
pub use types::*;
