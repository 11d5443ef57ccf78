//! Core domain logic for the weight tracker.
//!
//! This crate contains:
//! - Reading normalization: raw scale values to kilograms
//! - The stability engine: detecting settled weights and recording them
//! - The session log and its CSV export

pub mod engine;
pub mod export;
pub mod reading;
pub mod session_log;

pub use engine::{
    Engine, EngineError, MIN_WEIGHT_KG, MeasuringReason, STABILITY_THRESHOLD_GRAMS,
    STABLE_READINGS_NEEDED, SessionState, StabilityState, Status,
};
pub use export::{ExportError, ExportRow, ParsedExport, export_csv, export_file_name, parse_export};
pub use reading::{Reading, ReadingError, Unit, normalize};
pub use session_log::{SessionLog, SessionRecord, SessionSummary};
