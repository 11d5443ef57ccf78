//! Session log: the ordered record of confirmed weights.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Display format for a record's capture date.
const DATE_FORMAT: &str = "%d-%m-%Y";

/// Display format for a record's capture time.
const TIME_FORMAT: &str = "%H:%M:%S";

/// A confirmed measurement. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// 1-based position in the log.
    pub sequence: u32,

    /// Recorded weight in kilograms.
    pub weight_kg: f64,

    /// Local wall-clock time the weight was captured.
    pub captured_at: NaiveDateTime,
}

impl SessionRecord {
    /// Capture date as `DD-MM-YYYY`.
    #[must_use]
    pub fn date(&self) -> String {
        self.captured_at.format(DATE_FORMAT).to_string()
    }

    /// Capture time as `HH:MM:SS`.
    #[must_use]
    pub fn time(&self) -> String {
        self.captured_at.format(TIME_FORMAT).to_string()
    }
}

/// Aggregate totals over a session log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total_weight_kg: f64,
    pub item_count: usize,
}

/// Append-only sequence of [`SessionRecord`]s with running totals.
///
/// Sequence numbers are assigned here, so they stay contiguous from 1 for
/// the current contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionLog {
    records: Vec<SessionRecord>,
    total_weight_kg: f64,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a weight and returns the record created for it.
    pub(crate) fn append(&mut self, weight_kg: f64, captured_at: NaiveDateTime) -> SessionRecord {
        let record = SessionRecord {
            sequence: self.next_sequence(),
            weight_kg,
            captured_at,
        };
        self.total_weight_kg += weight_kg;
        self.records.push(record.clone());
        record
    }

    /// Removes all records and resets the totals.
    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.total_weight_kg = 0.0;
    }

    pub fn records(&self) -> &[SessionRecord] {
        &self.records
    }

    pub const fn total_weight_kg(&self) -> f64 {
        self.total_weight_kg
    }

    pub fn item_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            total_weight_kg: self.total_weight_kg,
            item_count: self.item_count(),
        }
    }

    fn next_sequence(&self) -> u32 {
        u32::try_from(self.records.len() + 1).unwrap_or(u32::MAX)
    }
}
