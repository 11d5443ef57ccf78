//! Stability detection and session recording.
//!
//! The [`Engine`] consumes normalized readings one at a time. While a session
//! is recording it counts consecutive readings that stay within
//! [`STABILITY_THRESHOLD_GRAMS`] of each other; once [`STABLE_READINGS_NEEDED`]
//! such readings arrive above [`MIN_WEIGHT_KG`], the latest reading is
//! recorded into the [`SessionLog`] exactly once.
//!
//! Every call may queue [`Status`] notifications for the presentation layer;
//! collect them with [`Engine::drain_notifications`].

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reading::Reading;
use crate::session_log::{SessionLog, SessionRecord, SessionSummary};

/// Maximum change between consecutive readings still considered stable.
pub const STABILITY_THRESHOLD_GRAMS: f64 = 10.0;

/// Readings at or below this weight count as an empty scale.
pub const MIN_WEIGHT_KG: f64 = 0.010;

/// Consecutive stable readings required before a weight is recorded.
pub const STABLE_READINGS_NEEDED: u32 = 3;

/// Absolute difference between two kilogram weights, in grams.
fn grams_between(a_kg: f64, b_kg: f64) -> f64 {
    ((a_kg - b_kg) * 1000.0).abs()
}

/// Engine operation failures. All are recoverable.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("not connected to the scale server")]
    NotConnected,
    #[error("a recording session is already active")]
    AlreadyRecording,
    #[error("no recording session is active")]
    NotRecording,
    #[error("no weight on the scale")]
    NoWeight,
    #[error("weight has not stabilized yet")]
    NotStable,
    #[error("{weight_kg:.3} kg was already recorded (last recorded {last_recorded_kg:.3} kg)")]
    DuplicateReading {
        weight_kg: f64,
        last_recorded_kg: f64,
    },
    #[error("stop recording before clearing data")]
    RecordingInProgress,
}

/// Whether a recording session is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Measuring,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Measuring => "measuring",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-session stability tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StabilityState {
    /// Last observed reading while measuring, in kilograms.
    pub previous_weight: f64,
    /// Consecutive readings within the stability threshold.
    pub stable_count: u32,
    /// True only while a stabilization event is being handled.
    pub is_stable: bool,
    /// Most recently recorded weight; 0 when nothing has been recorded.
    pub last_recorded_weight: f64,
}

impl StabilityState {
    const fn reset_counters(&mut self) {
        self.is_stable = false;
        self.stable_count = 0;
    }
}

/// Why the engine reports that it is measuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasuringReason {
    SessionStarted,
    WeightChanging,
}

/// Notification for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Status {
    Connecting,
    Connected,
    Disconnected,
    ConnectionError { message: String },
    Ready { weight_kg: f64 },
    Measuring { reason: MeasuringReason },
    Stabilizing { count: u32, needed: u32 },
    StableRecording { weight_kg: f64 },
    DuplicateRejected { weight_kg: f64 },
    Recorded(SessionRecord),
    Saved,
    SessionSummary(SessionSummary),
    Cleared,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("Connecting..."),
            Self::Connected => f.write_str("Connected"),
            Self::Disconnected => f.write_str("Disconnected"),
            Self::ConnectionError { message } => write!(f, "Connection error: {message}"),
            Self::Ready { weight_kg } => write!(f, "Ready to record ({weight_kg:.3} kg)"),
            Self::Measuring {
                reason: MeasuringReason::SessionStarted,
            } => f.write_str("Place item on scale..."),
            Self::Measuring {
                reason: MeasuringReason::WeightChanging,
            } => f.write_str("Measuring... Weight changing"),
            Self::Stabilizing { count, needed } => write!(f, "Stabilizing... ({count}/{needed})"),
            Self::StableRecording { weight_kg } => {
                write!(f, "Stable at {weight_kg:.3} kg - auto-recording...")
            }
            Self::DuplicateRejected { weight_kg } => {
                write!(f, "{weight_kg:.3} kg was already recorded, skipped")
            }
            Self::Recorded(record) => write!(
                f,
                "Recorded #{}: {:.3} kg at {} {}",
                record.sequence,
                record.weight_kg,
                record.date(),
                record.time()
            ),
            Self::Saved => f.write_str("Saved! Place next item..."),
            Self::SessionSummary(summary) => write!(
                f,
                "Recording stopped. Total: {:.3} kg ({} items)",
                summary.total_weight_kg, summary.item_count
            ),
            Self::Cleared => f.write_str("Data cleared"),
        }
    }
}

/// Owned state of one weighing station.
#[derive(Debug, Default)]
pub struct Engine {
    state: SessionState,
    connected: bool,
    current_weight: f64,
    stability: StabilityState,
    log: SessionLog,
    outbox: Vec<Status>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the notifications queued since the last call, oldest first.
    pub fn drain_notifications(&mut self) -> Vec<Status> {
        std::mem::take(&mut self.outbox)
    }

    /// Records the transport's connection state.
    ///
    /// A dropped connection does not end the session; readings simply stop
    /// until the transport reconnects.
    pub fn on_connection_change(&mut self, connected: bool) {
        self.connected = connected;
        self.notify(if connected {
            Status::Connected
        } else {
            Status::Disconnected
        });
    }

    /// Processes one reading.
    pub fn on_reading(&mut self, reading: Reading) {
        self.current_weight = reading.weight_kg;

        match self.state {
            SessionState::Idle => self.notify(Status::Ready {
                weight_kg: reading.weight_kg,
            }),
            SessionState::Measuring => self.check_stability(reading),
        }
    }

    fn check_stability(&mut self, reading: Reading) {
        let weight = reading.weight_kg;
        let delta = grams_between(weight, self.stability.previous_weight);

        if delta <= STABILITY_THRESHOLD_GRAMS && weight > MIN_WEIGHT_KG {
            self.stability.stable_count += 1;

            if self.stability.stable_count >= STABLE_READINGS_NEEDED {
                if !self.stability.is_stable {
                    self.stability.is_stable = true;
                    tracing::debug!(weight_kg = weight, "weight stabilized");
                    self.notify(Status::StableRecording { weight_kg: weight });

                    if let Err(err) = self.record_weight(weight, reading.received_at) {
                        tracing::debug!(%err, "auto-record skipped");
                    }

                    // The next item has to settle on its own.
                    self.stability.reset_counters();
                }
            } else {
                self.notify(Status::Stabilizing {
                    count: self.stability.stable_count,
                    needed: STABLE_READINGS_NEEDED,
                });
            }
        } else if self.stability.is_stable || self.stability.stable_count > 0 {
            self.stability.reset_counters();
            self.notify(Status::Measuring {
                reason: MeasuringReason::WeightChanging,
            });
        }

        self.stability.previous_weight = weight;
    }

    /// Appends `weight_kg` to the log unless it repeats the last recorded weight.
    ///
    /// Does not check the session state; callers are the stabilization path
    /// and [`Engine::manual_save`].
    fn record_weight(
        &mut self,
        weight_kg: f64,
        captured_at: NaiveDateTime,
    ) -> Result<SessionRecord, EngineError> {
        let last = self.stability.last_recorded_weight;
        if last > 0.0 && grams_between(weight_kg, last) < STABILITY_THRESHOLD_GRAMS {
            tracing::info!(weight_kg, last_recorded_kg = last, "skipping duplicate weight");
            self.notify(Status::DuplicateRejected { weight_kg });
            return Err(EngineError::DuplicateReading {
                weight_kg,
                last_recorded_kg: last,
            });
        }

        self.stability.last_recorded_weight = weight_kg;
        let record = self.log.append(weight_kg, captured_at);
        tracing::info!(
            sequence = record.sequence,
            weight_kg,
            total_kg = self.log.total_weight_kg(),
            "recorded weight"
        );
        self.notify(Status::Recorded(record.clone()));
        Ok(record)
    }

    /// Begins a recording session.
    pub fn start_session(&mut self) -> Result<(), EngineError> {
        if !self.connected {
            return Err(EngineError::NotConnected);
        }
        if self.state == SessionState::Measuring {
            return Err(EngineError::AlreadyRecording);
        }

        self.state = SessionState::Measuring;
        // A new session never treats the previous session's last item as a duplicate.
        self.stability = StabilityState {
            previous_weight: self.current_weight,
            ..StabilityState::default()
        };

        tracing::info!(weight_kg = self.current_weight, "recording started");
        self.notify(Status::Measuring {
            reason: MeasuringReason::SessionStarted,
        });
        Ok(())
    }

    /// Ends the recording session. The log is kept.
    pub fn stop_session(&mut self) -> Result<SessionSummary, EngineError> {
        if self.state != SessionState::Measuring {
            return Err(EngineError::NotRecording);
        }

        self.state = SessionState::Idle;
        self.stability.reset_counters();

        let summary = self.log.summary();
        tracing::info!(
            total_kg = summary.total_weight_kg,
            items = summary.item_count,
            "recording stopped"
        );
        self.notify(Status::SessionSummary(summary));
        Ok(summary)
    }

    /// Records the current weight on operator request.
    ///
    /// Only succeeds while a stabilization is being confirmed; the stability
    /// counters are cleared afterwards whatever the outcome.
    pub fn manual_save(&mut self, captured_at: NaiveDateTime) -> Result<SessionRecord, EngineError> {
        if self.state != SessionState::Measuring {
            return Err(EngineError::NotRecording);
        }
        if self.current_weight <= MIN_WEIGHT_KG {
            return Err(EngineError::NoWeight);
        }
        if !self.stability.is_stable {
            return Err(EngineError::NotStable);
        }

        let result = self.record_weight(self.current_weight, captured_at);
        self.stability.reset_counters();
        if result.is_ok() {
            self.notify(Status::Saved);
        }
        result
    }

    /// Empties the log. Returns `false` if it was already empty.
    pub fn clear_log(&mut self) -> Result<bool, EngineError> {
        if self.state == SessionState::Measuring {
            return Err(EngineError::RecordingInProgress);
        }
        if self.log.is_empty() {
            return Ok(false);
        }

        let cleared = self.log.item_count();
        self.log.clear();
        self.stability.last_recorded_weight = 0.0;

        tracing::info!(records = cleared, "session log cleared");
        self.notify(Status::Cleared);
        Ok(true)
    }

    pub const fn log(&self) -> &SessionLog {
        &self.log
    }

    pub fn totals(&self) -> SessionSummary {
        self.log.summary()
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    pub const fn stability(&self) -> &StabilityState {
        &self.stability
    }

    pub const fn current_weight(&self) -> f64 {
        self.current_weight
    }

    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    fn notify(&mut self, status: Status) {
        self.outbox.push(status);
    }
}
