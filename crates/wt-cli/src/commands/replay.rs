//! Replays a captured stream of server frames through a fresh session.
//!
//! The capture holds one JSON frame per line, exactly as received from the
//! scale server. Every frame is treated as arriving now.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;

use wt_core::{Engine, SessionLog, export_csv};

use crate::protocol;

pub fn run<W: Write>(writer: &mut W, input: &Path, output: Option<&Path>) -> Result<()> {
    let file =
        File::open(input).with_context(|| format!("failed to open {}", input.display()))?;
    let log = replay(BufReader::new(file))?;
    let csv = export_csv(&log).context("replay recorded no items")?;

    match output {
        Some(path) => {
            fs::write(path, &csv).with_context(|| format!("failed to write {}", path.display()))?;
            writeln!(
                writer,
                "Recorded {} items ({:.3} kg) to {}",
                log.item_count(),
                log.total_weight_kg(),
                path.display()
            )?;
        }
        None => writer.write_all(csv.as_bytes())?,
    }

    Ok(())
}

/// Runs one recording session over the frames in `reader`.
pub fn replay<R: BufRead>(reader: R) -> Result<SessionLog> {
    let mut engine = Engine::new();
    engine.on_connection_change(true);
    engine.start_session()?;

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.context("failed to read capture")?;
        if line.trim().is_empty() {
            continue;
        }

        if let Some(reading) = protocol::reading_from_frame(&line, Local::now().naive_local()) {
            engine.on_reading(reading);
        }
        for status in engine.drain_notifications() {
            tracing::debug!(line = line_num + 1, %status, "replay");
        }
    }

    engine.stop_session()?;
    Ok(engine.log().clone())
}
