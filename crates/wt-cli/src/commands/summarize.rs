//! Prints the totals of an exported CSV file.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};

use wt_core::parse_export;

/// Each exported weight is rounded to the gram.
const ROUNDING_PER_ROW_KG: f64 = 0.0005;

pub fn run<W: Write>(writer: &mut W, path: &Path) -> Result<()> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let export =
        parse_export(&text).with_context(|| format!("failed to parse {}", path.display()))?;

    if export.item_count != export.rows.len() {
        bail!(
            "export lists {} items but contains {} rows",
            export.item_count,
            export.rows.len()
        );
    }

    writeln!(writer, "Items: {}", export.item_count)?;
    writeln!(writer, "Total weight: {:.3} kg", export.total_weight_kg)?;
    if let (Some(first), Some(last)) = (export.rows.first(), export.rows.last()) {
        writeln!(writer, "First: {} {}", first.date, first.time)?;
        writeln!(writer, "Last: {} {}", last.date, last.time)?;
    }

    let row_sum: f64 = export.rows.iter().map(|row| row.weight_kg).sum();
    #[expect(clippy::cast_precision_loss, reason = "row counts are small")]
    let tolerance = ROUNDING_PER_ROW_KG * export.rows.len() as f64 + 1e-9;
    if (row_sum - export.total_weight_kg).abs() > tolerance {
        writeln!(writer, "Warning: rows add up to {row_sum:.3} kg")?;
    }

    Ok(())
}
