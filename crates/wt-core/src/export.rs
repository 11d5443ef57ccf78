//! CSV export of the session log.
//!
//! Layout:
//!
//! ```text
//! S.No,Weight (kg),Date,Time
//! 1,1.001,14-03-2025,09:26:53
//!
//! Total Weight,1.001 kg
//! Total Items,1
//! ```

use std::fmt::Write;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::session_log::SessionLog;

/// Header row of an export.
pub const HEADER: &str = "S.No,Weight (kg),Date,Time";

const TOTAL_WEIGHT_LABEL: &str = "Total Weight";
const TOTAL_ITEMS_LABEL: &str = "Total Items";

/// Export errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExportError {
    /// There are no records to export.
    #[error("no data to export")]
    Empty,
    /// The first line is not the expected header.
    #[error("missing export header")]
    MissingHeader,
    /// A line could not be parsed.
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    /// A summary line is absent.
    #[error("missing summary line: {0}")]
    MissingSummary(&'static str),
}

/// Renders the log as CSV text.
pub fn export_csv(log: &SessionLog) -> Result<String, ExportError> {
    if log.is_empty() {
        return Err(ExportError::Empty);
    }

    let mut csv = String::new();
    writeln!(csv, "{HEADER}").unwrap();
    for record in log.records() {
        writeln!(
            csv,
            "{},{:.3},{},{}",
            record.sequence,
            record.weight_kg,
            record.date(),
            record.time()
        )
        .unwrap();
    }
    writeln!(csv).unwrap();
    writeln!(csv, "{TOTAL_WEIGHT_LABEL},{:.3} kg", log.total_weight_kg()).unwrap();
    writeln!(csv, "{TOTAL_ITEMS_LABEL},{}", log.item_count()).unwrap();

    Ok(csv)
}

/// File name for an export created at `now`: `scale_YYYYMMDD_HHMM.csv`.
#[must_use]
pub fn export_file_name(now: NaiveDateTime) -> String {
    format!("scale_{}.csv", now.format("%Y%m%d_%H%M"))
}

/// One data row read back from an export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub sequence: u32,
    pub weight_kg: f64,
    pub date: String,
    pub time: String,
}

/// An export read back into rows and totals.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExport {
    pub rows: Vec<ExportRow>,
    pub total_weight_kg: f64,
    pub item_count: usize,
}

/// Parses text produced by [`export_csv`].
pub fn parse_export(text: &str) -> Result<ParsedExport, ExportError> {
    let mut lines = text.lines().enumerate().map(|(i, line)| (i + 1, line.trim_end()));

    match lines.next() {
        Some((_, HEADER)) => {}
        _ => return Err(ExportError::MissingHeader),
    }

    let mut rows = Vec::new();
    for (line_no, line) in lines.by_ref() {
        if line.is_empty() {
            break;
        }
        rows.push(parse_row(line_no, line)?);
    }

    let (line_no, line) = lines
        .next()
        .ok_or(ExportError::MissingSummary(TOTAL_WEIGHT_LABEL))?;
    let total = summary_value(line_no, line, TOTAL_WEIGHT_LABEL)?;
    let total_weight_kg = parse_number(line_no, total.trim_end_matches(" kg"))?;

    let (line_no, line) = lines
        .next()
        .ok_or(ExportError::MissingSummary(TOTAL_ITEMS_LABEL))?;
    let item_count = parse_number(line_no, summary_value(line_no, line, TOTAL_ITEMS_LABEL)?)?;

    Ok(ParsedExport {
        rows,
        total_weight_kg,
        item_count,
    })
}

fn parse_row(line_no: usize, line: &str) -> Result<ExportRow, ExportError> {
    let fields: Vec<&str> = line.split(',').collect();
    let [sequence, weight, date, time] = fields[..] else {
        return Err(ExportError::Malformed {
            line: line_no,
            reason: format!("expected 4 fields, got {}", fields.len()),
        });
    };

    Ok(ExportRow {
        sequence: parse_number(line_no, sequence)?,
        weight_kg: parse_number(line_no, weight)?,
        date: date.to_string(),
        time: time.to_string(),
    })
}

fn summary_value<'a>(
    line_no: usize,
    line: &'a str,
    label: &'static str,
) -> Result<&'a str, ExportError> {
    line.strip_prefix(label)
        .and_then(|rest| rest.strip_prefix(','))
        .ok_or_else(|| ExportError::Malformed {
            line: line_no,
            reason: format!("expected `{label},<value>`"),
        })
}

fn parse_number<T: std::str::FromStr>(line_no: usize, value: &str) -> Result<T, ExportError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|err: T::Err| ExportError::Malformed {
        line: line_no,
        reason: format!("invalid number `{value}`: {err}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;
    use insta::assert_snapshot;
    use proptest::prelude::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn sample_log() -> SessionLog {
        let mut log = SessionLog::new();
        log.append(1.0014, at(9, 26, 53));
        log.append(0.25, at(9, 27, 4));
        log.append(12.3456, at(10, 0, 0));
        log
    }

    #[test]
    fn test_export_layout() {
        let csv = export_csv(&sample_log()).unwrap();

        assert_snapshot!(csv, @r"
        S.No,Weight (kg),Date,Time
        1,1.001,14-03-2025,09:26:53
        2,0.250,14-03-2025,09:27:04
        3,12.346,14-03-2025,10:00:00

        Total Weight,13.597 kg
        Total Items,3
        ");
        assert!(csv.ends_with("Total Items,3\n"));
    }

    #[test]
    fn test_empty_log_is_not_exported() {
        assert_eq!(export_csv(&SessionLog::new()), Err(ExportError::Empty));
    }

    #[test]
    fn test_parse_reads_back_rounded_rows_and_totals() {
        let log = sample_log();
        let parsed = parse_export(&export_csv(&log).unwrap()).unwrap();

        assert_eq!(parsed.rows.len(), log.item_count());
        assert_eq!(parsed.item_count, log.item_count());
        for (row, record) in parsed.rows.iter().zip(log.records()) {
            assert_eq!(row.sequence, record.sequence);
            assert!((row.weight_kg - (record.weight_kg * 1000.0).round() / 1000.0).abs() < 1e-9);
            assert_eq!(row.date, record.date());
            assert_eq!(row.time, record.time());
        }
        let rounded_total = (log.total_weight_kg() * 1000.0).round() / 1000.0;
        assert!((parsed.total_weight_kg - rounded_total).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn test_parse_returns_every_exported_row(
            entries in prop::collection::vec((1u32..100_000, 0u32..86_400), 1..60),
        ) {
            let mut log = SessionLog::new();
            for &(grams, second) in &entries {
                log.append(f64::from(grams) / 1000.0, at(0, 0, 0) + chrono::Duration::seconds(i64::from(second)));
            }

            let parsed = parse_export(&export_csv(&log).unwrap()).unwrap();

            prop_assert_eq!(parsed.rows.len(), entries.len());
            prop_assert_eq!(parsed.item_count, entries.len());
            for (row, record) in parsed.rows.iter().zip(log.records()) {
                prop_assert_eq!(row.sequence, record.sequence);
                prop_assert!((row.weight_kg - record.weight_kg).abs() < 1e-9);
                prop_assert_eq!(&row.date, &record.date());
                prop_assert_eq!(&row.time, &record.time());
            }
            let grams: u32 = entries.iter().map(|&(grams, _)| grams).sum();
            prop_assert!((parsed.total_weight_kg - f64::from(grams) / 1000.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_parse_rejects_missing_header() {
        assert_eq!(
            parse_export("1,1.000,14-03-2025,09:00:00\n"),
            Err(ExportError::MissingHeader)
        );
    }

    #[test]
    fn test_parse_reports_malformed_line_number() {
        let text = format!("{HEADER}\n1,1.000,14-03-2025,09:00:00\n2,abc,14-03-2025,09:00:01\n");
        let err = parse_export(&text).unwrap_err();
        assert!(matches!(err, ExportError::Malformed { line: 3, .. }), "{err}");
    }

    #[test]
    fn test_parse_requires_summary() {
        let text = format!("{HEADER}\n1,1.000,14-03-2025,09:00:00\n\nTotal Weight,1.000 kg\n");
        assert_eq!(
            parse_export(&text),
            Err(ExportError::MissingSummary("Total Items"))
        );
    }

    #[test]
    fn test_file_name_uses_minute_resolution() {
        assert_eq!(export_file_name(at(9, 5, 59)), "scale_20250314_0905.csv");
    }
}
