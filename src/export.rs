//! Report export
//!
//! One flat row per pair (code, file name, match kind, similarity,
//! validation, comment, timestamp), written as CSV or JSON.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

use crate::pairing::{MatchKind, Pair};
use crate::pipeline::BatchReport;
use crate::session::ReviewSession;
use crate::similarity::Comparison;
use crate::validation::{PageKey, PairStatus, ValidationLedger};

/// Timestamp layout used in reports
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Default CSV delimiter
pub const DEFAULT_DELIMITER: u8 = b';';

/// Export error types
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unknown export format: {0}")]
    UnknownFormat(String),
}

pub type Result<T> = std::result::Result<T, ExportError>;

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl std::str::FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(ExportError::UnknownFormat(s.to_string())),
        }
    }
}

/// One exported pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Filename")]
    pub filename: String,
    #[serde(rename = "Match")]
    pub match_kind: String,
    #[serde(rename = "Similarity")]
    pub similarity: String,
    #[serde(rename = "Validation")]
    pub validation: String,
    #[serde(rename = "Comment")]
    pub comment: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

impl ExportRow {
    /// Project one pair.
    ///
    /// `comparison` is the page 0 outcome, `None` when the pair was never
    /// compared.
    pub fn build(
        index: usize,
        code: &str,
        filename: &str,
        match_kind: MatchKind,
        comparison: Option<&Comparison>,
        status: PairStatus,
        ledger: &ValidationLedger,
    ) -> Self {
        let similarity = comparison
            .map(Comparison::display_score)
            .unwrap_or_else(|| "N/A".to_string());

        let validation = if status == PairStatus::Approved && ledger.is_auto_approved(index) {
            "Auto-Approved".to_string()
        } else {
            status.to_string()
        };

        let latest = ledger.latest_decision(index);
        Self {
            code: code.to_string(),
            filename: filename.to_string(),
            match_kind: match_kind.label().to_string(),
            similarity,
            validation,
            comment: latest.map(|v| v.comment.clone()).unwrap_or_default(),
            timestamp: latest
                .and_then(|v| v.decided_at)
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_default(),
        }
    }
}

/// Rows for a batch run, in pair order
pub fn rows_from_batch(report: &BatchReport, ledger: &ValidationLedger) -> Vec<ExportRow> {
    report
        .pairs
        .iter()
        .map(|pair| {
            ExportRow::build(
                pair.index,
                &pair.code,
                &pair.file_name,
                pair.match_kind,
                pair.first_comparison(),
                ledger.pair_status(pair.index, pair.total_pages),
                ledger,
            )
        })
        .collect()
}

/// Rows for every pair of a session (matched-only filter ignored)
pub fn rows_from_session(session: &ReviewSession) -> Vec<ExportRow> {
    session
        .pairs()
        .iter()
        .enumerate()
        .map(|(index, pair): (usize, &Pair)| {
            ExportRow::build(
                index,
                pair.code(),
                &pair.display_name(),
                pair.match_kind(),
                session.comparison(PageKey::new(index, 0)),
                session.pair_status(index),
                session.ledger(),
            )
        })
        .collect()
}

/// Write rows as delimited text with a header line
pub fn write_csv<W: Write>(rows: &[ExportRow], writer: W, delimiter: u8) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write rows as a pretty-printed JSON array
pub fn write_json<W: Write>(rows: &[ExportRow], mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, rows)?;
    writeln!(writer)?;
    Ok(())
}

/// Write rows to `output`, or stdout when `None`
pub fn export_rows(
    rows: &[ExportRow],
    output: Option<&Path>,
    format: ExportFormat,
    delimiter: u8,
) -> Result<()> {
    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(std::io::BufWriter::new(std::fs::File::create(path)?)),
        None => Box::new(std::io::stdout()),
    };

    match format {
        ExportFormat::Csv => write_csv(rows, writer, delimiter),
        ExportFormat::Json => write_json(rows, writer),
    }
}
