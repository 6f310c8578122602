//! Tabular import: CSV reading, column detection, and row normalization
//!
//! Turns a headers + rows table and a column mapping into raw transactions.
//! Individual rows that fail to parse are dropped silently; document-level
//! problems (no headers, oversized input) are reported as errors.

use chrono::NaiveDate;
use csv::ReaderBuilder;
use std::io::Read;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{ColumnMapping, RawTransaction, Table};

/// Upper bound on source rows per upload. Larger exports are rejected at the
/// boundary rather than silently truncated.
pub const MAX_SOURCE_ROWS: usize = 5000;

/// Header keywords for each column role, checked in this order so a header
/// is never assigned to two roles.
const DATE_KEYWORDS: &[&str] = &["date", "posted", "trans date"];
const DESCRIPTION_KEYWORDS: &[&str] = &[
    "description",
    "merchant",
    "name",
    "memo",
    "payee",
    "narration",
];
const AMOUNT_KEYWORDS: &[&str] = &["amount", "debit", "credit", "total", "sum", "value"];
const CATEGORY_KEYWORDS: &[&str] = &["category", "type", "classification"];

/// Read CSV data into the headers + rows table shape
pub fn read_csv<R: Read>(reader: R) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(Error::Import(
            "The file is empty or has no header row. Check that your CSV has column headers in the first row.".to_string(),
        ));
    }

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        if rows.len() >= MAX_SOURCE_ROWS {
            return Err(Error::TooLarge(format!(
                "The file has more than {} rows. Split the export into smaller date ranges and try again.",
                MAX_SOURCE_ROWS
            )));
        }
        rows.push(record.iter().map(|cell| cell.to_string()).collect());
    }

    debug!(rows = rows.len(), "read CSV table");
    Ok(Table { headers, rows })
}

/// Columns resolved by header auto-detection. Any role can remain unresolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectedColumns {
    pub date_column: Option<String>,
    pub description_column: Option<String>,
    pub amount_column: Option<String>,
    pub category_column: Option<String>,
}

impl DetectedColumns {
    /// A full mapping, if all three required roles were resolved
    pub fn into_mapping(self) -> Option<ColumnMapping> {
        Some(ColumnMapping {
            date_column: self.date_column?,
            description_column: self.description_column?,
            amount_column: self.amount_column?,
            category_column: self.category_column,
        })
    }
}

/// Scan headers for well-known column names. The first header matching a
/// role's keyword set wins; a claimed header is skipped for later roles.
pub fn detect_columns(headers: &[String]) -> DetectedColumns {
    let mut claimed: Vec<&str> = Vec::new();

    let mut find = |keywords: &[&str]| -> Option<String> {
        let found = headers.iter().find(|h| {
            let lower = h.to_lowercase();
            !claimed.contains(&h.as_str()) && keywords.iter().any(|k| lower.contains(k))
        })?;
        claimed.push(found.as_str());
        Some(found.clone())
    };

    DetectedColumns {
        date_column: find(DATE_KEYWORDS),
        description_column: find(DESCRIPTION_KEYWORDS),
        amount_column: find(AMOUNT_KEYWORDS),
        category_column: find(CATEGORY_KEYWORDS),
    }
}

/// Normalize table rows into raw transactions using the given mapping
///
/// Returns an empty vec when any required column is missing from the header
/// set. Rows with an unparsable date or amount, or an empty description, are
/// dropped; the emitted count plus the dropped count equals the row count.
pub fn apply_mapping(table: &Table, mapping: &ColumnMapping) -> Vec<RawTransaction> {
    let position = |name: &str| table.headers.iter().position(|h| h == name);

    let (date_idx, desc_idx, amount_idx) = match (
        position(&mapping.date_column),
        position(&mapping.description_column),
        position(&mapping.amount_column),
    ) {
        (Some(d), Some(de), Some(a)) => (d, de, a),
        _ => {
            warn!(
                date = %mapping.date_column,
                description = %mapping.description_column,
                amount = %mapping.amount_column,
                "column mapping does not resolve against table headers"
            );
            return Vec::new();
        }
    };
    let category_idx = mapping.category_column.as_deref().and_then(position);

    let mut transactions = Vec::new();
    let mut dropped = 0usize;

    for row in &table.rows {
        let cell = |idx: usize| row.get(idx).map(|c| c.as_str()).unwrap_or("");

        let date = match parse_date(cell(date_idx)) {
            Some(d) => d,
            None => {
                dropped += 1;
                continue;
            }
        };
        let amount = match parse_amount(cell(amount_idx)) {
            Some(a) => a,
            None => {
                dropped += 1;
                continue;
            }
        };
        let description = cell(desc_idx).trim();
        if description.is_empty() {
            dropped += 1;
            continue;
        }

        let raw_category = category_idx
            .map(|idx| cell(idx).trim().to_string())
            .filter(|c| !c.is_empty());

        transactions.push(RawTransaction {
            date,
            description: description.to_string(),
            amount,
            raw_category,
        });
    }

    debug!(
        emitted = transactions.len(),
        dropped, "normalized table rows"
    );
    transactions
}

/// Parse a date cell in the formats bank exports actually use
///
/// ISO `YYYY-MM-DD`; slash dates preferring `MM/DD/YYYY` and falling back to
/// `DD/MM/YYYY` when the first slot cannot be a month; two-digit years map to
/// 19xx when >= 50 and 20xx otherwise.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }

    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    let a: u32 = parts[0].parse().ok()?;
    let b: u32 = parts[1].parse().ok()?;
    let year = parse_year(parts[2])?;

    // Prefer month-first; only read day-first when month-first is impossible
    NaiveDate::from_ymd_opt(year, a, b).or_else(|| NaiveDate::from_ymd_opt(year, b, a))
}

fn parse_year(s: &str) -> Option<i32> {
    let raw: i32 = s.parse().ok()?;
    match s.len() {
        4 => Some(raw),
        2 => Some(if raw >= 50 { 1900 + raw } else { 2000 + raw }),
        _ => None,
    }
}

/// Parse an amount cell, handling currency symbols, thousands separators,
/// Unicode minus, and parenthesized negatives
pub fn parse_amount(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parenthesized = trimmed.starts_with('(') && trimmed.ends_with(')');
    let inner = if parenthesized {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };

    let cleaned = inner
        .replace('\u{2212}', "-")
        .replace(['$', ',', ' '], "");

    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    Some(if parenthesized { -value.abs() } else { value })
}
