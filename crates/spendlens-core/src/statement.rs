//! Statement text segmentation
//!
//! Turns the positioned text fragments extracted from a bank statement's text
//! layer into the same headers + rows table the CSV path produces: fragments
//! are grouped into printed lines by vertical position, then a single forward
//! pass classifies each line and assembles date/description/amount rows,
//! carrying one pending transaction across multi-line descriptions.

use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::import::parse_amount;
use crate::models::{ColumnMapping, Table};

/// A positioned text item from one page of a statement's text layer
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    /// Horizontal position (left edge)
    pub x: f64,
    /// Vertical position; larger values are higher on the page
    pub y: f64,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            text: text.into(),
            x,
            y,
        }
    }
}

/// Vertical jitter tolerance when coalescing fragments into printed lines
const Y_TOLERANCE: f64 = 2.0;

/// Cap on logical lines across the whole document
const MAX_LINES: usize = 10_000;

/// Documents with less extracted text than this are treated as scanned images
const MIN_TEXT_LEN: usize = 20;

/// Boilerplate line openings that never carry transactions
const NOISE_PREFIXES: &[&str] = &[
    "opening balance",
    "closing balance",
    "beginning balance",
    "ending balance",
    "statement period",
    "account number",
    "account summary",
    "page ",
    "continued on",
    "continued from",
    "subtotal",
    "total debits",
    "total credits",
    "total charges",
    "total deposits",
    "total withdrawals",
    "total fees",
    "balance forward",
    "previous balance",
    "new balance",
    "interest charged",
    "minimum payment",
    "payment due",
    "thank you",
    "customer service",
];

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(\d{1,2}/\d{1,2}(?:/\d{2,4})?|\d{4}-\d{2}-\d{2}|(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\.?\s+\d{1,2}(?:[,\s]+\d{4})?)\s",
    )
    .expect("date pattern compiles")
});

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[-\u{2212}]?\$?\s?[\d,]+\.\d{2}|\(\$?\s?[\d,]+\.\d{2}\)")
        .expect("amount pattern compiles")
});

static SLASH_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})/(\d{1,2})(?:/(\d{2}|\d{4}))?$").expect("slash date pattern compiles")
});

static NAMED_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:\s+(\d{4}))?$")
        .expect("named date pattern compiles")
});

/// The fixed mapping for tables produced by [`parse_statement`]
pub fn statement_mapping() -> ColumnMapping {
    ColumnMapping {
        date_column: "Date".to_string(),
        description_column: "Description".to_string(),
        amount_column: "Amount".to_string(),
        category_column: None,
    }
}

/// Parse a statement's extracted text, one fragment list per page in
/// document order, into a `Date`/`Description`/`Amount` table
pub fn parse_statement(pages: &[Vec<TextFragment>]) -> Result<Table> {
    let total_text_len: usize = pages
        .iter()
        .flat_map(|page| page.iter())
        .map(|fragment| fragment.text.len())
        .sum();

    let mut lines = Vec::new();
    for page in pages {
        lines.extend(group_lines(page));
        if lines.len() > MAX_LINES {
            return Err(Error::TooLarge(
                "The statement is too large or complex to process. Try a CSV export from your bank instead.".to_string(),
            ));
        }
    }

    if total_text_len < MIN_TEXT_LEN {
        return Err(Error::UnsupportedFormat(
            "Unable to extract text from this statement. Make sure it is text-based (not a scanned image) or try a CSV export from your bank instead.".to_string(),
        ));
    }

    let rows = parse_transaction_lines(&lines);
    if rows.is_empty() {
        return Err(Error::UnsupportedFormat(
            "No transactions could be found in this statement. The layout may not be supported; try a CSV export from your bank instead.".to_string(),
        ));
    }

    debug!(lines = lines.len(), rows = rows.len(), "segmented statement");
    Ok(Table {
        headers: vec![
            "Date".to_string(),
            "Description".to_string(),
            "Amount".to_string(),
        ],
        rows: rows
            .into_iter()
            .map(|row| vec![row.date, row.description, row.amount.to_string()])
            .collect(),
    })
}

/// Reconstruct printed lines from one page's fragments: bucket by quantized
/// vertical position, order buckets top-to-bottom, fragments left-to-right
fn group_lines(fragments: &[TextFragment]) -> Vec<String> {
    let mut buckets: HashMap<i64, Vec<(f64, &str)>> = HashMap::new();

    for fragment in fragments {
        if fragment.text.is_empty() {
            continue;
        }
        let key = (fragment.y / Y_TOLERANCE).round() as i64;
        buckets
            .entry(key)
            .or_default()
            .push((fragment.x, fragment.text.as_str()));
    }

    let mut keys: Vec<i64> = buckets.keys().copied().collect();
    keys.sort_unstable_by(|a, b| b.cmp(a));

    keys.into_iter()
        .filter_map(|key| buckets.remove(&key))
        .map(|mut segments| {
            segments.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            segments
                .iter()
                .map(|(_, text)| *text)
                .collect::<Vec<_>>()
                .join(" ")
                .trim()
                .to_string()
        })
        .collect()
}

/// A raw date/description/amount row assembled from statement lines
#[derive(Debug, Clone, PartialEq)]
struct ParsedRow {
    date: String,
    description: String,
    amount: f64,
}

/// A transaction started but not yet complete: the amount may still be
/// unknown, or the amount may be known while the description is empty and
/// expected on a continuation line
#[derive(Debug, Clone)]
struct PendingTransaction {
    date: String,
    description: String,
    amount: Option<f64>,
}

impl PendingTransaction {
    /// The carried amount, if one was already resolved to a nonzero value
    fn resolved_amount(&self) -> Option<f64> {
        self.amount.filter(|amount| *amount != 0.0)
    }
}

/// A monetary token found in a line, with its byte offset
struct AmountToken {
    start: usize,
    value: f64,
}

fn find_amounts(text: &str) -> Vec<AmountToken> {
    AMOUNT_RE
        .find_iter(text)
        .filter_map(|m| {
            parse_amount(m.as_str()).map(|value| AmountToken {
                start: m.start(),
                value,
            })
        })
        .collect()
}

/// Pick the signed amount for a line that may carry several monetary tokens
/// (typically separate debit/credit/balance columns)
///
/// One token is used as-is. Two tokens are read as a debit/credit pair when
/// exactly one of them is zero; with both nonzero the pair is ambiguous and
/// the last token is used verbatim, as it is with three or more tokens.
fn resolve_amounts(tokens: &[AmountToken]) -> f64 {
    match tokens {
        [] => 0.0,
        [single] => single.value,
        [first, second] => {
            if first.value != 0.0 && second.value == 0.0 {
                -first.value.abs()
            } else if first.value == 0.0 && second.value != 0.0 {
                second.value.abs()
            } else {
                second.value
            }
        }
        [.., last] => last.value,
    }
}

fn is_noise(line: &str) -> bool {
    let lower = line.to_lowercase();
    NOISE_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One forward pass over the reconstructed lines, carrying at most one
/// pending transaction across continuation lines
fn parse_transaction_lines(lines: &[String]) -> Vec<ParsedRow> {
    let mut transactions = Vec::new();
    let mut pending: Option<PendingTransaction> = None;

    for raw_line in lines {
        let line = raw_line.trim();
        if line.is_empty() || is_noise(line) {
            continue;
        }

        if let Some(captures) = DATE_RE.captures(line) {
            // A new transaction starts: flush whatever was pending
            if let Some(prev) = pending.take() {
                if !prev.description.is_empty() {
                    transactions.push(ParsedRow {
                        date: prev.date,
                        description: prev.description,
                        amount: prev.amount.unwrap_or(0.0),
                    });
                }
            }

            let date = normalize_date(&captures[1]);
            let rest = line[captures[0].len()..].trim();
            let amounts = find_amounts(rest);

            if amounts.is_empty() {
                // Amount not on this line; hold the description
                pending = Some(PendingTransaction {
                    date,
                    description: rest.to_string(),
                    amount: None,
                });
                continue;
            }

            let description = collapse_whitespace(&rest[..amounts[0].start]);
            let amount = resolve_amounts(&amounts);

            if description.is_empty() {
                // Amount known, description expected on a continuation line
                pending = Some(PendingTransaction {
                    date,
                    description: String::new(),
                    amount: Some(amount),
                });
                continue;
            }

            transactions.push(ParsedRow {
                date,
                description,
                amount,
            });
        } else if let Some(mut prev) = pending.take() {
            let amounts = find_amounts(line);

            if amounts.is_empty() {
                // Pure description continuation
                prev.description = collapse_whitespace(&format!("{} {}", prev.description, line));
                pending = Some(prev);
                continue;
            }

            let continuation = line[..amounts[0].start].trim();
            let description = collapse_whitespace(&format!("{} {}", prev.description, continuation));
            // An amount carried from the opening line wins over later tokens
            let amount = prev
                .resolved_amount()
                .unwrap_or_else(|| resolve_amounts(&amounts));

            if !description.is_empty() {
                transactions.push(ParsedRow {
                    date: prev.date,
                    description,
                    amount,
                });
            }
        }
    }

    if let Some(prev) = pending {
        if !prev.description.is_empty() {
            if let Some(amount) = prev.resolved_amount() {
                transactions.push(ParsedRow {
                    date: prev.date,
                    description: prev.description,
                    amount,
                });
            }
        }
    }

    transactions
}

/// Normalize a matched date token to ISO `YYYY-MM-DD`
///
/// Slash dates read month-first; a missing year resolves to the current
/// year. Tokens that fit no known shape pass through unchanged and are
/// dropped later by row normalization.
fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim().replace(',', "");

    if NaiveDate::parse_from_str(&trimmed, "%Y-%m-%d").is_ok() {
        return trimmed;
    }

    if let Some(captures) = SLASH_DATE_RE.captures(&trimmed) {
        let month = &captures[1];
        let day = &captures[2];
        let year = match captures.get(3) {
            Some(y) if y.as_str().len() == 4 => y.as_str().to_string(),
            Some(y) => {
                let two_digit: i32 = y.as_str().parse().unwrap_or(0);
                let century = if two_digit >= 50 { 1900 } else { 2000 };
                (century + two_digit).to_string()
            }
            None => Utc::now().year().to_string(),
        };
        return format!("{}-{:0>2}-{:0>2}", year, month, day);
    }

    if let Some(captures) = NAMED_DATE_RE.captures(&trimmed) {
        let month = match captures[1].to_lowercase().as_str() {
            "jan" => "01",
            "feb" => "02",
            "mar" => "03",
            "apr" => "04",
            "may" => "05",
            "jun" => "06",
            "jul" => "07",
            "aug" => "08",
            "sep" => "09",
            "oct" => "10",
            "nov" => "11",
            _ => "12",
        };
        let day = &captures[2];
        let year = captures
            .get(3)
            .map(|y| y.as_str().to_string())
            .unwrap_or_else(|| Utc::now().year().to_string());
        return format!("{}-{}-{:0>2}", year, month, day);
    }

    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_group_lines_coalesces_jitter_and_orders() {
        let fragments = vec![
            TextFragment::new("$45.20", 300.0, 700.6),
            TextFragment::new("01/05/2024", 50.0, 700.9),
            TextFragment::new("COFFEE SHOP", 120.0, 700.1),
            TextFragment::new("NEXT LINE", 50.0, 650.0),
        ];

        let grouped = group_lines(&fragments);
        assert_eq!(grouped, vec!["01/05/2024 COFFEE SHOP $45.20", "NEXT LINE"]);
    }

    #[test]
    fn test_normalize_date() {
        assert_eq!(normalize_date("2024-03-05"), "2024-03-05");
        assert_eq!(normalize_date("03/05/2024"), "2024-03-05");
        assert_eq!(normalize_date("3/5/24"), "2024-03-05");
        assert_eq!(normalize_date("1/15/99"), "1999-01-15");
        assert_eq!(normalize_date("Jan 5, 2024"), "2024-01-05");
        assert_eq!(normalize_date("March 17 2024"), "2024-03-17");
    }

    #[test]
    fn test_normalize_date_without_year_uses_current_year() {
        let year = Utc::now().year();
        assert_eq!(normalize_date("3/17"), format!("{}-03-17", year));
    }

    #[test]
    fn test_resolve_two_token_debit_credit_pair() {
        let debit = find_amounts("$45.20 $0.00");
        assert_eq!(resolve_amounts(&debit), -45.20);

        let credit = find_amounts("$0.00 $45.20");
        assert_eq!(resolve_amounts(&credit), 45.20);
    }

    #[test]
    fn test_resolve_ambiguous_pair_uses_last_token() {
        let both = find_amounts("$45.20 $12.00");
        assert_eq!(resolve_amounts(&both), 12.00);
    }

    #[test]
    fn test_resolve_three_tokens_uses_last() {
        // Debit plus running balance columns: the last token wins
        let tokens = find_amounts("$45.20 $0.00 $1,254.36");
        assert_eq!(resolve_amounts(&tokens), 1254.36);
    }

    #[test]
    fn test_single_token_keeps_own_sign() {
        let paren = find_amounts("($12.50)");
        assert_eq!(resolve_amounts(&paren), -12.50);

        let negative = find_amounts("-$5.00");
        assert_eq!(resolve_amounts(&negative), -5.00);
    }

    #[test]
    fn test_parse_simple_transaction_lines() {
        let rows = parse_transaction_lines(&lines(&[
            "01/05/2024 COFFEE SHOP -4.50",
            "01/06/2024 PAYROLL DEPOSIT 1,200.00",
        ]));

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, "2024-01-05");
        assert_eq!(rows[0].description, "COFFEE SHOP");
        assert_eq!(rows[0].amount, -4.50);
        assert_eq!(rows[1].amount, 1200.00);
    }

    #[test]
    fn test_parse_multiline_description() {
        let rows = parse_transaction_lines(&lines(&[
            "01/05/2024 ELECTRONIC PAYMENT",
            "TO CITY WATER UTILITY 88.40",
        ]));

        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].description,
            "ELECTRONIC PAYMENT TO CITY WATER UTILITY"
        );
        assert_eq!(rows[0].amount, 88.40);
    }

    #[test]
    fn test_parse_description_only_continuations_accumulate() {
        let rows = parse_transaction_lines(&lines(&[
            "01/05/2024 ACH TRANSFER",
            "REF 9921",
            "ACME LANDLORD LLC $950.00",
        ]));

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description, "ACH TRANSFER REF 9921 ACME LANDLORD LLC");
        assert_eq!(rows[0].amount, 950.00);
    }

    #[test]
    fn test_pending_amount_takes_priority_over_continuation_tokens() {
        // Date line carries the amount but no description; the continuation
        // line's own token must not replace it
        let rows = parse_transaction_lines(&lines(&[
            "01/05/2024 $23.99",
            "STREAMING SERVICE 0.00",
        ]));

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description, "STREAMING SERVICE");
        assert_eq!(rows[0].amount, 23.99);
    }

    #[test]
    fn test_noise_lines_skipped() {
        let rows = parse_transaction_lines(&lines(&[
            "Opening Balance $1,000.00",
            "01/05/2024 COFFEE SHOP -4.50",
            "Page 2 of 3",
            "Total fees $0.00",
            "01/06/2024 BOOKSTORE -12.00",
            "Closing Balance $983.50",
        ]));

        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_pending_without_amount_flushes_on_next_date() {
        let rows = parse_transaction_lines(&lines(&[
            "01/05/2024 MYSTERY CHARGE",
            "01/06/2024 COFFEE SHOP -4.50",
        ]));

        // The dangling transaction is flushed with a zero amount mid-stream
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].description, "MYSTERY CHARGE");
        assert_eq!(rows[0].amount, 0.0);
        assert_eq!(rows[1].amount, -4.50);
    }

    #[test]
    fn test_trailing_pending_needs_description_and_amount() {
        // Description but no amount at end of input: dropped
        let rows = parse_transaction_lines(&lines(&["01/05/2024 DANGLING CHARGE"]));
        assert!(rows.is_empty());

        // Amount but no description at end of input: dropped
        let rows = parse_transaction_lines(&lines(&["01/05/2024 $12.00"]));
        assert!(rows.is_empty());
    }

    #[test]
    fn test_parse_statement_end_to_end() {
        let page = vec![
            TextFragment::new("ACME BANK STATEMENT", 50.0, 800.0),
            TextFragment::new("Statement Period 01/01/2024 - 01/31/2024", 50.0, 780.0),
            TextFragment::new("01/05/2024", 50.0, 760.0),
            TextFragment::new("COFFEE SHOP", 150.0, 760.0),
            TextFragment::new("$4.50", 400.0, 760.0),
            TextFragment::new("$0.00", 500.0, 760.0),
            TextFragment::new("01/06/2024", 50.0, 740.0),
            TextFragment::new("PAYROLL", 150.0, 740.0),
            TextFragment::new("$0.00", 400.0, 740.0),
            TextFragment::new("$1,200.00", 500.0, 740.0),
        ];

        let table = parse_statement(&[page]).unwrap();
        assert_eq!(table.headers, vec!["Date", "Description", "Amount"]);
        assert_eq!(table.rows.len(), 2);
        // Debit column populated: forced negative
        assert_eq!(table.rows[0], vec!["2024-01-05", "COFFEE SHOP", "-4.5"]);
        // Credit column populated: forced positive
        assert_eq!(table.rows[1], vec!["2024-01-06", "PAYROLL", "1200"]);
    }

    #[test]
    fn test_parse_statement_rejects_empty_document() {
        let err = parse_statement(&[vec![]]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_parse_statement_rejects_unparseable_text() {
        let page = vec![TextFragment::new(
            "This statement contains prose but no transaction rows at all.",
            50.0,
            700.0,
        )];
        let err = parse_statement(&[page]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_parse_statement_line_cap() {
        let page: Vec<TextFragment> = (0..(MAX_LINES + 2))
            .map(|i| TextFragment::new("filler text line", 50.0, 100_000.0 - (i as f64) * 10.0))
            .collect();
        let err = parse_statement(&[page]).unwrap_err();
        assert!(matches!(err, Error::TooLarge(_)));
    }
}
