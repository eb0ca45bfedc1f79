use std::collections::BTreeMap;

use chrono::{NaiveDateTime, NaiveTime};
use lopdf::Document;
use thiserror::Error;
use tracing::warn;

use crate::dates;
use crate::sheet::Flow;

/// Lines above a transaction line searched for its date banner.
const DATE_LOOKBACK: usize = 3;
/// Lines below a transaction line searched for its id and account labels.
const DETAIL_LOOKAHEAD: usize = 5;

#[derive(Error, Debug)]
pub enum StatementError {
    #[error("Failed to read PDF: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("Failed to extract statement text: {0}")]
    Extract(#[from] pdf_extract::OutputError),
    #[error("Failed to rewrite decrypted statement: {0}")]
    Io(#[from] std::io::Error),
    #[error("Statement is password protected")]
    SecretRequired,
    #[error("Wrong statement password")]
    InvalidSecret,
}

#[derive(Debug, Clone)]
pub struct StatementRow {
    pub timestamp: NaiveDateTime,
    pub external_id: String,
    /// The transaction line as printed, e.g. `Paid to Swiggy`.
    pub description: String,
    pub counterparty: String,
    pub flow: Flow,
    pub amount_text: String,
    /// Instrument label from the detail lines, e.g. `Paid by XX1234`.
    pub payment_method: String,
    /// UTR number from the detail lines, empty when the statement omits it.
    pub reference: String,
}

#[derive(Debug)]
pub struct StatementParse {
    /// Newest first, matching the printed statement order.
    pub rows: Vec<StatementRow>,
    pub skipped: usize,
}

/// Check a statement password without parsing anything. An unprotected
/// document accepts any (or no) secret.
pub fn validate_secret(bytes: &[u8], secret: Option<&str>) -> Result<(), StatementError> {
    let mut doc = Document::load_mem(bytes)?;
    decrypt_if_needed(&mut doc, secret)
}

/// Parse a password-protected transaction statement PDF. The text layer is
/// extracted in reading order; transaction lines are recognized by their
/// direction keyword and amount, with the date banner above and the detail
/// lines below.
pub fn parse_statement(
    bytes: &[u8],
    secret: Option<&str>,
) -> Result<StatementParse, StatementError> {
    let mut doc = Document::load_mem(bytes)?;
    let text = if doc.is_encrypted() {
        decrypt_if_needed(&mut doc, secret)?;
        // Re-save so the extractor sees plain content streams.
        let mut plain = Vec::new();
        doc.save_to(&mut plain)?;
        pdf_extract::extract_text_from_mem(&plain)?
    } else {
        pdf_extract::extract_text_from_mem(bytes)?
    };
    Ok(parse_lines(&text))
}

fn decrypt_if_needed(doc: &mut Document, secret: Option<&str>) -> Result<(), StatementError> {
    if !doc.is_encrypted() {
        return Ok(());
    }
    let secret = secret.ok_or(StatementError::SecretRequired)?;
    doc.decrypt(secret).map_err(|_| StatementError::InvalidSecret)
}

/// One positioned text run from a PDF page, in page coordinates (y grows
/// upward).
#[derive(Debug, Clone)]
pub struct Fragment {
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub text: String,
}

/// Reconstruct text rows from positioned fragments: bucket by page and
/// rounded baseline, top to bottom, then left to right within each row.
pub fn group_rows(fragments: Vec<Fragment>) -> Vec<String> {
    let mut buckets: BTreeMap<(u32, i64), Vec<Fragment>> = BTreeMap::new();
    for fragment in fragments {
        let key = (fragment.page, -(fragment.y.round() as i64));
        buckets.entry(key).or_default().push(fragment);
    }
    buckets
        .into_values()
        .map(|mut row| {
            row.sort_by(|a, b| a.x.total_cmp(&b.x));
            row.iter().map(|f| f.text.as_str()).collect::<Vec<_>>().join(" ")
        })
        .collect()
}

/// Parse statement entries from positioned fragments, for callers that have
/// glyph-run coordinates rather than extracted text.
pub fn parse_fragments(fragments: Vec<Fragment>) -> StatementParse {
    parse_rows(&group_rows(fragments))
}

/// Text-level core of [`parse_statement`]: each extracted line is one row.
pub fn parse_lines(text: &str) -> StatementParse {
    let rows: Vec<String> = text.lines().map(str::to_string).collect();
    parse_rows(&rows)
}

fn parse_rows(raw: &[String]) -> StatementParse {
    let lines: Vec<String> = raw.iter().map(|l| dates::normalize(l)).collect();
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for (index, line) in lines.iter().enumerate() {
        let Some((flow, amount_text)) = transaction_line(line) else {
            continue;
        };

        let date = lines[index.saturating_sub(DATE_LOOKBACK)..index]
            .iter()
            .rev()
            .find_map(|l| dates::parse_datetime(l));
        let Some(date) = date else {
            warn!(line = index, "skipping statement entry without a date banner");
            skipped += 1;
            continue;
        };
        let timestamp = match line_time(line) {
            Some(t) => date.date().and_time(t),
            None => date,
        };

        // Detail scan stops at the next transaction header so one entry
        // never borrows the next entry's id.
        let detail_end = (index + 1 + DETAIL_LOOKAHEAD).min(lines.len());
        let details: Vec<&String> = lines[index + 1..detail_end]
            .iter()
            .take_while(|l| transaction_line(l).is_none())
            .collect();
        // Unreadable detail lines leave their fields empty; only a missing
        // date banner disqualifies the entry itself.
        let external_id = details
            .iter()
            .find_map(|l| transaction_id(l))
            .unwrap_or_default();
        let payment_method = details
            .iter()
            .find_map(|l| instrument_label(l))
            .unwrap_or_default();
        let reference = details
            .iter()
            .find_map(|l| utr_number(l))
            .unwrap_or_default();

        rows.push(StatementRow {
            timestamp,
            external_id,
            description: description_of(line),
            counterparty: counterparty_of(line),
            flow,
            amount_text,
            payment_method,
            reference,
        });
    }

    rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    StatementParse { rows, skipped }
}

/// A transaction line carries a direction keyword and an amount; everything
/// else in the statement (banners, page footers) lacks one of the two.
fn transaction_line(line: &str) -> Option<(Flow, String)> {
    let flow = if re!(r"(?i)\bDEBIT\b").is_match(line) {
        Flow::Debit
    } else if re!(r"(?i)\bCREDIT\b").is_match(line) {
        Flow::Credit
    } else {
        return None;
    };
    let amount = re!(r"(?i)(?:₹|Rs\.?)\s?[\d,]+(?:\.\d+)?")
        .find(line)?
        .as_str()
        .to_string();
    Some((flow, amount))
}

fn line_time(line: &str) -> Option<NaiveTime> {
    let m = re!(r"(?i)\b\d{1,2}:\d{2}(?::\d{2})?\s*(?:am|pm)?\b").find(line)?;
    let t = m.as_str();
    for fmt in ["%I:%M %p", "%I:%M:%S %p", "%H:%M:%S", "%H:%M"] {
        if let Ok(parsed) = NaiveTime::parse_from_str(t, fmt) {
            return Some(parsed);
        }
    }
    None
}

fn transaction_id(line: &str) -> Option<String> {
    re!(r"(?i)Transaction\s+ID\s*:?\s*(\S+)")
        .captures(line)
        .map(|c| c[1].to_string())
}

fn utr_number(line: &str) -> Option<String> {
    re!(r"(?i)\bUTR\s*(?:No\.?)?\s*:?\s*(\w+)")
        .captures(line)
        .map(|c| c[1].to_string())
}

fn instrument_label(line: &str) -> Option<String> {
    re!(r"(?i)\b((?:Paid by|Credited to)\s+\S+)")
        .captures(line)
        .map(|c| c[1].to_string())
}

fn counterparty_of(line: &str) -> String {
    re!(r"(?i)\b(?:paid to|received from|payment to|transfer to)\s+(.+?)\s+(?:DEBIT|CREDIT)\b")
        .captures(line)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default()
}

/// The human-readable part of the line: time prefix, direction keyword and
/// amount stripped off.
fn description_of(line: &str) -> String {
    let no_time = re!(r"(?i)^\s*\d{1,2}:\d{2}(?::\d{2})?\s*(?:am|pm)?\s*").replace(line, "");
    let cut = re!(r"(?i)\s+(?:DEBIT|CREDIT)\b.*$").replace(&no_time, "");
    cut.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const STATEMENT: &str = "\
Transaction Statement for 98XXXXXX01
Jun 02, 2024
08:15 pm Received from Priya Sharma CREDIT ₹1,200.00
Transaction ID T2406022015443210
UTR No. 415722893301
Credited to XX5601
Jun 01, 2024
12:05 pm Paid to Swiggy DEBIT ₹450.00
Transaction ID T2406011205998877
UTR No. 415698112233
Paid by XX5601
Page 1 of 1
";

    fn ts(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn reads_entries_with_dates_and_ids() {
        let parsed = parse_lines(STATEMENT);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.skipped, 0);

        let credit = &parsed.rows[0];
        assert_eq!(credit.flow, Flow::Credit);
        assert_eq!(credit.timestamp, ts(2, 20, 15));
        assert_eq!(credit.external_id, "T2406022015443210");
        assert_eq!(credit.counterparty, "Priya Sharma");
        assert_eq!(credit.amount_text, "₹1,200.00");
        assert_eq!(credit.payment_method, "Credited to XX5601");
        assert_eq!(credit.reference, "415722893301");

        let debit = &parsed.rows[1];
        assert_eq!(debit.flow, Flow::Debit);
        assert_eq!(debit.timestamp, ts(1, 12, 5));
        assert_eq!(debit.description, "Paid to Swiggy");
        assert_eq!(debit.payment_method, "Paid by XX5601");
    }

    #[test]
    fn rows_are_sorted_newest_first() {
        let parsed = parse_lines(STATEMENT);
        assert!(parsed.rows[0].timestamp > parsed.rows[1].timestamp);
    }

    #[test]
    fn entry_without_nearby_date_is_skipped() {
        let text = "\
Some banner
Another banner
A third banner
A fourth banner
11:00 am Paid to Zomato DEBIT ₹300.00
Transaction ID T0001
";
        let parsed = parse_lines(text);
        assert!(parsed.rows.is_empty());
        assert_eq!(parsed.skipped, 1);
    }

    #[test]
    fn entry_without_id_line_keeps_empty_fields() {
        let text = "\
Jun 01, 2024
12:05 pm Paid to Swiggy DEBIT ₹450.00
UTR No. 415698112233
";
        let parsed = parse_lines(text);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.skipped, 0);
        assert_eq!(parsed.rows[0].external_id, "");
        assert_eq!(parsed.rows[0].payment_method, "");
        assert_eq!(parsed.rows[0].reference, "415698112233");
        assert_eq!(parsed.rows[0].counterparty, "Swiggy");
    }

    #[test]
    fn entry_never_borrows_the_next_entries_id() {
        let text = "\
Jun 02, 2024
08:15 pm Received from Priya Sharma CREDIT ₹1,200.00
Jun 01, 2024
12:05 pm Paid to Swiggy DEBIT ₹450.00
Transaction ID T2406011205998877
";
        let parsed = parse_lines(text);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.skipped, 0);
        assert_eq!(parsed.rows[0].external_id, "");
        assert_eq!(parsed.rows[1].external_id, "T2406011205998877");
    }

    #[test]
    fn banner_lines_are_not_transactions() {
        assert!(transaction_line("Transaction Statement for 98XXXXXX01").is_none());
        assert!(transaction_line("Page 1 of 1").is_none());
        // Direction word without an amount is a header, not an entry.
        assert!(transaction_line("Type: DEBIT or CREDIT").is_none());
    }

    #[test]
    fn spelled_out_rupee_marker_is_accepted() {
        let (flow, amount) = transaction_line("10:00 am Paid to Chai Point DEBIT Rs. 40.00").unwrap();
        assert_eq!(flow, Flow::Debit);
        assert_eq!(amount, "Rs. 40.00");
    }

    #[test]
    fn validate_secret_rejects_unreadable_bytes() {
        assert!(matches!(
            validate_secret(b"%PDF-1.7 not a document", None),
            Err(StatementError::Pdf(_))
        ));
    }

    #[test]
    fn empty_text_is_empty_success() {
        let parsed = parse_lines("");
        assert!(parsed.rows.is_empty());
        assert_eq!(parsed.skipped, 0);
    }

    fn frag(page: u32, x: f64, y: f64, text: &str) -> Fragment {
        Fragment { page, x, y, text: text.to_string() }
    }

    #[test]
    fn unordered_fragments_reconstruct_ordered_rows() {
        let rows = group_rows(vec![
            frag(1, 200.0, 700.2, "DEBIT"),
            frag(1, 40.0, 700.0, "12:05 pm"),
            frag(1, 260.0, 699.8, "₹450.00"),
            frag(1, 90.0, 700.1, "Paid to Swiggy"),
            frag(1, 40.0, 720.0, "Jun 01, 2024"),
            frag(1, 40.0, 680.0, "Transaction ID T0042"),
        ]);
        assert_eq!(rows[0], "Jun 01, 2024");
        assert_eq!(rows[1], "12:05 pm Paid to Swiggy DEBIT ₹450.00");
        assert_eq!(rows[2], "Transaction ID T0042");
    }

    #[test]
    fn later_pages_come_after_earlier_ones() {
        let rows = group_rows(vec![
            frag(2, 40.0, 780.0, "second page"),
            frag(1, 40.0, 20.0, "first page bottom"),
        ]);
        assert_eq!(rows, vec!["first page bottom", "second page"]);
    }

    #[test]
    fn fragments_parse_like_extracted_text() {
        let parsed = parse_fragments(vec![
            frag(1, 40.0, 720.0, "Jun 01, 2024"),
            frag(1, 40.0, 700.0, "12:05 pm"),
            frag(1, 90.0, 700.1, "Paid to Swiggy"),
            frag(1, 200.0, 700.2, "DEBIT"),
            frag(1, 260.0, 699.8, "₹450.00"),
            frag(1, 40.0, 680.0, "Transaction ID T0042"),
        ]);
        assert_eq!(parsed.rows.len(), 1);
        let row = &parsed.rows[0];
        assert_eq!(row.external_id, "T0042");
        assert_eq!(row.counterparty, "Swiggy");
        assert_eq!(row.timestamp, ts(1, 12, 5));
        assert_eq!(row.flow, Flow::Debit);
    }
}
