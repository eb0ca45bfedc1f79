use std::io::Cursor;

use calamine::{Data, Range, Reader, Xlsx};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::warn;

use crate::dates;
use crate::tabular::ColumnMap;

/// Money direction read off the amount cell's sign. Unsigned amounts are
/// debits; credits are marked with an explicit leading `+`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Debit,
    Credit,
}

#[derive(Debug, Clone)]
pub struct SheetRow {
    pub timestamp: NaiveDateTime,
    pub external_id: String,
    pub description: String,
    pub status: String,
    /// Amount as written in the cell, sign included.
    pub amount_text: String,
    pub flow: Flow,
}

#[derive(Debug)]
pub struct SheetParse {
    pub rows: Vec<SheetRow>,
    pub skipped: usize,
}

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("Failed to open workbook: {0}")]
    Workbook(#[from] calamine::XlsxError),
    #[error("Workbook has no sheet named '{0}'")]
    MissingSheet(String),
    #[error("No header row found in sheet")]
    MissingHeaderRow,
    #[error("Missing required column: {0}")]
    MissingColumn(String),
}

/// Parse one named sheet of an XLSX workbook. A workbook without the sheet
/// is structural; a sheet that exists but holds no data rows parses to an
/// empty result.
pub fn parse_sheet(bytes: &[u8], sheet: &str, map: &ColumnMap) -> Result<SheetParse, SheetError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
    if !workbook.sheet_names().iter().any(|n| n == sheet) {
        return Err(SheetError::MissingSheet(sheet.to_string()));
    }
    let range = workbook.worksheet_range(sheet)?;
    parse_range(&range, map)
}

/// Range-level core of [`parse_sheet`]. The header row is found by scanning
/// for the row that carries all required captions; provider exports put
/// summary banners above it.
pub fn parse_range(range: &Range<Data>, map: &ColumnMap) -> Result<SheetParse, SheetError> {
    if range.is_empty() {
        return Ok(SheetParse { rows: Vec::new(), skipped: 0 });
    }

    let (header_row, find) = scan_header(range, map)?;
    let required = |caption: &str| {
        find(caption).ok_or_else(|| SheetError::MissingColumn(caption.to_string()))
    };
    let c_timestamp = required(&map.timestamp)?;
    let c_id = required(&map.external_id)?;
    let c_amount = required(&map.amount)?;
    let c_description = map.description.as_deref().and_then(&find);
    let c_status = map.status.as_deref().and_then(&find);

    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for (index, row) in range.rows().enumerate().skip(header_row + 1) {
        if row.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }
        let timestamp = match cell_datetime(row.get(c_timestamp)) {
            Some(ts) => ts,
            None => {
                warn!(row = index, "skipping sheet row without parsable timestamp");
                skipped += 1;
                continue;
            }
        };
        let external_id = cell_text(row.get(c_id));
        if external_id.is_empty() {
            warn!(row = index, "skipping sheet row without transaction id");
            skipped += 1;
            continue;
        }
        let (amount_text, flow) = cell_amount(row.get(c_amount));

        rows.push(SheetRow {
            timestamp,
            external_id,
            description: c_description.map(|c| cell_text(row.get(c))).unwrap_or_default(),
            status: c_status.map(|c| cell_text(row.get(c))).unwrap_or_default(),
            amount_text,
            flow,
        });
    }

    Ok(SheetParse { rows, skipped })
}

type HeaderLookup<'a> = Box<dyn Fn(&str) -> Option<usize> + 'a>;

fn scan_header<'a>(
    range: &'a Range<Data>,
    map: &ColumnMap,
) -> Result<(usize, HeaderLookup<'a>), SheetError> {
    let caption_of = |cell: &Data| match cell {
        Data::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    for (r_idx, row) in range.rows().enumerate() {
        let captions: Vec<String> = row.iter().map(caption_of).collect();
        let has = |caption: &str| {
            captions.iter().any(|c| c.eq_ignore_ascii_case(caption))
        };
        if has(&map.timestamp) && has(&map.external_id) && has(&map.amount) {
            let lookup = move |caption: &str| {
                captions.iter().position(|c| c.eq_ignore_ascii_case(caption))
            };
            return Ok((r_idx, Box::new(lookup)));
        }
    }
    Err(SheetError::MissingHeaderRow)
}

fn cell_text(cell: Option<&Data>) -> String {
    match cell {
        Some(Data::String(s)) => s.trim().to_string(),
        Some(Data::Empty) | None => String::new(),
        Some(other) => other.to_string().trim().to_string(),
    }
}

fn cell_datetime(cell: Option<&Data>) -> Option<NaiveDateTime> {
    match cell? {
        Data::String(s) => dates::parse_datetime(s),
        Data::Float(f) => serial_to_datetime(*f),
        Data::Int(i) => serial_to_datetime(*i as f64),
        Data::DateTime(dt) => serial_to_datetime(dt.as_f64()),
        Data::DateTimeIso(s) => dates::parse_datetime(s),
        _ => None,
    }
}

/// Excel serial datetime, days since 1899-12-30 with the time of day in the
/// fraction.
fn serial_to_datetime(v: f64) -> Option<NaiveDateTime> {
    if !v.is_finite() || v <= 0.0 {
        return None;
    }
    let days = v.floor() as i64;
    let secs = ((v - v.floor()) * 86_400.0).round() as i64;
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    Some(base + Duration::days(days) + Duration::seconds(secs))
}

/// One sign rule regardless of cell type: an explicit leading `+` marks a
/// credit, everything else (negative or unsigned) is a debit.
fn cell_amount(cell: Option<&Data>) -> (String, Flow) {
    let text = match cell {
        Some(Data::Float(f)) => f.to_string(),
        Some(Data::Int(i)) => i.to_string(),
        _ => cell_text(cell),
    };
    let flow = if text.trim_start().starts_with('+') {
        Flow::Credit
    } else {
        Flow::Debit
    };
    (text, flow)
}
