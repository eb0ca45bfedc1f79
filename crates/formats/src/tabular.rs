use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::dates;

/// Header captions addressing the ledger columns. Matching is
/// case-insensitive against the file's header row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMap {
    pub timestamp: String,
    pub external_id: String,
    pub amount: String,
    pub description: Option<String>,
    pub product: Option<String>,
    pub payment_method: Option<String>,
    pub status: Option<String>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        ColumnMap {
            timestamp: "Date".to_string(),
            external_id: "Transaction ID".to_string(),
            amount: "Amount".to_string(),
            description: Some("Description".to_string()),
            product: Some("Product".to_string()),
            payment_method: Some("Payment Method".to_string()),
            status: Some("Status".to_string()),
        }
    }
}

/// One provisional ledger row. The amount is deliberately kept as unparsed
/// text; canonical currency parsing happens in `khata_core::Currency`.
#[derive(Debug, Clone)]
pub struct LedgerRow {
    pub timestamp: NaiveDateTime,
    pub external_id: String,
    pub description: String,
    pub product: String,
    pub payment_method: String,
    pub status: String,
    pub amount_text: String,
}

#[derive(Debug)]
pub struct TabularParse {
    pub rows: Vec<LedgerRow>,
    /// Rows dropped for missing identity fields or unparsable dates.
    pub skipped: usize,
}

#[derive(Error, Debug)]
pub enum TabularError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Missing required column: {0}")]
    MissingColumn(String),
}

/// Parse a header-driven CSV ledger. A row missing its timestamp or unique
/// id is skipped and counted, never fatal; a missing required *column* is a
/// structural failure.
pub fn parse_ledger(content: &str, map: &ColumnMap) -> Result<TabularParse, TabularError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    let find = |caption: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(caption))
    };
    let required = |caption: &str| {
        find(caption).ok_or_else(|| TabularError::MissingColumn(caption.to_string()))
    };

    let c_timestamp = required(&map.timestamp)?;
    let c_id = required(&map.external_id)?;
    let c_amount = required(&map.amount)?;
    let c_description = map.description.as_deref().and_then(find);
    let c_product = map.product.as_deref().and_then(find);
    let c_payment = map.payment_method.as_deref().and_then(find);
    let c_status = map.status.as_deref().and_then(find);

    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for (index, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(err) => {
                warn!(row = index, %err, "skipping malformed ledger row");
                skipped += 1;
                continue;
            }
        };
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }

        let timestamp = match record.get(c_timestamp).and_then(dates_field) {
            Some(ts) => ts,
            None => {
                warn!(row = index, "skipping ledger row without parsable timestamp");
                skipped += 1;
                continue;
            }
        };
        let external_id = record.get(c_id).unwrap_or_default().trim();
        if external_id.is_empty() {
            warn!(row = index, "skipping ledger row without transaction id");
            skipped += 1;
            continue;
        }

        let field = |col: Option<usize>| {
            col.and_then(|c| record.get(c))
                .unwrap_or_default()
                .trim()
                .to_string()
        };

        rows.push(LedgerRow {
            timestamp,
            external_id: external_id.to_string(),
            description: field(c_description),
            product: field(c_product),
            payment_method: field(c_payment),
            status: field(c_status),
            amount_text: record.get(c_amount).unwrap_or_default().trim().to_string(),
        });
    }

    Ok(TabularParse { rows, skipped })
}

fn dates_field(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    dates::parse_datetime(raw)
}
