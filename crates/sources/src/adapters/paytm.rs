//! Passbook spreadsheet export.

use khata_core::{Currency, ParsedBundle, SourceApp, UnifiedTransaction};
use khata_formats::{parse_sheet, ColumnMap};

use crate::{
    find_by_extension, Adapter, Detection, Extraction, ParseContext, RawPayloads, SourceError,
    SourceParse,
};

pub static ADAPTER: Adapter = Adapter {
    id: SourceApp::Paytm,
    extensions: &[".xlsx"],
    requires_secret: false,
    detect,
    extract,
    parse,
};

const SHEET_NAME: &str = "Passbook Payment History";
/// XLSX files are zip archives.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

fn columns() -> ColumnMap {
    ColumnMap {
        timestamp: "Date".to_string(),
        external_id: "Transaction ID".to_string(),
        amount: "Amount".to_string(),
        description: Some("Description".to_string()),
        product: None,
        payment_method: None,
        status: Some("Status".to_string()),
    }
}

fn detect(payloads: &RawPayloads) -> Option<Detection> {
    let mut signals = Vec::new();
    if let Some((name, payload)) = find_by_extension(payloads, &[".xlsx"]) {
        signals.push(("spreadsheet file", 0.3));
        if payload.head_bytes().starts_with(ZIP_MAGIC) {
            signals.push(("xlsx magic bytes", 0.2));
        }
        if name.to_lowercase().contains("paytm") {
            signals.push(("provider name in file name", 0.4));
        }
    }
    Detection::from_signals(SourceApp::Paytm, signals)
}

fn extract(payloads: &RawPayloads) -> Result<Extraction<'_>, SourceError> {
    let primary = find_by_extension(payloads, &[".xlsx"])
        .or_else(|| {
            payloads
                .iter()
                .find(|(_, p)| p.head_bytes().starts_with(ZIP_MAGIC))
                .map(|(n, p)| (n.as_str(), p))
        })
        .ok_or(SourceError::MissingDocument(SourceApp::Paytm))?;
    Ok(Extraction { primary, auxiliary: Vec::new() })
}

fn parse(
    extraction: &Extraction<'_>,
    ctx: &ParseContext<'_>,
) -> Result<SourceParse, SourceError> {
    let parsed = parse_sheet(extraction.primary.1.as_bytes(), SHEET_NAME, &columns())?;

    let mut transactions = Vec::with_capacity(parsed.rows.len());
    for row in parsed.rows {
        let amount = Currency::parse(&row.amount_text);
        let hit = ctx.classifier.classify(&row.description, Some(amount.value));
        transactions.push(UnifiedTransaction {
            timestamp: row.timestamp,
            external_id: row.external_id,
            description: row.description,
            product_label: String::new(),
            payment_method_label: String::new(),
            status: row.status,
            amount,
            category: Some(hit.category),
            source: SourceApp::Paytm,
        });
    }

    Ok(SourceParse {
        bundle: ParsedBundle { transactions, ..Default::default() },
        skipped: parsed.skipped,
    })
}
