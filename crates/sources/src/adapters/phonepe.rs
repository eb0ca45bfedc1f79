//! Password-protected transaction-statement PDF.

use khata_core::{Currency, ParsedBundle, SourceApp, UnifiedTransaction};
use khata_formats::{parse_statement, validate_secret};

use crate::{
    find_by_extension, Adapter, Detection, Extraction, ParseContext, RawPayloads, SourceError,
    SourceParse,
};

pub static ADAPTER: Adapter = Adapter {
    id: SourceApp::PhonePe,
    extensions: &[".pdf"],
    requires_secret: true,
    detect,
    extract,
    parse,
};

const PDF_MAGIC: &[u8] = b"%PDF";

fn detect(payloads: &RawPayloads) -> Option<Detection> {
    let mut signals = Vec::new();
    if let Some((name, payload)) = find_by_extension(payloads, &[".pdf"]) {
        signals.push(("pdf statement file", 0.3));
        if payload.head_bytes().starts_with(PDF_MAGIC) {
            signals.push(("pdf magic bytes", 0.2));
        }
        if name.to_lowercase().contains("phonepe") {
            signals.push(("provider name in file name", 0.4));
        } else if payload.preview_text().contains("PhonePe") {
            signals.push(("provider name in text", 0.4));
        }
    } else if payloads.values().any(|p| p.head_bytes().starts_with(PDF_MAGIC)) {
        signals.push(("pdf magic bytes", 0.3));
    }
    Detection::from_signals(SourceApp::PhonePe, signals)
}

fn extract(payloads: &RawPayloads) -> Result<Extraction<'_>, SourceError> {
    let primary = find_by_extension(payloads, &[".pdf"])
        .or_else(|| {
            payloads
                .iter()
                .find(|(_, p)| p.head_bytes().starts_with(PDF_MAGIC))
                .map(|(n, p)| (n.as_str(), p))
        })
        .ok_or(SourceError::MissingDocument(SourceApp::PhonePe))?;
    Ok(Extraction { primary, auxiliary: Vec::new() })
}

fn parse(
    extraction: &Extraction<'_>,
    ctx: &ParseContext<'_>,
) -> Result<SourceParse, SourceError> {
    let bytes = extraction.primary.1.as_bytes();
    // Cheap decrypt check first: a wrong secret is reported before any text
    // extraction work happens.
    validate_secret(bytes, ctx.secret)?;
    let statement = parse_statement(bytes, ctx.secret)?;

    let mut transactions = Vec::with_capacity(statement.rows.len());
    for row in statement.rows {
        let amount = Currency::parse(&row.amount_text);
        let text = if row.counterparty.is_empty() {
            row.description.as_str()
        } else {
            row.counterparty.as_str()
        };
        let hit = ctx.classifier.classify(text, Some(amount.value));
        transactions.push(UnifiedTransaction {
            timestamp: row.timestamp,
            external_id: row.external_id,
            description: row.description,
            product_label: row.counterparty,
            payment_method_label: row.payment_method,
            // The statement only prints settled entries.
            status: "Completed".to_string(),
            amount,
            category: Some(hit.category),
            source: SourceApp::PhonePe,
        });
    }

    Ok(SourceParse {
        bundle: ParsedBundle { transactions, ..Default::default() },
        skipped: statement.skipped,
    })
}
