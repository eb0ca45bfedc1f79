//! Header-driven CSV ledger export.

use khata_core::{Currency, ParsedBundle, SourceApp, UnifiedTransaction};
use khata_formats::{parse_ledger, ColumnMap};

use crate::{
    find_by_extension, Adapter, Detection, Extraction, ParseContext, RawPayload, RawPayloads,
    SourceError, SourceParse,
};

pub static ADAPTER: Adapter = Adapter {
    id: SourceApp::Cred,
    extensions: &[".csv"],
    requires_secret: false,
    detect,
    extract,
    parse,
};

fn detect(payloads: &RawPayloads) -> Option<Detection> {
    let mut signals = Vec::new();
    if let Some((name, payload)) = find_by_extension(payloads, &[".csv"]) {
        signals.push(("csv ledger file", 0.3));
        if has_ledger_header(payload) {
            signals.push(("ledger header row", 0.3));
        }
        if name.to_lowercase().contains("cred") {
            signals.push(("provider name in file name", 0.3));
        }
    }
    Detection::from_signals(SourceApp::Cred, signals)
}

fn has_ledger_header(payload: &RawPayload) -> bool {
    let head = payload.preview_text();
    let Some(first_line) = head.lines().next() else {
        return false;
    };
    let lower = first_line.to_lowercase();
    lower.contains("transaction id") && lower.contains("amount")
}

fn extract(payloads: &RawPayloads) -> Result<Extraction<'_>, SourceError> {
    let primary = find_by_extension(payloads, &[".csv"])
        .or_else(|| {
            payloads
                .iter()
                .find(|(_, p)| has_ledger_header(p))
                .map(|(n, p)| (n.as_str(), p))
        })
        .ok_or(SourceError::MissingDocument(SourceApp::Cred))?;
    Ok(Extraction { primary, auxiliary: Vec::new() })
}

fn parse(
    extraction: &Extraction<'_>,
    ctx: &ParseContext<'_>,
) -> Result<SourceParse, SourceError> {
    let text = extraction.primary.1.text_lossy();
    let parsed = parse_ledger(&text, &ColumnMap::default())?;

    let mut transactions = Vec::with_capacity(parsed.rows.len());
    for row in parsed.rows {
        let amount = Currency::parse(&row.amount_text);
        let text = if row.description.is_empty() {
            row.product.as_str()
        } else {
            row.description.as_str()
        };
        let hit = ctx.classifier.classify(text, Some(amount.value));
        transactions.push(UnifiedTransaction {
            timestamp: row.timestamp,
            external_id: row.external_id,
            description: row.description,
            product_label: row.product,
            payment_method_label: row.payment_method,
            status: row.status,
            amount,
            category: Some(hit.category),
            source: SourceApp::Cred,
        });
    }

    Ok(SourceParse {
        bundle: ParsedBundle { transactions, ..Default::default() },
        skipped: parsed.skipped,
    })
}
