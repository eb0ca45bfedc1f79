//! Activity-log HTML export plus optional JSON reward feeds.

use khata_core::{ParsedBundle, SourceApp};
use khata_formats::{
    parse_activity, parse_cashback_rewards, parse_group_expenses, parse_voucher_rewards,
};

use crate::{
    find_by_extension, Adapter, Detection, Extraction, ParseContext, RawPayload, RawPayloads,
    SourceError, SourceParse,
};

pub static ADAPTER: Adapter = Adapter {
    id: SourceApp::GooglePay,
    extensions: &[".html", ".json"],
    requires_secret: false,
    detect,
    extract,
    parse,
};

const FEED_MARKERS: &[&str] = &[
    "group_expenses",
    "groupExpenses",
    "voucher_rewards",
    "voucherRewards",
    "cashback_rewards",
    "cashbackRewards",
];

fn detect(payloads: &RawPayloads) -> Option<Detection> {
    let mut signals = Vec::new();
    if let Some((_, payload)) = find_by_extension(payloads, &[".html"]) {
        signals.push(("html activity file", 0.3));
        let head = payload.preview_text();
        if head.contains("content-cell") || head.contains("outer-cell") {
            signals.push(("activity log markup", 0.4));
        }
        if head.contains("Google Pay") {
            signals.push(("provider name in markup", 0.3));
        }
    }
    if payloads
        .iter()
        .any(|(name, p)| name.to_lowercase().ends_with(".json") && feed_like(p))
    {
        signals.push(("reward feed file", 0.2));
    }
    Detection::from_signals(SourceApp::GooglePay, signals)
}

fn feed_like(payload: &RawPayload) -> bool {
    let head = payload.preview_text();
    FEED_MARKERS.iter().any(|marker| head.contains(marker))
}

fn extract(payloads: &RawPayloads) -> Result<Extraction<'_>, SourceError> {
    let primary = payloads
        .iter()
        .find(|(name, payload)| {
            name.to_lowercase().ends_with(".html")
                || payload.preview_text().contains("content-cell")
        })
        .map(|(n, p)| (n.as_str(), p))
        .ok_or(SourceError::MissingDocument(SourceApp::GooglePay))?;
    let auxiliary = payloads
        .iter()
        .filter(|(name, _)| name.to_lowercase().ends_with(".json"))
        .map(|(n, p)| (n.as_str(), p))
        .collect();
    Ok(Extraction { primary, auxiliary })
}

fn parse(
    extraction: &Extraction<'_>,
    ctx: &ParseContext<'_>,
) -> Result<SourceParse, SourceError> {
    let html = extraction.primary.1.text_lossy();
    let activity = parse_activity(&html, ctx.correction);
    let mut skipped = activity.skipped;

    let mut bundle = ParsedBundle {
        activities: activity.records,
        ..Default::default()
    };
    for record in &mut bundle.activities {
        let text = record
            .recipient
            .as_deref()
            .or(record.sender.as_deref())
            .unwrap_or(&record.title);
        let hit = ctx.classifier.classify(text, record.amount.map(|a| a.value));
        record.category = Some(hit.category);
    }

    for (_, payload) in &extraction.auxiliary {
        let text = payload.text_lossy();
        let groups = parse_group_expenses(&text)?;
        let vouchers = parse_voucher_rewards(&text)?;
        let cashbacks = parse_cashback_rewards(&text)?;
        skipped += groups.skipped + vouchers.skipped + cashbacks.skipped;
        bundle.group_expenses.extend(groups.items);
        bundle.voucher_rewards.extend(vouchers.items);
        bundle.cashback_rewards.extend(cashbacks.items);
    }

    Ok(SourceParse { bundle, skipped })
}
