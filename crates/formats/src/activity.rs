use std::sync::OnceLock;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::warn;

use khata_core::{ActivityKind, ActivityRecord, Currency};

use crate::dates;

fn outer_cell() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("div.outer-cell").expect("static selector"))
}

fn content_cell() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("div.content-cell").expect("static selector"))
}

/// Statuses that keep a record. A details cell carrying none of them, or a
/// record mentioning a terminal status anywhere, drops it.
const VALID_STATUSES: &[&str] = &["completed", "sent", "paid"];
const DROP_STATUSES: &[&str] = &[
    "failed",
    "declined",
    "unsuccessful",
    "cancelled",
    "canceled",
    "expired",
];

/// Reclassification of mislabeled incoming collect requests.
///
/// Some activity logs record money *received* through a collect request as
/// "Paid", with no counterparty and a long dash-free request id where a
/// normal payment carries a dashed UUID. When a Paid record has no recipient
/// and such an id, it is flipped to Received.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectCorrection {
    pub enabled: bool,
    pub id_length: usize,
    pub require_no_dash: bool,
}

impl Default for CollectCorrection {
    fn default() -> Self {
        CollectCorrection { enabled: true, id_length: 35, require_no_dash: true }
    }
}

#[derive(Debug)]
pub struct ActivityParse {
    pub records: Vec<ActivityRecord>,
    /// Records dropped for terminal-failure status or a missing timestamp.
    pub skipped: usize,
}

/// Parse an exported activity-log HTML page. Scraping is best effort: a
/// record that cannot be read is dropped and counted, never fatal, and a
/// page with no recognizable records parses to an empty result.
pub fn parse_activity(html: &str, correction: &CollectCorrection) -> ActivityParse {
    let doc = Html::parse_document(html);
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (index, outer) in doc.select(outer_cell()).enumerate() {
        // Terminal statuses can appear in any cell of the record.
        let full = outer.text().collect::<Vec<_>>().join(" ").to_lowercase();
        if DROP_STATUSES.iter().any(|s| full.contains(s)) {
            warn!(index, "skipping failed or cancelled activity record");
            skipped += 1;
            continue;
        }

        let mut cells = outer.select(content_cell());
        let Some(main) = cells.next() else { continue };
        let details = cells.next().map(cell_text).filter(|t| !t.is_empty());

        match read_record(main, details, correction) {
            Some(record) => records.push(record),
            None => {
                warn!(index, "skipping unreadable or failed activity record");
                skipped += 1;
            }
        }
    }

    ActivityParse { records, skipped }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    dates::normalize(&cell.text().collect::<Vec<_>>().join(" "))
}

fn read_record(
    main: ElementRef<'_>,
    details: Option<String>,
    correction: &CollectCorrection,
) -> Option<ActivityRecord> {
    let nodes: Vec<String> = main
        .text()
        .map(|t| dates::normalize(t))
        .filter(|t| !t.is_empty())
        .collect();
    let title = nodes.first()?.clone();

    // The timestamp is the last text node that reads as a date.
    let timestamp = nodes
        .iter()
        .rev()
        .find_map(|t| parse_activity_timestamp(t))?;

    // A details section is only trusted when it carries one of the known
    // settled statuses; anything else marks an unfinished record.
    if let Some(d) = details.as_deref() {
        let lower = d.to_lowercase();
        if !VALID_STATUSES.iter().any(|s| lower.contains(s)) {
            return None;
        }
    }

    let mut kind = title_kind(&title);
    let amount = re!(r"[₹$]\s?[\d,]+(?:\.\d+)?")
        .find(&title)
        .map(|m| Currency::parse(m.as_str()));
    let recipient = match kind {
        ActivityKind::Sent | ActivityKind::Paid => counterparty(&title, "to"),
        _ => None,
    };
    let sender = match kind {
        ActivityKind::Received => counterparty(&title, "from"),
        _ => None,
    };

    if kind == ActivityKind::Paid
        && recipient.is_none()
        && is_collect_request(details.as_deref().unwrap_or(""), correction)
    {
        kind = ActivityKind::Received;
    }

    Some(ActivityRecord {
        title,
        timestamp,
        description: details,
        kind,
        amount,
        recipient,
        sender,
        category: None,
    })
}

/// Activity timestamps carry a trailing timezone label the date formats do
/// not model; strip it and retry.
fn parse_activity_timestamp(raw: &str) -> Option<chrono::NaiveDateTime> {
    if let Some(dt) = dates::parse_datetime(raw) {
        return Some(dt);
    }
    let stripped = re!(r"\s+(?:GMT|UTC|IST)(?:[+-]\d{1,2}:?\d{2})?$").replace(raw, "");
    if stripped != raw {
        return dates::parse_datetime(&stripped);
    }
    None
}

fn title_kind(title: &str) -> ActivityKind {
    let lower = title.to_lowercase();
    if lower.starts_with("sent") {
        ActivityKind::Sent
    } else if lower.starts_with("received") {
        ActivityKind::Received
    } else if lower.starts_with("paid") {
        ActivityKind::Paid
    } else if lower.starts_with("requested") {
        ActivityKind::Request
    } else {
        ActivityKind::Other
    }
}

fn counterparty(title: &str, link: &str) -> Option<String> {
    let pattern = match link {
        "to" => re!(r"(?i)\bto\s+(.+?)(?:\s+using\b|$)"),
        _ => re!(r"(?i)\bfrom\s+(.+?)(?:\s+using\b|$)"),
    };
    pattern
        .captures(title)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// A collect-request id is one long unbroken alphanumeric run; a regular
/// payment id is a dashed UUID and stays exempt.
fn is_collect_request(details: &str, correction: &CollectCorrection) -> bool {
    if !correction.enabled {
        return false;
    }
    details.split_whitespace().any(|token| {
        token.len() == correction.id_length
            && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && (!correction.require_no_dash || !token.contains('-'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(title: &str, details: &str) -> String {
        format!(
            r#"<div class="outer-cell">
                 <div class="content-cell">{title}<br>Jun 1, 2024, 1:05:09 PM GMT+05:30</div>
                 <div class="content-cell">{details}</div>
               </div>"#
        )
    }

    #[test]
    fn reads_a_sent_record() {
        let html = record("Sent ₹500.00 to Ramesh Kumar using Bank Account XXXXXXXX1234", "Completed");
        let parsed = parse_activity(&html, &CollectCorrection::default());
        assert_eq!(parsed.records.len(), 1);
        let r = &parsed.records[0];
        assert_eq!(r.kind, ActivityKind::Sent);
        assert_eq!(r.amount.unwrap().value, dec!(500.00));
        assert_eq!(r.recipient.as_deref(), Some("Ramesh Kumar"));
        assert!(r.sender.is_none());
        assert_eq!(r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-06-01 13:05:09");
    }

    #[test]
    fn reads_a_received_record_with_sender() {
        let html = record("Received ₹1,200.00 from Priya using Bank Account XXXXXXXX9876", "Completed");
        let parsed = parse_activity(&html, &CollectCorrection::default());
        let r = &parsed.records[0];
        assert_eq!(r.kind, ActivityKind::Received);
        assert_eq!(r.sender.as_deref(), Some("Priya"));
        assert_eq!(r.amount.unwrap().value, dec!(1200.00));
    }

    #[test]
    fn failed_record_is_dropped_and_counted() {
        let html = format!(
            "{}{}",
            record("Sent ₹100.00 to Someone using Bank Account XXXXXXXX0001", "Failed"),
            record("Paid ₹50.00 to Chai Point using Bank Account XXXXXXXX0001", "Completed"),
        );
        let parsed = parse_activity(&html, &CollectCorrection::default());
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.skipped, 1);
        assert_eq!(parsed.records[0].recipient.as_deref(), Some("Chai Point"));
    }

    #[test]
    fn collect_request_paid_without_recipient_becomes_received() {
        let html = record(
            "Paid ₹690.00 using Bank Account XXXXXXXX5601",
            "Transaction ID YBN20251219152416743865243676672000 Completed",
        );
        let parsed = parse_activity(&html, &CollectCorrection::default());
        let r = &parsed.records[0];
        assert_eq!(r.kind, ActivityKind::Received);
        assert_eq!(r.amount.unwrap().value, dec!(690.00));
        assert!(r.recipient.is_none());
    }

    #[test]
    fn dashed_uuid_is_exempt_from_collect_correction() {
        let html = record(
            "Paid ₹690.00 using Bank Account XXXXXXXX5601",
            "Transaction ID 1a2b3c4d-5e6f-7081-92a3-b4c5d6e7f801 Completed",
        );
        let parsed = parse_activity(&html, &CollectCorrection::default());
        assert_eq!(parsed.records[0].kind, ActivityKind::Paid);
    }

    #[test]
    fn correction_can_be_disabled() {
        let html = record(
            "Paid ₹690.00 using Bank Account XXXXXXXX5601",
            "Transaction ID YBN20251219152416743865243676672000 Completed",
        );
        let off = CollectCorrection { enabled: false, ..CollectCorrection::default() };
        let parsed = parse_activity(&html, &off);
        assert_eq!(parsed.records[0].kind, ActivityKind::Paid);
    }

    #[test]
    fn details_without_any_valid_status_is_dropped() {
        let html = record(
            "Sent ₹100.00 to Someone using Bank Account XXXXXXXX0001",
            "Transaction ID ABC123",
        );
        let parsed = parse_activity(&html, &CollectCorrection::default());
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.skipped, 1);
    }

    #[test]
    fn missing_timestamp_drops_the_record() {
        let html = r#"<div class="outer-cell">
            <div class="content-cell">Sent ₹10.00 to X using Bank Account</div>
        </div>"#;
        let parsed = parse_activity(html, &CollectCorrection::default());
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.skipped, 1);
    }

    #[test]
    fn page_without_records_is_empty_success() {
        let parsed = parse_activity("<html><body><p>nothing</p></body></html>", &CollectCorrection::default());
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.skipped, 0);
    }
}
