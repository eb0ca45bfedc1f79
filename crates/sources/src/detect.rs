use futures::future::join_all;
use tracing::debug;

use khata_core::SourceApp;

use crate::{registry, RawPayloads};

/// Minimum confidence for a detection to count. Below this the file set is
/// treated as unrecognized rather than guessed at.
pub const DETECTION_THRESHOLD: f32 = 0.3;

#[derive(Debug, Clone)]
pub struct Detection {
    pub source: SourceApp,
    pub confidence: f32,
    /// Human-readable list of the signals that fired.
    pub reason: String,
}

impl Detection {
    pub(crate) fn from_signals(source: SourceApp, signals: Vec<(&str, f32)>) -> Option<Detection> {
        if signals.is_empty() {
            return None;
        }
        let confidence = signals.iter().map(|(_, w)| w).sum::<f32>().min(1.0);
        let reason = signals
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ");
        Some(Detection { source, confidence, reason })
    }
}

/// Score the file set against every registered adapter concurrently and pick
/// the best match. Ties resolve to the earlier registration; anything under
/// [`DETECTION_THRESHOLD`] is discarded.
pub async fn detect_source(payloads: &RawPayloads) -> Option<Detection> {
    let scores = join_all(
        registry()
            .iter()
            .map(|adapter| async move { (adapter.detect)(payloads) }),
    )
    .await;

    let mut best: Option<Detection> = None;
    for detection in scores.into_iter().flatten() {
        debug!(
            source = %detection.source,
            confidence = detection.confidence,
            reason = %detection.reason,
            "detection signal"
        );
        if detection.confidence < DETECTION_THRESHOLD {
            continue;
        }
        // Strict comparison keeps the first registered adapter on a tie.
        match &best {
            Some(current) if detection.confidence <= current.confidence => {}
            _ => best = Some(detection),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RawPayload;
    use std::collections::BTreeMap;

    fn payloads(entries: &[(&str, &str)]) -> RawPayloads {
        entries
            .iter()
            .map(|(name, body)| (name.to_string(), RawPayload::Text(body.to_string())))
            .collect::<BTreeMap<_, _>>()
    }

    #[tokio::test]
    async fn detects_activity_export() {
        let files = payloads(&[(
            "My Activity.html",
            r#"<html><div class="outer-cell"><div class="content-cell">Paid using Google Pay</div></div></html>"#,
        )]);
        let detection = detect_source(&files).await.unwrap();
        assert_eq!(detection.source, SourceApp::GooglePay);
        assert!(detection.confidence >= DETECTION_THRESHOLD);
        assert!(!detection.reason.is_empty());
    }

    #[tokio::test]
    async fn detects_csv_ledger() {
        let files = payloads(&[(
            "cred_statement.csv",
            "Date,Transaction ID,Description,Amount,Status\n2024-06-01,TX1,Swiggy,₹450.00,SUCCESS\n",
        )]);
        let detection = detect_source(&files).await.unwrap();
        assert_eq!(detection.source, SourceApp::Cred);
    }

    #[tokio::test]
    async fn unrecognized_files_detect_nothing() {
        let files = payloads(&[("notes.txt", "grocery list: milk, bread")]);
        assert!(detect_source(&files).await.is_none());
    }

    #[tokio::test]
    async fn empty_file_set_detects_nothing() {
        assert!(detect_source(&RawPayloads::new()).await.is_none());
    }

    #[tokio::test]
    async fn equal_scores_resolve_to_registration_order() {
        // An anonymous PDF and an anonymous XLSX both score 0.5 for their
        // adapters; the earlier registration (PhonePe) must win.
        let files: RawPayloads = [
            ("a.pdf".to_string(), RawPayload::Bytes(b"%PDF-1.7".to_vec())),
            ("b.xlsx".to_string(), RawPayload::Bytes(b"PK\x03\x04".to_vec())),
        ]
        .into_iter()
        .collect::<BTreeMap<_, _>>();
        let detection = detect_source(&files).await.unwrap();
        assert_eq!(detection.source, SourceApp::PhonePe);
    }

    #[test]
    fn signal_weights_cap_at_one() {
        let d = Detection::from_signals(
            SourceApp::Paytm,
            vec![("a", 0.6), ("b", 0.6)],
        )
        .unwrap();
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.reason, "a, b");
    }

    #[test]
    fn no_signals_is_no_detection() {
        assert!(Detection::from_signals(SourceApp::Paytm, Vec::new()).is_none());
    }
}
