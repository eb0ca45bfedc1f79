//! Ingestion orchestrator: detect which app produced a set of export files,
//! run that app's adapter, and hand back one normalized, categorized bundle.
//! Password-protected exports go through a bounded secret retry loop; batch
//! ingestion accumulates per-source results without letting one bad export
//! abort the rest.

use thiserror::Error;
use tracing::{info, warn};

use khata_classify::Classifier;
use khata_core::{ParsedBundle, SourceApp};
use khata_formats::CollectCorrection;
use khata_sources::{adapter_for, detect_source, ParseContext, RawPayloads, SourceError};

/// How many passwords the retry loop will try before giving up.
pub const MAX_SECRET_ATTEMPTS: u32 = 3;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Could not recognize which app produced these files")]
    UnknownSource,
    #[error("{0} export is password protected; a secret is required")]
    SecretRequired(SourceApp),
    #[error("The supplied secret does not open the {0} export")]
    InvalidSecret(SourceApp),
    #[error("Failed to ingest {source} export: {error}")]
    Source {
        source: SourceApp,
        #[source]
        error: SourceError,
    },
}

/// Outcome of one successful ingestion. An export that parses to zero
/// records is still a success, flagged through `warnings`.
#[derive(Debug)]
pub struct IngestReport {
    pub source: SourceApp,
    /// Detection signals that picked the source, or `explicit` when the
    /// caller named it.
    pub reason: String,
    pub bundle: ParsedBundle,
    pub skipped_rows: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Default)]
pub struct IngestJob {
    pub payloads: RawPayloads,
    pub secret: Option<String>,
}

/// Batch outcome: every job either contributes a report (and its records to
/// the combined bundle) or a failure.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub combined: ParsedBundle,
    pub reports: Vec<IngestReport>,
    pub failures: Vec<IngestError>,
}

pub struct Ingestor {
    classifier: Classifier,
    correction: CollectCorrection,
}

impl Default for Ingestor {
    fn default() -> Self {
        Ingestor {
            classifier: Classifier::default(),
            correction: CollectCorrection::default(),
        }
    }
}

impl Ingestor {
    pub fn new() -> Self {
        Ingestor::default()
    }

    pub fn with_classifier(classifier: Classifier) -> Self {
        Ingestor { classifier, correction: CollectCorrection::default() }
    }

    pub fn correction(mut self, correction: CollectCorrection) -> Self {
        self.correction = correction;
        self
    }

    /// Detect the source of a file set and ingest it.
    pub async fn ingest_file(
        &self,
        payloads: &RawPayloads,
        secret: Option<&str>,
    ) -> Result<IngestReport, IngestError> {
        let detection = detect_source(payloads).await.ok_or(IngestError::UnknownSource)?;
        info!(
            source = %detection.source,
            confidence = detection.confidence,
            reason = %detection.reason,
            "source detected"
        );
        self.run(detection.source, &detection.reason, payloads, secret)
    }

    /// Ingest as a known source, skipping detection.
    pub fn ingest_as(
        &self,
        source: SourceApp,
        payloads: &RawPayloads,
        secret: Option<&str>,
    ) -> Result<IngestReport, IngestError> {
        self.run(source, "explicit", payloads, secret)
    }

    /// Like [`ingest_file`](Self::ingest_file), but asks `secrets` for a
    /// password when the source needs one, retrying on a wrong secret up to
    /// [`MAX_SECRET_ATTEMPTS`] times. Returning `None` from the callback
    /// gives up early.
    pub async fn ingest_with_secrets<F>(
        &self,
        payloads: &RawPayloads,
        mut secrets: F,
    ) -> Result<IngestReport, IngestError>
    where
        F: FnMut(SourceApp, u32) -> Option<String>,
    {
        let detection = detect_source(payloads).await.ok_or(IngestError::UnknownSource)?;
        let source = detection.source;
        if !adapter_for(source).requires_secret {
            return self.run(source, &detection.reason, payloads, None);
        }

        let mut last = IngestError::SecretRequired(source);
        for attempt in 0..MAX_SECRET_ATTEMPTS {
            let Some(secret) = secrets(source, attempt) else { break };
            match self.run(source, &detection.reason, payloads, Some(&secret)) {
                Err(IngestError::InvalidSecret(_)) => {
                    warn!(%source, attempt, "secret rejected");
                    last = IngestError::InvalidSecret(source);
                }
                other => return other,
            }
        }
        Err(last)
    }

    /// Ingest several file sets, folding every success into one combined
    /// bundle. A failing job is recorded and the batch moves on.
    pub async fn ingest_batch(&self, jobs: Vec<IngestJob>) -> BatchReport {
        let mut batch = BatchReport::default();
        for job in jobs {
            match self.ingest_file(&job.payloads, job.secret.as_deref()).await {
                Ok(report) => {
                    batch.combined.merge(report.bundle.clone());
                    batch.reports.push(report);
                }
                Err(err) => {
                    warn!(%err, "batch job failed");
                    batch.failures.push(err);
                }
            }
        }
        batch
    }

    fn run(
        &self,
        source: SourceApp,
        reason: &str,
        payloads: &RawPayloads,
        secret: Option<&str>,
    ) -> Result<IngestReport, IngestError> {
        let adapter = adapter_for(source);
        if adapter.requires_secret && secret.is_none() {
            return Err(IngestError::SecretRequired(source));
        }

        let wrap = |error: SourceError| match error {
            SourceError::SecretRequired => IngestError::SecretRequired(source),
            SourceError::InvalidSecret => IngestError::InvalidSecret(source),
            other => IngestError::Source { source, error: other },
        };

        let extraction = (adapter.extract)(payloads).map_err(wrap)?;
        let ctx = ParseContext {
            classifier: &self.classifier,
            secret,
            correction: &self.correction,
        };
        let parsed = (adapter.parse)(&extraction, &ctx).map_err(wrap)?;

        let mut warnings = Vec::new();
        if parsed.bundle.is_empty() {
            warn!(%source, "export parsed but contained no records");
            warnings.push(format!("{source} export parsed but contained no records"));
        }
        if parsed.skipped > 0 {
            warnings.push(format!("{} unreadable rows were skipped", parsed.skipped));
        }

        info!(
            %source,
            records = parsed.bundle.record_count(),
            skipped = parsed.skipped,
            "ingestion finished"
        );
        Ok(IngestReport {
            source,
            reason: reason.to_string(),
            bundle: parsed.bundle,
            skipped_rows: parsed.skipped,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use khata_core::ActivityKind;
    use khata_sources::RawPayload;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn files(entries: &[(&str, &str)]) -> RawPayloads {
        entries
            .iter()
            .map(|(n, b)| (n.to_string(), RawPayload::Text(b.to_string())))
            .collect::<BTreeMap<_, _>>()
    }

    const LEDGER: &str = "\
Date,Transaction ID,Description,Amount,Status
2024-06-01 10:00:00,TX001,Swiggy Order,₹450.00,SUCCESS
2024-06-02 11:30:00,TX002,Uber Ride,₹230.50,SUCCESS
2024-06-03 09:15:00,,Missing Id,₹99.00,SUCCESS
2024-06-04 18:45:00,TX004,Blinkit,\"₹1,234.00\",SUCCESS
";

    #[tokio::test]
    async fn csv_ledger_parses_valid_rows_and_counts_the_rest() {
        init_tracing();
        let ingestor = Ingestor::new();
        let report = ingestor
            .ingest_file(&files(&[("cred_statement.csv", LEDGER)]), None)
            .await
            .unwrap();

        assert_eq!(report.source, SourceApp::Cred);
        assert_eq!(report.bundle.transactions.len(), 3);
        assert_eq!(report.skipped_rows, 1);
        assert!(report.warnings.iter().any(|w| w.contains("skipped")));
        assert_eq!(report.bundle.transactions[0].category.as_deref(), Some("Food & Dining"));
    }

    #[tokio::test]
    async fn collect_request_is_reclassified_as_received() {
        init_tracing();
        let html = r#"<html><body>
          <div class="outer-cell">
            <div class="content-cell">Paid ₹690.00 using Bank Account XXXXXXXX5601<br>Dec 19, 2025, 3:24:16 PM GMT+05:30</div>
            <div class="content-cell">Transaction ID YBN20251219152416743865243676672000 Completed</div>
          </div>
        </body></html>"#;

        let ingestor = Ingestor::new();
        let report = ingestor
            .ingest_file(&files(&[("My Activity.html", html)]), None)
            .await
            .unwrap();

        assert_eq!(report.source, SourceApp::GooglePay);
        let record = &report.bundle.activities[0];
        assert_eq!(record.kind, ActivityKind::Received);
        assert_eq!(record.amount.unwrap().value, dec!(690.00));
        assert!(record.recipient.is_none());
    }

    #[tokio::test]
    async fn prefixed_and_bare_feeds_ingest_identically() {
        init_tracing();
        let html = r#"<div class="outer-cell"><div class="content-cell">Paid ₹10.00 to Chai Point using Bank Account XXXXXXXX0001<br>Jun 1, 2024, 9:00:00 AM GMT+05:30</div><div class="content-cell">Completed</div></div>"#;
        let feed = r#"{"group_expenses": [
          {"creation_time": "2024-06-03 10:00:00", "total_amount": "₹900.00", "your_share": "₹300.00", "description": "Lunch", "state": "SETTLED"}
        ]}"#;
        let prefixed = format!(")]}}'\n{feed}");

        let ingestor = Ingestor::new();
        let bare_report = ingestor
            .ingest_file(
                &files(&[("My Activity.html", html), ("rewards.json", feed)]),
                None,
            )
            .await
            .unwrap();
        let prefixed_report = ingestor
            .ingest_file(
                &files(&[("My Activity.html", html), ("rewards.json", prefixed.as_str())]),
                None,
            )
            .await
            .unwrap();

        assert_eq!(bare_report.bundle.group_expenses.len(), 1);
        assert_eq!(
            bare_report.bundle.group_expenses[0].total,
            prefixed_report.bundle.group_expenses[0].total
        );
        assert_eq!(
            bare_report.bundle.record_count(),
            prefixed_report.bundle.record_count()
        );
    }

    #[tokio::test]
    async fn protected_export_without_secret_is_refused() {
        init_tracing();
        let mut payloads = RawPayloads::new();
        payloads.insert(
            "PhonePe_Statement.pdf".to_string(),
            RawPayload::Bytes(b"%PDF-1.7 stub".to_vec()),
        );
        let ingestor = Ingestor::new();
        let err = ingestor.ingest_file(&payloads, None).await.unwrap_err();
        assert!(matches!(err, IngestError::SecretRequired(SourceApp::PhonePe)));
    }

    #[tokio::test]
    async fn secret_loop_gives_up_when_the_callback_runs_dry() {
        init_tracing();
        let mut payloads = RawPayloads::new();
        payloads.insert(
            "PhonePe_Statement.pdf".to_string(),
            RawPayload::Bytes(b"%PDF-1.7 stub".to_vec()),
        );
        let ingestor = Ingestor::new();
        let mut asked = 0u32;
        let err = ingestor
            .ingest_with_secrets(&payloads, |source, attempt| {
                assert_eq!(source, SourceApp::PhonePe);
                assert_eq!(attempt, asked);
                asked += 1;
                None
            })
            .await
            .unwrap_err();
        assert_eq!(asked, 1);
        assert!(matches!(err, IngestError::SecretRequired(SourceApp::PhonePe)));
    }

    #[tokio::test]
    async fn unrecognized_files_are_an_unknown_source() {
        init_tracing();
        let err = Ingestor::new()
            .ingest_file(&files(&[("notes.txt", "not an export")]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::UnknownSource));
    }

    #[tokio::test]
    async fn empty_export_succeeds_with_a_warning() {
        init_tracing();
        let html = r#"<html><body><div class="content-cell">no records here</div></body></html>"#;
        let report = Ingestor::new()
            .ingest_file(&files(&[("My Activity.html", html)]), None)
            .await
            .unwrap();
        assert!(report.bundle.is_empty());
        assert!(report.warnings.iter().any(|w| w.contains("no records")));
    }

    #[tokio::test]
    async fn batch_keeps_going_past_failures() {
        init_tracing();
        let jobs = vec![
            IngestJob { payloads: files(&[("cred_statement.csv", LEDGER)]), secret: None },
            IngestJob { payloads: files(&[("junk.txt", "nothing")]), secret: None },
        ];
        let batch = Ingestor::new().ingest_batch(jobs).await;
        assert_eq!(batch.reports.len(), 1);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.combined.transactions.len(), 3);
        assert!(matches!(batch.failures[0], IngestError::UnknownSource));
    }

    #[tokio::test]
    async fn explicit_source_skips_detection() {
        init_tracing();
        let report = Ingestor::new()
            .ingest_as(SourceApp::Cred, &files(&[("export.csv", LEDGER)]), None)
            .unwrap();
        assert_eq!(report.reason, "explicit");
        assert_eq!(report.bundle.transactions.len(), 3);
    }
}
