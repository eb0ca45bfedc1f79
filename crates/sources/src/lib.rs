//! Source adapters: one per supported payment app, each a `{detect, extract,
//! parse}` triple registered in a fixed-order table. Detection scores a set
//! of raw files against every adapter; extraction picks out the files an
//! adapter consumes; parsing maps them onto the unified data model with
//! categories attached.

use std::collections::BTreeMap;

use thiserror::Error;

use khata_classify::Classifier;
use khata_core::{ParsedBundle, SourceApp};
use khata_formats::{
    CollectCorrection, FeedError, SheetError, StatementError, TabularError,
};

pub mod adapters;
pub mod detect;

pub use detect::{detect_source, Detection, DETECTION_THRESHOLD};

/// Only this much of each file is examined during detection.
pub const PREVIEW_LIMIT: usize = 10 * 1024;

/// One raw export file, text or binary depending on what the provider ships.
#[derive(Debug, Clone)]
pub enum RawPayload {
    Text(String),
    Bytes(Vec<u8>),
}

impl RawPayload {
    /// Detection preview: at most [`PREVIEW_LIMIT`] bytes, lossily decoded
    /// for binary payloads.
    pub fn preview_text(&self) -> std::borrow::Cow<'_, str> {
        match self {
            RawPayload::Text(t) => std::borrow::Cow::Borrowed(truncate(t, PREVIEW_LIMIT)),
            RawPayload::Bytes(b) => String::from_utf8_lossy(self::head(b)),
        }
    }

    pub fn head_bytes(&self) -> &[u8] {
        match self {
            RawPayload::Text(t) => head(t.as_bytes()),
            RawPayload::Bytes(b) => head(b),
        }
    }

    /// Whole payload as text, lossily decoded for binary payloads.
    pub fn text_lossy(&self) -> std::borrow::Cow<'_, str> {
        match self {
            RawPayload::Text(t) => std::borrow::Cow::Borrowed(t.as_str()),
            RawPayload::Bytes(b) => String::from_utf8_lossy(b),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawPayload::Text(t) => Some(t),
            RawPayload::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RawPayload::Text(t) => t.as_bytes(),
            RawPayload::Bytes(b) => b,
        }
    }
}

fn head(b: &[u8]) -> &[u8] {
    &b[..b.len().min(PREVIEW_LIMIT)]
}

fn truncate(s: &str, limit: usize) -> &str {
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// The files a user hands over, keyed by file name. Ordered so detection and
/// extraction are deterministic.
pub type RawPayloads = BTreeMap<String, RawPayload>;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("No usable export file found for {0}")]
    MissingDocument(SourceApp),
    #[error("Export is password protected and no secret was supplied")]
    SecretRequired,
    #[error("The supplied secret does not open this export")]
    InvalidSecret,
    #[error("Malformed ledger export: {0}")]
    Tabular(#[from] TabularError),
    #[error("Malformed feed export: {0}")]
    Feed(#[from] FeedError),
    #[error("Malformed spreadsheet export: {0}")]
    Sheet(#[from] SheetError),
    #[error("Malformed statement export: {0}")]
    Statement(StatementError),
}

impl SourceError {
    /// Secret problems are retryable with a different secret; everything
    /// else is terminal for the source.
    pub fn is_secret(&self) -> bool {
        matches!(self, SourceError::SecretRequired | SourceError::InvalidSecret)
    }
}

impl From<StatementError> for SourceError {
    fn from(err: StatementError) -> Self {
        match err {
            StatementError::SecretRequired => SourceError::SecretRequired,
            StatementError::InvalidSecret => SourceError::InvalidSecret,
            other => SourceError::Statement(other),
        }
    }
}

/// The files an adapter consumes: one primary document plus any auxiliary
/// ones (reward feeds next to an activity log, for instance).
#[derive(Debug)]
pub struct Extraction<'a> {
    pub primary: (&'a str, &'a RawPayload),
    pub auxiliary: Vec<(&'a str, &'a RawPayload)>,
}

/// Everything a parse needs beyond the files themselves.
pub struct ParseContext<'a> {
    pub classifier: &'a Classifier,
    pub secret: Option<&'a str>,
    pub correction: &'a CollectCorrection,
}

#[derive(Debug)]
pub struct SourceParse {
    pub bundle: ParsedBundle,
    /// Rows the format parsers dropped as unreadable.
    pub skipped: usize,
}

pub type DetectFn = fn(&RawPayloads) -> Option<Detection>;
pub type ExtractFn = for<'a> fn(&'a RawPayloads) -> Result<Extraction<'a>, SourceError>;
pub type ParseFn = fn(&Extraction<'_>, &ParseContext<'_>) -> Result<SourceParse, SourceError>;

#[derive(Clone, Copy)]
pub struct Adapter {
    pub id: SourceApp,
    pub extensions: &'static [&'static str],
    pub requires_secret: bool,
    pub detect: DetectFn,
    pub extract: ExtractFn,
    pub parse: ParseFn,
}

/// Registration order follows [`SourceApp::ALL`]; detection ties resolve to
/// the earlier entry.
pub fn registry() -> &'static [Adapter] {
    static REGISTRY: [Adapter; 4] = [
        adapters::gpay::ADAPTER,
        adapters::phonepe::ADAPTER,
        adapters::paytm::ADAPTER,
        adapters::cred::ADAPTER,
    ];
    &REGISTRY
}

pub fn adapter_for(source: SourceApp) -> &'static Adapter {
    registry()
        .iter()
        .find(|a| a.id == source)
        .expect("every source app has a registered adapter")
}

/// Find the first payload whose name carries one of the extensions.
pub(crate) fn find_by_extension<'a>(
    payloads: &'a RawPayloads,
    extensions: &[&str],
) -> Option<(&'a str, &'a RawPayload)> {
    payloads
        .iter()
        .find(|(name, _)| {
            let lower = name.to_lowercase();
            extensions.iter().any(|e| lower.ends_with(e))
        })
        .map(|(n, p)| (n.as_str(), p))
}
