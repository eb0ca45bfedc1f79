use serde::{Deserialize, Serialize};
use std::fmt;

/// The provider app a record was ingested from.
///
/// Variant order here is also adapter registration order, which breaks
/// detection-confidence ties (first registered wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceApp {
    GooglePay,
    PhonePe,
    Paytm,
    Cred,
}

impl SourceApp {
    pub const ALL: [SourceApp; 4] = [
        SourceApp::GooglePay,
        SourceApp::PhonePe,
        SourceApp::Paytm,
        SourceApp::Cred,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceApp::GooglePay => "google_pay",
            SourceApp::PhonePe => "phonepe",
            SourceApp::Paytm => "paytm",
            SourceApp::Cred => "cred",
        }
    }
}

impl fmt::Display for SourceApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourceApp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google_pay" => Ok(SourceApp::GooglePay),
            "phonepe" => Ok(SourceApp::PhonePe),
            "paytm" => Ok(SourceApp::Paytm),
            "cred" => Ok(SourceApp::Cred),
            other => Err(format!("Unknown source app: '{other}'")),
        }
    }
}
