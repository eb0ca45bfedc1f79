use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::currency::Currency;
use crate::source::SourceApp;

/// One normalized payment-history row. Created once by a format parser and
/// immutable afterwards; timestamps are provider-local wall-clock time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedTransaction {
    pub timestamp: NaiveDateTime,
    pub external_id: String,
    pub description: String,
    pub product_label: String,
    pub payment_method_label: String,
    pub status: String,
    pub amount: Currency,
    pub category: Option<String>,
    pub source: SourceApp,
}

/// Transaction direction derived from an activity-log title verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Sent,
    Received,
    Paid,
    Request,
    Other,
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivityKind::Sent => "sent",
            ActivityKind::Received => "received",
            ActivityKind::Paid => "paid",
            ActivityKind::Request => "request",
            ActivityKind::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// A loosely structured event from a scraped human-readable activity log.
///
/// `recipient` and `sender` are mutually exclusive by `kind`: outflows
/// (sent/paid) carry a recipient, inflows (received) carry a sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub title: String,
    pub timestamp: NaiveDateTime,
    pub description: Option<String>,
    pub kind: ActivityKind,
    pub amount: Option<Currency>,
    pub recipient: Option<String>,
    pub sender: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupExpense {
    pub created_at: NaiveDateTime,
    pub label: String,
    pub total: Currency,
    pub your_share: Currency,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoucherReward {
    pub created_at: NaiveDateTime,
    pub merchant: String,
    pub amount: Currency,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashbackReward {
    pub created_at: NaiveDateTime,
    pub campaign: String,
    pub amount: Currency,
    pub state: String,
}

/// The uniform five-collection output of every adapter's `parse`. Collections
/// not applicable to a source are present and empty, so downstream code sees
/// one shape regardless of provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedBundle {
    pub transactions: Vec<UnifiedTransaction>,
    pub group_expenses: Vec<GroupExpense>,
    pub cashback_rewards: Vec<CashbackReward>,
    pub voucher_rewards: Vec<VoucherReward>,
    pub activities: Vec<ActivityRecord>,
}

impl ParsedBundle {
    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    pub fn record_count(&self) -> usize {
        self.transactions.len()
            + self.group_expenses.len()
            + self.cashback_rewards.len()
            + self.voucher_rewards.len()
            + self.activities.len()
    }

    /// Fold another bundle into this one (the orchestrator's accumulator).
    pub fn merge(&mut self, other: ParsedBundle) {
        self.transactions.extend(other.transactions);
        self.group_expenses.extend(other.group_expenses);
        self.cashback_rewards.extend(other.cashback_rewards);
        self.voucher_rewards.extend(other.voucher_rewards);
        self.activities.extend(other.activities);
    }

    /// Earliest and latest timestamp across transactions and activities.
    pub fn date_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let stamps = self
            .transactions
            .iter()
            .map(|t| t.timestamp)
            .chain(self.activities.iter().map(|a| a.timestamp));
        let (mut min, mut max) = (None, None);
        for ts in stamps {
            min = Some(min.map_or(ts, |m: NaiveDateTime| m.min(ts)));
            max = Some(max.map_or(ts, |m: NaiveDateTime| m.max(ts)));
        }
        Some((min?, max?))
    }
}
