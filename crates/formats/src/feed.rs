use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use khata_core::{CashbackReward, Currency, GroupExpense, VoucherReward};

use crate::dates;

/// Anti-hijacking prefix some exporters prepend to JSON responses.
const ANTI_HIJACK_PREFIX: &str = ")]}'";

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to parse JSON feed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug)]
pub struct FeedParse<T> {
    pub items: Vec<T>,
    /// Malformed array elements dropped with a logged index.
    pub skipped: usize,
}

/// Strip the anti-hijacking prefix when present. The prefix is only valid
/// when followed by a newline or space; anything else is left untouched for
/// the JSON parser to reject.
pub fn strip_anti_hijack(text: &str) -> &str {
    if let Some(rest) = text.strip_prefix(ANTI_HIJACK_PREFIX) {
        if let Some(r) = rest.strip_prefix("\r\n") {
            return r;
        }
        if let Some(r) = rest.strip_prefix('\n').or_else(|| rest.strip_prefix(' ')) {
            return r;
        }
    }
    text
}

// Export schemas drifted between snake_case and camelCase across versions;
// aliases accept both spellings of every logical field.

#[derive(Debug, Deserialize)]
struct GroupExpenseRaw {
    #[serde(alias = "creationTime")]
    creation_time: String,
    #[serde(alias = "totalAmount")]
    total_amount: String,
    #[serde(alias = "yourShare", default)]
    your_share: Option<String>,
    #[serde(alias = "description", default)]
    label: Option<String>,
    #[serde(alias = "status", default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VoucherRewardRaw {
    #[serde(alias = "creationTime")]
    creation_time: String,
    #[serde(alias = "merchantName")]
    merchant: String,
    #[serde(alias = "voucherAmount", alias = "voucher_amount", default)]
    amount: Option<String>,
    #[serde(alias = "status", default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CashbackRewardRaw {
    #[serde(alias = "creationTime")]
    creation_time: String,
    #[serde(alias = "campaignName", alias = "campaign_name", default)]
    campaign: Option<String>,
    #[serde(alias = "rewardAmount", alias = "reward_amount", default)]
    amount: Option<String>,
    #[serde(alias = "status", default)]
    state: Option<String>,
}

pub fn parse_group_expenses(text: &str) -> Result<FeedParse<GroupExpense>, FeedError> {
    parse_feed(text, &["group_expenses", "Group_expenses", "groupExpenses"], |raw: GroupExpenseRaw| {
        let created_at = dates::parse_datetime(&raw.creation_time)?;
        Some(GroupExpense {
            created_at,
            label: raw.label.unwrap_or_default(),
            total: Currency::parse(&raw.total_amount),
            your_share: raw
                .your_share
                .map(|s| Currency::parse(&s))
                .unwrap_or_else(Currency::zero),
            state: raw.state.unwrap_or_default(),
        })
    })
}

pub fn parse_voucher_rewards(text: &str) -> Result<FeedParse<VoucherReward>, FeedError> {
    parse_feed(text, &["voucher_rewards", "Voucher_rewards", "voucherRewards"], |raw: VoucherRewardRaw| {
        let created_at = dates::parse_datetime(&raw.creation_time)?;
        Some(VoucherReward {
            created_at,
            merchant: raw.merchant,
            amount: raw.amount.map(|s| Currency::parse(&s)).unwrap_or_else(Currency::zero),
            state: raw.state.unwrap_or_default(),
        })
    })
}

pub fn parse_cashback_rewards(text: &str) -> Result<FeedParse<CashbackReward>, FeedError> {
    parse_feed(text, &["cashback_rewards", "Cashback_rewards", "cashbackRewards"], |raw: CashbackRewardRaw| {
        let created_at = dates::parse_datetime(&raw.creation_time)?;
        Some(CashbackReward {
            created_at,
            campaign: raw.campaign.unwrap_or_default(),
            amount: raw.amount.map(|s| Currency::parse(&s)).unwrap_or_else(Currency::zero),
            state: raw.state.unwrap_or_default(),
        })
    })
}

/// Shared feed walk: a hard failure only when the top-level document is not
/// valid JSON. Individual malformed elements are skipped with their index.
fn parse_feed<R, T>(
    text: &str,
    keys: &[&str],
    build: impl Fn(R) -> Option<T>,
) -> Result<FeedParse<T>, FeedError>
where
    R: for<'de> Deserialize<'de>,
{
    let doc: Value = serde_json::from_str(strip_anti_hijack(text))?;

    let elements = keys
        .iter()
        .find_map(|k| doc.get(*k))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut items = Vec::with_capacity(elements.len());
    let mut skipped = 0usize;
    for (index, element) in elements.into_iter().enumerate() {
        match serde_json::from_value::<R>(element).ok().and_then(&build) {
            Some(item) => items.push(item),
            None => {
                warn!(index, "skipping malformed feed element");
                skipped += 1;
            }
        }
    }
    Ok(FeedParse { items, skipped })
}
