pub mod currency;
pub mod records;
pub mod source;

pub use currency::{Currency, CurrencyCode};
pub use records::{
    ActivityKind, ActivityRecord, CashbackReward, GroupExpense, ParsedBundle,
    UnifiedTransaction, VoucherReward,
};
pub use source::SourceApp;
