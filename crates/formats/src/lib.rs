//! Format-level parsers for exported payment history. Each module turns one
//! on-disk representation (CSV ledger, prefixed JSON feed, activity HTML,
//! spreadsheet, positional-text PDF) into provisional rows; source adapters
//! map those rows onto the unified data model.

/// Lazily compiled regex with a per-call-site static. Defined ahead of the
/// module declarations so textual scoping covers them.
macro_rules! re {
    ($pattern:expr) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($pattern).expect("static regex"))
    }};
}

pub mod activity;
pub mod dates;
pub mod feed;
pub mod sheet;
pub mod statement;
pub mod tabular;

pub use activity::{parse_activity, ActivityParse, CollectCorrection};
pub use feed::{
    parse_cashback_rewards, parse_group_expenses, parse_voucher_rewards, FeedError, FeedParse,
};
pub use sheet::{parse_range, parse_sheet, Flow, SheetError, SheetParse, SheetRow};
pub use statement::{
    group_rows, parse_fragments, parse_lines, parse_statement, validate_secret, Fragment,
    StatementError, StatementParse, StatementRow,
};
pub use tabular::{parse_ledger, ColumnMap, LedgerRow, TabularError, TabularParse};
