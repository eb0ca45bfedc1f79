use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrencyCode {
    #[default]
    Inr,
    Usd,
}

impl CurrencyCode {
    pub fn symbol(self) -> &'static str {
        match self {
            CurrencyCode::Inr => "₹",
            CurrencyCode::Usd => "$",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CurrencyCode::Inr => "INR",
            CurrencyCode::Usd => "USD",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A non-negative monetary amount. Direction (debit/credit) is carried by the
/// owning record's type, never by a negative `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub value: Decimal,
    pub code: CurrencyCode,
}

impl Currency {
    pub fn new(value: Decimal, code: CurrencyCode) -> Self {
        Currency { value: value.abs(), code }
    }

    pub fn inr(value: Decimal) -> Self {
        Currency::new(value, CurrencyCode::Inr)
    }

    pub fn zero() -> Self {
        Currency { value: Decimal::ZERO, code: CurrencyCode::Inr }
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Parse a monetary string in any of the export shapes seen in the wild:
    /// symbol-prefixed (`₹1,234.56`, `$25.00`), code-prefixed (`INR 1,234.56`),
    /// legacy space-separated (`INR 1234.56`) or bare numeric (`1234.56`).
    ///
    /// Thousands separators, including Indian 2-3 digit grouping
    /// (`1,23,456.78`), are stripped. Missing currency marker defaults to INR.
    ///
    /// Malformed amounts are a data-quality issue, not a failure: any
    /// unparsable input degrades to `{0, INR}`.
    pub fn parse(text: &str) -> Currency {
        Currency::try_parse(text).unwrap_or_else(Currency::zero)
    }

    fn try_parse(text: &str) -> Option<Currency> {
        let t = text.trim();
        if t.is_empty() {
            return None;
        }

        let (code, rest) = strip_marker(t);
        let cleaned: String = rest
            .trim()
            .trim_start_matches(['+', '-'])
            .trim_start()
            .chars()
            .filter(|c| *c != ',')
            .collect();
        if cleaned.is_empty()
            || !cleaned.chars().all(|c| c.is_ascii_digit() || c == '.')
        {
            return None;
        }

        let value = Decimal::from_str(&cleaned).ok()?;
        Some(Currency { value: value.abs(), code })
    }
}

fn strip_marker(t: &str) -> (CurrencyCode, &str) {
    if let Some(rest) = t.strip_prefix('₹') {
        return (CurrencyCode::Inr, rest);
    }
    if let Some(rest) = t.strip_prefix('$') {
        return (CurrencyCode::Usd, rest);
    }
    let upper = t.to_uppercase();
    if upper.starts_with("INR") {
        return (CurrencyCode::Inr, &t[3..]);
    }
    if upper.starts_with("USD") {
        return (CurrencyCode::Usd, &t[3..]);
    }
    // Older PDF statements spell the rupee marker out.
    if upper.starts_with("RS.") {
        return (CurrencyCode::Inr, &t[3..]);
    }
    if upper.starts_with("RS") {
        return (CurrencyCode::Inr, &t[2..]);
    }
    (CurrencyCode::Inr, t)
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plain = self.value.to_string();
        let (int_part, frac_part) = match plain.split_once('.') {
            Some((i, fr)) => (i, Some(fr)),
            None => (plain.as_str(), None),
        };
        let grouped = match self.code {
            CurrencyCode::Inr => group_indian(int_part),
            CurrencyCode::Usd => group_western(int_part),
        };
        match frac_part {
            Some(fr) => write!(f, "{}{}.{}", self.code.symbol(), grouped, fr),
            None => write!(f, "{}{}", self.code.symbol(), grouped),
        }
    }
}

/// Indian grouping: last three digits, then pairs (`12,34,567`).
fn group_indian(digits: &str) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }
    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let bytes = head.as_bytes();
    let mut end = bytes.len();
    while end > 2 {
        groups.push(&head[end - 2..end]);
        end -= 2;
    }
    groups.push(&head[..end]);
    groups.reverse();
    format!("{},{}", groups.join(","), tail)
}

fn group_western(digits: &str) -> String {
    let mut groups: Vec<&str> = Vec::new();
    let mut end = digits.len();
    while end > 3 {
        groups.push(&digits[end - 3..end]);
        end -= 3;
    }
    groups.push(&digits[..end]);
    groups.reverse();
    groups.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parse_symbol_prefixed() {
        let c = Currency::parse("₹1,234.56");
        assert_eq!(c.value, dec!(1234.56));
        assert_eq!(c.code, CurrencyCode::Inr);
    }

    #[test]
    fn parse_dollar_symbol() {
        let c = Currency::parse("$25.00");
        assert_eq!(c.value, dec!(25.00));
        assert_eq!(c.code, CurrencyCode::Usd);
    }

    #[test]
    fn parse_code_prefixed() {
        let c = Currency::parse("INR 1,234.56");
        assert_eq!(c.value, dec!(1234.56));
        assert_eq!(c.code, CurrencyCode::Inr);
    }

    #[test]
    fn parse_legacy_space_separated() {
        let c = Currency::parse("INR 1234.56");
        assert_eq!(c.value, dec!(1234.56));
    }

    #[test]
    fn parse_bare_numeric_defaults_to_inr() {
        let c = Currency::parse("690.00");
        assert_eq!(c.value, dec!(690.00));
        assert_eq!(c.code, CurrencyCode::Inr);
    }

    #[test]
    fn parse_indian_grouping() {
        let c = Currency::parse("₹1,23,456.78");
        assert_eq!(c.value, dec!(123456.78));
    }

    #[test]
    fn parse_negative_becomes_non_negative() {
        let c = Currency::parse("-500.00");
        assert_eq!(c.value, dec!(500.00));
    }

    #[test]
    fn parse_sign_separated_by_space() {
        assert_eq!(Currency::parse("- 350.00").value, dec!(350.00));
        assert_eq!(Currency::parse("+ 25.00").value, dec!(25.00));
    }

    #[test]
    fn parse_unparsable_never_fails() {
        for junk in ["", "   ", "abc", "₹", "INR", "12.3.4", "₹12a"] {
            let c = Currency::parse(junk);
            assert!(c.is_zero(), "expected zero for {junk:?}");
            assert_eq!(c.code, CurrencyCode::Inr);
        }
    }

    #[test]
    fn display_round_trips_inr() {
        for v in [dec!(0), dec!(5), dec!(690.00), dec!(1234.56), dec!(123456.78), dec!(12345678.90)] {
            let c = Currency::inr(v);
            assert_eq!(Currency::parse(&c.to_string()), c, "round trip of {c}");
        }
    }

    #[test]
    fn display_round_trips_usd() {
        for v in [dec!(25.00), dec!(1234.56), dec!(1000000)] {
            let c = Currency::new(v, CurrencyCode::Usd);
            assert_eq!(Currency::parse(&c.to_string()), c, "round trip of {c}");
        }
    }

    #[test]
    fn display_uses_indian_grouping() {
        assert_eq!(Currency::inr(dec!(123456.78)).to_string(), "₹1,23,456.78");
        assert_eq!(Currency::inr(dec!(1234)).to_string(), "₹1,234");
    }

    #[test]
    fn display_uses_western_grouping_for_usd() {
        assert_eq!(
            Currency::new(dec!(1234567.89), CurrencyCode::Usd).to_string(),
            "$1,234,567.89"
        );
    }
}
