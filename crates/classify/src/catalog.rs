use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Category the exclusion layer and the personal-transfer heuristic resolve to.
pub const TRANSFERS_CATEGORY: &str = "Transfers & Payments";
/// Category for corporate-suffixed names nothing else matched.
pub const SERVICES_CATEGORY: &str = "Services";
/// Sentinel for a classification miss — not an error.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// One spending category and the signals that map merchant text onto it.
///
/// Catalog order is a semantic contract: the keyword layer evaluates
/// categories in declaration order and the first match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDef {
    pub name: String,
    /// Exact-match brand names (case-insensitive equality).
    #[serde(default)]
    pub brands: Vec<String>,
    /// Substring keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Regex patterns.
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Known misspellings/abbreviations of a canonical keyword. The canonical
/// form must be owned (as brand or keyword) by exactly one category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzyVariant {
    pub canonical: String,
    pub variants: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Amounts at or above this are never treated as personal transfers.
    pub personal_transfer_ceiling: Decimal,
    /// Suffixes marking a corporate counterparty.
    pub corporate_suffixes: Vec<String>,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        HeuristicConfig {
            personal_transfer_ceiling: Decimal::new(5000, 0),
            corporate_suffixes: [
                "PRIVATE LIMITED",
                "PVT LTD",
                "PVT. LTD",
                "LIMITED",
                "LLP",
                "TECHNOLOGIES",
                "SOLUTIONS",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// The full, declarative rule configuration for the classifier. `Default`
/// supplies the curated built-in catalog; `from_toml` loads an override so
/// rules can be tuned without code changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    /// Exclusion-layer regexes: gateways, bank rails, transfer indicators,
    /// technical boilerplate.
    pub exclusions: Vec<String>,
    pub categories: Vec<CategoryDef>,
    pub fuzzy: Vec<FuzzyVariant>,
    pub heuristics: HeuristicConfig,
}

impl Catalog {
    pub fn from_toml(content: &str) -> Result<Catalog, toml::de::Error> {
        toml::from_str(content)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog {
            exclusions: exclusion_rules(),
            categories: builtin_categories(),
            fuzzy: builtin_fuzzy(),
            heuristics: HeuristicConfig::default(),
        }
    }
}

fn exclusion_rules() -> Vec<String> {
    [
        // Payment gateways and aggregators.
        r"(?i)\b(razorpay|payu|billdesk|ccavenue|cashfree|instamojo|juspay)\b",
        // Bank rails and ISO message fragments.
        r"(?i)\b(neft|imps|rtgs|nach|ecs)\b",
        r"(?i)\bupi[/\-]",
        // Personal-transfer indicators.
        r"(?i)\b(sent to|received from|transfer to|transferred to|self transfer)\b",
        // Technical boilerplate from intermediary banks.
        r"(?i)\b(autopay mandate|mandate registration|reversal|wallet top[\- ]?up)\b",
        r"(?i)\bx{4,}\d{4}\b",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn cat(name: &str, brands: &[&str], keywords: &[&str], patterns: &[&str]) -> CategoryDef {
    CategoryDef {
        name: name.to_string(),
        brands: brands.iter().map(|s| s.to_string()).collect(),
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
        patterns: patterns.iter().map(|s| s.to_string()).collect(),
    }
}

fn builtin_categories() -> Vec<CategoryDef> {
    vec![
        cat(
            "Food & Dining",
            &["swiggy", "zomato", "dominos", "kfc", "burger king", "pizza hut", "haldirams"],
            &["restaurant", "cafe", "biryani", "pizza", "dhaba", "bakery", "eatery"],
            &[r"(?i)\bfood(?:s)? (?:court|plaza|point)\b"],
        ),
        cat(
            "Groceries",
            &["bigbasket", "blinkit", "zepto", "dmart", "jiomart", "grofers"],
            &["grocery", "supermarket", "kirana", "mart", "fresh", "provision"],
            &[],
        ),
        cat(
            "Shopping",
            &["amazon", "flipkart", "myntra", "ajio", "nykaa", "meesho"],
            &["store", "retail", "bazaar", "boutique", "lifestyle"],
            &[],
        ),
        cat(
            "Transport",
            &["uber", "ola", "rapido", "redbus", "irctc"],
            &["cab", "taxi", "metro", "petrol", "fuel", "parking", "toll"],
            &[r"(?i)\bfastag\b"],
        ),
        cat(
            "Entertainment",
            &["netflix", "hotstar", "spotify", "bookmyshow", "sonyliv"],
            &["cinema", "movie", "gaming", "subscription"],
            &[r"(?i)\bprime video\b"],
        ),
        cat(
            "Utilities & Bills",
            &["airtel", "jio", "vodafone idea", "bsnl", "tata power"],
            &["electricity", "recharge", "broadband", "postpaid", "prepaid", "dth"],
            &[r"(?i)\b(gas|water) (?:bill|agency)\b"],
        ),
        cat(
            "Health",
            &["pharmeasy", "1mg", "netmeds", "apollo pharmacy", "practo"],
            &["pharmacy", "hospital", "clinic", "diagnostic", "medical"],
            &[r"(?i)\bpath ?lab\b"],
        ),
        cat(
            "Education",
            &["byjus", "unacademy", "vedantu", "coursera", "udemy"],
            &["school", "college", "tuition", "academy", "institute"],
            &[],
        ),
        cat(
            "Travel",
            &["makemytrip", "goibibo", "oyo", "cleartrip", "ixigo", "airbnb"],
            &["flight", "airlines", "hotel", "resort"],
            &[r"(?i)\b(indigo|spicejet|air india|vistara)\b"],
        ),
        cat(
            "Services",
            &["urban company"],
            &["salon", "laundry", "repair", "courier", "services"],
            &[],
        ),
    ]
}

fn builtin_fuzzy() -> Vec<FuzzyVariant> {
    let var = |canonical: &str, variants: &[&str]| FuzzyVariant {
        canonical: canonical.to_string(),
        variants: variants.iter().map(|s| s.to_string()).collect(),
    };
    vec![
        var("swiggy", &["swigy", "swiggi", "sviggy"]),
        var("zomato", &["zomoto", "zamato", "zomatto"]),
        var("amazon", &["amzn", "amazn", "amzon"]),
        var("flipkart", &["flpkart", "flipkrt", "fkrt"]),
        var("netflix", &["netflex", "ntflx"]),
        var("electricity", &["electricty", "electrcity"]),
    ]
}
