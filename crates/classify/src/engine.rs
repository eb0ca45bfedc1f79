use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Catalog, HeuristicConfig, SERVICES_CATEGORY, TRANSFERS_CATEGORY, UNCATEGORIZED};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to parse catalog TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },
}

/// Which rule layer produced a classification. Layers are tried in this
/// order; the first producing a match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchLayer {
    Exclusion,
    Exact,
    Fuzzy,
    Keyword,
    Pattern,
    Heuristic,
    None,
}

impl MatchLayer {
    /// Rule priority: lower number, higher precedence. 0 marks "no rule".
    pub fn priority(self) -> u8 {
        match self {
            MatchLayer::Exclusion => 1,
            MatchLayer::Exact => 2,
            MatchLayer::Fuzzy => 3,
            MatchLayer::Keyword => 4,
            MatchLayer::Pattern => 5,
            MatchLayer::Heuristic => 6,
            MatchLayer::None => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub confidence: f32,
    pub layer: MatchLayer,
    /// Set only by the exclusion layer: the text is an intermediary-bank or
    /// transfer artifact, not a merchant.
    pub excluded: bool,
}

impl Classification {
    fn matched(category: &str, confidence: f32, layer: MatchLayer) -> Self {
        Classification {
            category: category.to_string(),
            confidence,
            layer,
            excluded: false,
        }
    }

    pub fn priority(&self) -> u8 {
        self.layer.priority()
    }

    pub fn is_miss(&self) -> bool {
        self.layer == MatchLayer::None
    }
}

struct CompiledCategory {
    name: String,
    brands: Vec<String>,
    keywords: Vec<String>,
    patterns: Vec<Regex>,
}

/// Six-layer merchant classifier. A pure function of
/// `(text, optional amount)` and the catalog it was built from — no hidden
/// state, fully reproducible.
pub struct Classifier {
    exclusions: Vec<Regex>,
    categories: Vec<CompiledCategory>,
    /// `(variant, canonical)` pairs, variants lowercased at build time.
    fuzzy: Vec<(String, String)>,
    heuristics: HeuristicConfig,
}

impl Classifier {
    pub fn new(catalog: Catalog) -> Result<Self, CatalogError> {
        let compile = |pattern: &String| {
            Regex::new(pattern).map_err(|source| CatalogError::Pattern {
                pattern: pattern.clone(),
                source,
            })
        };

        let exclusions = catalog.exclusions.iter().map(compile).collect::<Result<_, _>>()?;

        let mut categories = Vec::with_capacity(catalog.categories.len());
        for def in &catalog.categories {
            categories.push(CompiledCategory {
                name: def.name.clone(),
                brands: def.brands.iter().map(|b| b.to_lowercase()).collect(),
                keywords: def.keywords.iter().map(|k| k.to_lowercase()).collect(),
                patterns: def.patterns.iter().map(compile).collect::<Result<_, _>>()?,
            });
        }

        let fuzzy = catalog
            .fuzzy
            .iter()
            .flat_map(|fz| {
                fz.variants
                    .iter()
                    .map(|v| (v.to_lowercase(), fz.canonical.to_lowercase()))
                    .collect::<Vec<_>>()
            })
            .collect();

        Ok(Classifier {
            exclusions,
            categories,
            fuzzy,
            heuristics: catalog.heuristics,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, CatalogError> {
        Classifier::new(Catalog::from_toml(content)?)
    }

    /// Classify free-text merchant/description text. `amount` feeds the
    /// heuristic layer only.
    pub fn classify(&self, text: &str, amount: Option<Decimal>) -> Classification {
        let text = text.trim();
        let lower = text.to_lowercase();

        // Layer 1: exclusion. Raw descriptions frequently carry
        // intermediary-bank artifacts that would otherwise pollute merchant
        // categories; short-circuit them into the transfer bucket.
        if self.exclusions.iter().any(|re| re.is_match(text)) {
            return Classification {
                category: TRANSFERS_CATEGORY.to_string(),
                confidence: 1.0,
                layer: MatchLayer::Exclusion,
                excluded: true,
            };
        }

        // Layer 2: exact brand match.
        for cat in &self.categories {
            if cat.brands.iter().any(|b| *b == lower) {
                return Classification::matched(&cat.name, 1.0, MatchLayer::Exact);
            }
        }

        // Layer 3: fuzzy variants resolved through their canonical keyword.
        for (variant, canonical) in &self.fuzzy {
            if lower.contains(variant.as_str()) {
                if let Some(cat) = self.owner_of(canonical) {
                    return Classification::matched(&cat.name, 0.95, MatchLayer::Fuzzy);
                }
            }
        }

        // Layer 4: substring over brands and keywords, in
        // category-declaration order.
        for cat in &self.categories {
            let hit = cat
                .brands
                .iter()
                .chain(cat.keywords.iter())
                .any(|k| lower.contains(k.as_str()));
            if hit {
                return Classification::matched(&cat.name, 0.9, MatchLayer::Keyword);
            }
        }

        // Layer 5: per-category regex patterns.
        for cat in &self.categories {
            if cat.patterns.iter().any(|re| re.is_match(text)) {
                return Classification::matched(&cat.name, 0.85, MatchLayer::Pattern);
            }
        }

        // Layer 6: name-shape + amount heuristics.
        if let Some(c) = self.heuristic(text, &lower, amount) {
            return c;
        }

        Classification {
            category: UNCATEGORIZED.to_string(),
            confidence: 0.0,
            layer: MatchLayer::None,
            excluded: false,
        }
    }

    fn owner_of(&self, canonical: &str) -> Option<&CompiledCategory> {
        self.categories.iter().find(|cat| {
            cat.brands.iter().any(|b| b == canonical)
                || cat.keywords.iter().any(|k| k == canonical)
        })
    }

    fn heuristic(&self, text: &str, lower: &str, amount: Option<Decimal>) -> Option<Classification> {
        let has_corporate_suffix = self
            .heuristics
            .corporate_suffixes
            .iter()
            .any(|s| lower.contains(&s.to_lowercase()));

        // An all-caps two/three word name with a small amount and no
        // corporate suffix reads like a person, not a merchant.
        let words = text.split_whitespace().count();
        let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
        let all_caps = !letters.is_empty() && letters.iter().all(|c| c.is_uppercase());
        let small_amount = amount
            .map(|a| a.abs() < self.heuristics.personal_transfer_ceiling)
            .unwrap_or(false);

        if all_caps && (2..=3).contains(&words) && small_amount && !has_corporate_suffix {
            return Some(Classification::matched(
                TRANSFERS_CATEGORY,
                0.7,
                MatchLayer::Heuristic,
            ));
        }

        if has_corporate_suffix {
            return Some(Classification::matched(
                SERVICES_CATEGORY,
                0.7,
                MatchLayer::Heuristic,
            ));
        }

        None
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Classifier::new(Catalog::default()).expect("built-in catalog is valid")
    }
}
