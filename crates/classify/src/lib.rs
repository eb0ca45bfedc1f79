pub mod catalog;
pub mod engine;

pub use catalog::{
    Catalog, CategoryDef, FuzzyVariant, HeuristicConfig, SERVICES_CATEGORY,
    TRANSFERS_CATEGORY, UNCATEGORIZED,
};
pub use engine::{CatalogError, Classification, Classifier, MatchLayer};
