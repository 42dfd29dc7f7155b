// EEPROM Reconcile - Core Library
// Classifies STM32 L0/L1 parts into documented EEPROM layouts and checks
// the research table against product lists and descriptor files.

pub mod error;
pub mod config;
pub mod identifier;     // Part number → family code
pub mod layout;         // Bank templates + address resolution
pub mod rules;          // Category rule tables (JSON)
pub mod record;         // Research table row
pub mod classify;       // Classification pass over the table
pub mod compare;        // Tolerant-null equality + tree diff
pub mod products;       // Vendor product list loader
pub mod table;          // Research table load / save / seed
pub mod descriptor;     // Per-chip descriptor trees
pub mod reconciliation; // Cross-source checks
pub mod report;         // Discrepancy report

// Re-export commonly used types
pub use error::{Error, Result};
pub use config::Config;
pub use identifier::{FamilyCode, IdentifierParser, DEFAULT_VENDOR_PREFIX};
pub use layout::{Address, BankLayoutTemplate, BankSpec, ResolvedBank, ResolvedLayout};
pub use rules::{CategoryClassifier, CategoryRule, Classification, HardwareCategory, RuleTable};
pub use record::{PartRecord, RESEARCH_COLUMNS, UNCLASSIFIED};
pub use classify::{ClassificationEngine, ClassificationOutcome, ClassificationSummary};
pub use compare::{values_agree, FieldValue};
pub use products::{load_product_list, load_product_lists, ProductRow};
pub use table::{load_research_table, save_research_table, seed_research_table, SeedSummary};
pub use descriptor::{Descriptor, EepromBanks};
pub use reconciliation::{
    Discrepancy, DiscrepancyKind, FieldSource, Observation, ReconciliationEngine, Severity,
};
pub use report::{ReconciliationReport, ReportFormat};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
