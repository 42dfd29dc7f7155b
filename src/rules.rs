// 🏷️ Category Classifier - Rules as Data
// One rule table per family: (flash set, EEPROM size) → category + bank layout template

use crate::error::{Error, Result};
use crate::identifier::FamilyCode;
use crate::layout::{Address, BankLayoutTemplate, ResolvedLayout};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Rule table shipped with the crate
pub const BUILTIN_RULES: &str = include_str!("../rules/categories.json");

/// Placeholder substituted with the part's flash size in category labels
const FLASH_PLACEHOLDER: &str = "{flash_kb}";

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Rule ID for tracking
    pub id: String,

    /// Category label, may contain `{flash_kb}`
    pub category: String,

    /// Allowed flash sizes in KB (absent = any flash size, including unknown)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flash_kb: Option<Vec<u32>>,

    /// Exported EEPROM size in bytes this rule applies to
    pub eeprom_b: u32,

    /// Expected bank layout
    pub layout: BankLayoutTemplate,

    /// Description/notes about this rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CategoryRule {
    /// Check the (flash, eeprom) predicate
    pub fn matches(&self, flash_kb: Option<u32>, eeprom_b: u32) -> bool {
        if self.eeprom_b != eeprom_b {
            return false;
        }

        match (&self.flash_kb, flash_kb) {
            (None, _) => true,
            (Some(allowed), Some(flash)) => allowed.contains(&flash),
            (Some(_), None) => false,
        }
    }

    /// True when some (flash, eeprom) pair satisfies both rules
    pub fn overlaps(&self, other: &CategoryRule) -> bool {
        if self.eeprom_b != other.eeprom_b {
            return false;
        }

        match (&self.flash_kb, &other.flash_kb) {
            (None, _) | (_, None) => true,
            (Some(a), Some(b)) => a.iter().any(|flash| b.contains(flash)),
        }
    }

    fn label_for(&self, flash_kb: Option<u32>) -> String {
        match flash_kb {
            Some(flash) => self.category.replace(FLASH_PLACEHOLDER, &flash.to_string()),
            None => self.category.replace(FLASH_PLACEHOLDER, "?"),
        }
    }
}

/// Rules for one family plus its EEPROM base address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyRules {
    pub family: FamilyCode,
    pub eeprom_base: Address,
    pub rules: Vec<CategoryRule>,
}

/// On-disk rule table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTable {
    pub families: Vec<FamilyRules>,
}

/// Two rules of the same family that can match the same part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOverlap {
    pub family: FamilyCode,
    pub first: String,
    pub second: String,
}

impl fmt::Display for RuleOverlap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: rules '{}' and '{}' overlap", self.family, self.first, self.second)
    }
}

impl RuleTable {
    /// Every pair of rules within a family whose predicates intersect
    pub fn find_overlaps(&self) -> Vec<RuleOverlap> {
        let mut overlaps = Vec::new();

        for family in &self.families {
            for (i, first) in family.rules.iter().enumerate() {
                for second in &family.rules[i + 1..] {
                    if first.overlaps(second) {
                        overlaps.push(RuleOverlap {
                            family: family.family,
                            first: first.id.clone(),
                            second: second.id.clone(),
                        });
                    }
                }
            }
        }

        overlaps
    }
}

// ============================================================================
// CLASSIFICATION RESULT
// ============================================================================

/// Documented silicon category, e.g. "Category 5 (128K Flash)"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HardwareCategory(pub String);

impl HardwareCategory {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HardwareCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub family: FamilyCode,
    pub category: HardwareCategory,
    pub template: BankLayoutTemplate,
    pub eeprom_base: Address,
    pub rule_id: String,
}

impl Classification {
    /// Resolve the category template at the family's EEPROM base
    pub fn resolve(&self) -> Result<ResolvedLayout> {
        self.template.resolve(self.eeprom_base)
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

pub struct CategoryClassifier {
    families: BTreeMap<FamilyCode, FamilyRules>,
}

impl CategoryClassifier {
    /// Classifier backed by the embedded rule table
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_RULES)
    }

    /// Load rules from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::source_load(path, e))?;

        Self::from_json(&content).map_err(|e| match e {
            Error::InvalidRules { message } => Error::invalid_rules(format!(
                "{}: {}",
                path.display(),
                message
            )),
            other => other,
        })
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let table: RuleTable = serde_json::from_str(content)
            .map_err(|e| Error::invalid_rules(format!("failed to parse rules JSON: {}", e)))?;
        Self::from_table(table)
    }

    /// Validate and index a rule table
    ///
    /// Rejects duplicate families, invalid templates, templates whose total
    /// disagrees with the rule's EEPROM size, and overlapping rules.
    pub fn from_table(table: RuleTable) -> Result<Self> {
        let overlaps = table.find_overlaps();
        if !overlaps.is_empty() {
            let listed: Vec<String> = overlaps.iter().map(|o| o.to_string()).collect();
            return Err(Error::invalid_rules(listed.join("; ")));
        }

        let mut families = BTreeMap::new();
        for family in table.families {
            for rule in &family.rules {
                rule.layout.validate().map_err(|e| {
                    Error::invalid_rules(format!("{} rule '{}': {}", family.family, rule.id, e))
                })?;

                let total = rule.layout.total_size().unwrap_or_default();
                if total != rule.eeprom_b {
                    return Err(Error::invalid_rules(format!(
                        "{} rule '{}': banks sum to {} B but rule matches {} B",
                        family.family,
                        rule.id,
                        total,
                        rule.eeprom_b
                    )));
                }

                rule.layout.resolve(family.eeprom_base).map_err(|e| {
                    Error::invalid_rules(format!("{} rule '{}': {}", family.family, rule.id, e))
                })?;
            }

            let code = family.family;
            if families.insert(code, family).is_some() {
                return Err(Error::invalid_rules(format!(
                    "family {} defined more than once",
                    code
                )));
            }
        }

        debug!(families = families.len(), "loaded category rule table");
        Ok(CategoryClassifier { families })
    }

    /// Map (family, flash, exported EEPROM) to a category and its template
    pub fn classify(
        &self,
        family: FamilyCode,
        flash_kb: Option<u32>,
        eeprom_b: u32,
    ) -> Result<Classification> {
        let no_match = || Error::NoMatchingCategory {
            family: family.to_string(),
            flash_kb,
            eeprom_b,
        };

        let family_rules = self.families.get(&family).ok_or_else(no_match)?;

        // Rules are disjoint (checked at load), so the first match is the only match
        let rule = family_rules
            .rules
            .iter()
            .find(|rule| rule.matches(flash_kb, eeprom_b))
            .ok_or_else(no_match)?;

        Ok(Classification {
            family,
            category: HardwareCategory(rule.label_for(flash_kb)),
            template: rule.layout.clone(),
            eeprom_base: family_rules.eeprom_base,
            rule_id: rule.id.clone(),
        })
    }

    /// Families that have at least one rule
    pub fn families(&self) -> impl Iterator<Item = &FamilyRules> {
        self.families.values()
    }

    pub fn rule_count(&self) -> usize {
        self.families.values().map(|f| f.rules.len()).sum()
    }
}

// ============================================================================
// TESTS
// ============================================================================
