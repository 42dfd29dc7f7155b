// 🧭 Classification Pass - identifier → family → category → layout, merged once per row
// A failing part is marked UNCLASSIFIED and the batch moves on.

use crate::error::Result;
use crate::identifier::{FamilyCode, IdentifierParser};
use crate::layout::ResolvedLayout;
use crate::record::{PartRecord, UNCLASSIFIED};
use crate::rules::{CategoryClassifier, HardwareCategory};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

// ============================================================================
// OUTCOME
// ============================================================================

/// Complete, immutable result for one part
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassificationOutcome {
    Classified {
        family: FamilyCode,
        category: HardwareCategory,
        layout: ResolvedLayout,
        rule_id: String,
    },
    Unclassified {
        /// Family label or parse error marker for `series_line`
        series_line: String,
        reason: String,
    },
    /// No exported EEPROM; excluded from classification
    Skipped,
}

impl ClassificationOutcome {
    pub fn is_classified(&self) -> bool {
        matches!(self, ClassificationOutcome::Classified { .. })
    }

    /// Merge into the table row in one step
    pub fn apply(&self, record: &mut PartRecord) {
        match self {
            ClassificationOutcome::Classified {
                family,
                category,
                layout,
                ..
            } => {
                record.series_line = family.label().to_string();
                record.category_from_doc = category.to_string();
                record.set_layout(layout);
            }
            ClassificationOutcome::Unclassified { series_line, .. } => {
                record.series_line = series_line.clone();
                record.category_from_doc = UNCLASSIFIED.to_string();
            }
            ClassificationOutcome::Skipped => {}
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationSummary {
    pub total: usize,
    pub classified: usize,
    pub unclassified: usize,
    pub skipped: usize,
    pub by_category: BTreeMap<String, usize>,
    /// (part number, reason) for every unclassified part
    pub failures: Vec<(String, String)>,
}

impl ClassificationSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} parts: {} classified, {} unclassified, {} skipped (no EEPROM)",
            self.total, self.classified, self.unclassified, self.skipped
        )
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct ClassificationEngine {
    parser: IdentifierParser,
    classifier: CategoryClassifier,
}

impl ClassificationEngine {
    pub fn new(parser: IdentifierParser, classifier: CategoryClassifier) -> Self {
        ClassificationEngine { parser, classifier }
    }

    /// Engine with the default vendor prefix and the embedded rule table
    pub fn builtin() -> Result<Self> {
        Ok(Self::new(IdentifierParser::new(), CategoryClassifier::builtin()?))
    }

    /// Classify one part from its identifier and raw sizes
    ///
    /// Example:
    /// ```
    /// use eeprom_reconcile::{Address, ClassificationEngine};
    ///
    /// let engine = ClassificationEngine::builtin().unwrap();
    /// let (category, layout) = engine.classify_part("STM32L071RBT6", Some(128), 6144).unwrap();
    /// assert_eq!(category.as_str(), "Category 5 (128K Flash)");
    /// assert_eq!(layout.bank2_start(), Some(Address(0x0808_0C00)));
    /// ```
    pub fn classify_part(
        &self,
        identifier: &str,
        flash_kb: Option<u32>,
        eeprom_b: u32,
    ) -> Result<(HardwareCategory, ResolvedLayout)> {
        let family = self.parser.parse(identifier)?;
        let classification = self.classifier.classify(family, flash_kb, eeprom_b)?;
        let layout = classification.resolve()?;
        Ok((classification.category, layout))
    }

    /// Outcome for one table row, without touching it
    pub fn outcome_for(&self, record: &PartRecord) -> ClassificationOutcome {
        let Some(eeprom_b) = record.exported_eeprom() else {
            return ClassificationOutcome::Skipped;
        };

        let family = match self.parser.parse(record.key()) {
            Ok(family) => family,
            Err(e) => {
                return ClassificationOutcome::Unclassified {
                    series_line: e.series_marker().unwrap_or(UNCLASSIFIED).to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let result = self
            .classifier
            .classify(family, record.flash_size_kb_prog, eeprom_b)
            .and_then(|c| {
                let layout = c.resolve()?;
                Ok((c, layout))
            });

        match result {
            Ok((classification, layout)) => ClassificationOutcome::Classified {
                family,
                category: classification.category,
                layout,
                rule_id: classification.rule_id,
            },
            Err(e) => {
                if !e.is_per_part() {
                    warn!(part = record.key(), error = %e, "rule table could not place part");
                }
                ClassificationOutcome::Unclassified {
                    series_line: family.label().to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Classify every row of the table and merge the results in place
    pub fn classify_table(&self, records: &mut [PartRecord]) -> ClassificationSummary {
        let mut summary = ClassificationSummary {
            total: records.len(),
            ..Default::default()
        };

        for record in records.iter_mut() {
            let outcome = self.outcome_for(record);

            match &outcome {
                ClassificationOutcome::Classified { category, rule_id, .. } => {
                    debug!(
                        part = record.key(),
                        rule = %rule_id,
                        category = %category,
                        "classified"
                    );
                    summary.classified += 1;
                    *summary.by_category.entry(category.to_string()).or_insert(0) += 1;
                }
                ClassificationOutcome::Unclassified { reason, .. } => {
                    debug!(part = record.key(), reason = %reason, "unclassified");
                    summary.unclassified += 1;
                    summary
                        .failures
                        .push((record.key().to_string(), reason.clone()));
                }
                ClassificationOutcome::Skipped => {
                    summary.skipped += 1;
                }
            }

            outcome.apply(record);
        }

        if summary.unclassified > 0 {
            warn!(unclassified = summary.unclassified, "some parts could not be classified");
        }
        info!(
            total = summary.total,
            classified = summary.classified,
            unclassified = summary.unclassified,
            skipped = summary.skipped,
            "classification pass complete"
        );

        summary
    }
}

// ============================================================================
// TESTS
// ============================================================================
