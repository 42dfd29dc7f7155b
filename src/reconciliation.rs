// ⚖️ Reconciliation Engine - Cross-source checks of the EEPROM layout data
// Compares the research table against the product lists, against itself,
// and against original/updated descriptor trees.
//
// Field checks use tolerant-null equality: a source that omits a zero value
// does not contradict one that states it.

use crate::compare::{compact, diff_trees, values_agree, FieldValue};
use crate::descriptor::{is_bank_region_list, list_descriptor_files, Descriptor, EEPROM_KIND};
use crate::error::Result;
use crate::identifier::IdentifierParser;
use crate::products::ProductRow;
use crate::record::PartRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

pub const SOURCE_TABLE: &str = "research_table";
pub const SOURCE_PRODUCTS: &str = "product_list";
pub const SOURCE_ORIGINAL: &str = "original_descriptor";
pub const SOURCE_UPDATED: &str = "updated_descriptor";

// ============================================================================
// DISCREPANCY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Sources contradict each other
    Mismatch,
    /// Worth a look, not a contradiction
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscrepancyKind {
    NotFoundInSource,
    StructureMismatch,
    FieldMismatch,
}

/// One side of a comparison: which source, and what it says
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub source: String,
    pub value: Option<String>,
}

impl Observation {
    pub fn of<T: fmt::Display>(source: &str, value: Option<T>) -> Self {
        Observation {
            source: source.to_string(),
            value: value.map(|v| v.to_string()),
        }
    }

    pub fn missing(source: &str) -> Self {
        Observation {
            source: source.to_string(),
            value: None,
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}={}", self.source, v),
            None => write!(f, "{}=<none>", self.source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub part_number: String,
    pub kind: DiscrepancyKind,
    pub severity: Severity,
    /// Upper-case code, e.g. `FLASH_SIZE_KB_PROG`, `EEPROM_B1_SIZE`
    pub code: String,
    /// Column name or JSON path
    pub field: String,
    pub left: Observation,
    pub right: Observation,
}

impl Discrepancy {
    pub fn new(
        part_number: &str,
        kind: DiscrepancyKind,
        severity: Severity,
        code: &str,
        field: &str,
        left: Observation,
        right: Observation,
    ) -> Self {
        Discrepancy {
            part_number: part_number.to_string(),
            kind,
            severity,
            code: code.to_string(),
            field: field.to_string(),
            left,
            right,
        }
    }

    /// Mismatch on a named column; code is the column name upper-cased
    pub fn field_mismatch(
        part_number: &str,
        field: &str,
        left: Observation,
        right: Observation,
    ) -> Self {
        Self::new(
            part_number,
            DiscrepancyKind::FieldMismatch,
            Severity::Mismatch,
            &field.to_uppercase(),
            field,
            left,
            right,
        )
    }

    pub fn not_found(part_number: &str, present_in: &str, missing_from: &str) -> Self {
        Self::new(
            part_number,
            DiscrepancyKind::NotFoundInSource,
            Severity::Mismatch,
            "NOT_FOUND",
            "part_number",
            Observation::of(present_in, Some(part_number)),
            Observation::missing(missing_from),
        )
    }

    /// `MISMATCH_<CODE>` or `INFO_<CODE>`
    pub fn tag(&self) -> String {
        match self.severity {
            Severity::Mismatch => format!("MISMATCH_{}", self.code),
            Severity::Info => format!("INFO_{}", self.code),
        }
    }

    pub fn is_mismatch(&self) -> bool {
        self.severity == Severity::Mismatch
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} - {}: {}, {}",
            self.tag(),
            self.part_number,
            self.field,
            self.left,
            self.right
        )
    }
}

// ============================================================================
// FIELD SOURCES
// ============================================================================

/// A partial view of a part's columns as seen by one source
pub trait FieldSource {
    fn key(&self) -> &str;
    fn field_view(&self) -> BTreeMap<String, Option<FieldValue>>;
}

impl FieldSource for PartRecord {
    fn key(&self) -> &str {
        PartRecord::key(self)
    }

    fn field_view(&self) -> BTreeMap<String, Option<FieldValue>> {
        PartRecord::field_view(self)
    }
}

impl FieldSource for ProductRow {
    fn key(&self) -> &str {
        ProductRow::key(self)
    }

    fn field_view(&self) -> BTreeMap<String, Option<FieldValue>> {
        ProductRow::field_view(self)
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    parser: IdentifierParser,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine {
            parser: IdentifierParser::new(),
        }
    }

    pub fn with_parser(parser: IdentifierParser) -> Self {
        ReconciliationEngine { parser }
    }

    /// Compare one canonical record against one record from another source
    ///
    /// Only fields present in both views are compared.
    pub fn compare_record<C, S>(
        &self,
        canonical: &C,
        canonical_name: &str,
        other: &S,
        other_name: &str,
    ) -> Vec<Discrepancy>
    where
        C: FieldSource,
        S: FieldSource,
    {
        let left = canonical.field_view();
        let right = other.field_view();

        let mut found = Vec::new();
        for (field, a) in &left {
            let Some(b) = right.get(field) else {
                continue;
            };
            if values_agree(a.as_ref(), b.as_ref()) {
                continue;
            }
            found.push(Discrepancy::field_mismatch(
                canonical.key(),
                field,
                Observation::of(canonical_name, a.as_ref()),
                Observation::of(other_name, b.as_ref()),
            ));
        }
        found
    }

    /// Compare every canonical record against a whole source
    ///
    /// A canonical part the source does not know yields one
    /// `NotFoundInSource` and no field checks. Duplicate source keys: the
    /// first row wins.
    ///
    /// Example:
    /// ```
    /// use eeprom_reconcile::{PartRecord, ProductRow, ReconciliationEngine};
    ///
    /// let mut record = PartRecord::new("STM32L011D4P6");
    /// record.total_eeprom_b_from_export = Some(512);
    ///
    /// let products: Vec<ProductRow> = Vec::new();
    /// let engine = ReconciliationEngine::new();
    /// let found = engine.compare_products(&[record], &products);
    /// assert_eq!(found.len(), 1);
    /// assert_eq!(found[0].tag(), "MISMATCH_NOT_FOUND");
    /// ```
    pub fn compare_sources<C, S>(
        &self,
        canonical: &[C],
        canonical_name: &str,
        source: &[S],
        source_name: &str,
    ) -> Vec<Discrepancy>
    where
        C: FieldSource,
        S: FieldSource,
    {
        let mut index: HashMap<&str, &S> = HashMap::new();
        for row in source {
            if index.contains_key(row.key()) {
                debug!(part = row.key(), source = source_name, "duplicate row ignored");
                continue;
            }
            index.insert(row.key(), row);
        }

        let mut found = Vec::new();
        for record in canonical {
            match index.get(record.key()) {
                Some(other) => {
                    found.extend(self.compare_record(record, canonical_name, *other, source_name))
                }
                None => {
                    found.push(Discrepancy::not_found(record.key(), canonical_name, source_name))
                }
            }
        }

        info!(
            source = source_name,
            parts = canonical.len(),
            discrepancies = found.len(),
            "source comparison complete"
        );
        found
    }

    /// Research table against the product lists
    pub fn compare_products(
        &self,
        table: &[PartRecord],
        products: &[ProductRow],
    ) -> Vec<Discrepancy> {
        self.compare_sources(table, SOURCE_TABLE, products, SOURCE_PRODUCTS)
    }

    /// Internal consistency of the research table
    ///
    /// - `BANK_SUM`: documented total vs bank1 + bank2
    /// - `EXPORT_VS_DOC`: exported total vs documented total; info when one
    ///   side is missing
    pub fn check_table(&self, table: &[PartRecord]) -> Vec<Discrepancy> {
        let mut found = Vec::new();

        for record in table {
            let part = record.key();
            let doc_total = record.eeprom_total_size_b_from_doc.map(u64::from);

            // Widened so two large bank cells cannot overflow
            let bank_sum = match (record.eeprom_bank1_size_b, record.eeprom_bank2_size_b) {
                (None, None) => None,
                (b1, b2) => Some(u64::from(b1.unwrap_or(0)) + u64::from(b2.unwrap_or(0))),
            };
            if !values_agree(doc_total, bank_sum) {
                found.push(Discrepancy::new(
                    part,
                    DiscrepancyKind::FieldMismatch,
                    Severity::Mismatch,
                    "BANK_SUM",
                    "eeprom_total_size_b_from_doc",
                    Observation::of("doc_total", doc_total),
                    Observation::of("bank_sum", bank_sum),
                ));
            }

            let exported = record.total_eeprom_b_from_export.map(u64::from);
            if !values_agree(exported, doc_total) {
                let severity = if exported.is_some() && doc_total.is_some() {
                    Severity::Mismatch
                } else {
                    Severity::Info
                };
                found.push(Discrepancy::new(
                    part,
                    DiscrepancyKind::FieldMismatch,
                    severity,
                    "EXPORT_VS_DOC",
                    "total_eeprom_b_from_export",
                    Observation::of("export", exported),
                    Observation::of("doc", doc_total),
                ));
            }
        }

        info!(parts = table.len(), discrepancies = found.len(), "table self-check complete");
        found
    }

    /// Compare one original descriptor against its updated counterpart
    ///
    /// For reconciled chips EEPROM regions are removed from both trees before
    /// the structural diff; sibling regions of a bank are compared without
    /// regard to order. EEPROM checks against `record` run when the chip is
    /// in the research table.
    pub fn compare_descriptor_pair(
        &self,
        original: &Descriptor,
        updated: Option<&Descriptor>,
        record: Option<&PartRecord>,
    ) -> Vec<Discrepancy> {
        let chip = original.chip.as_str();
        let Some(updated) = updated else {
            return vec![Discrepancy::not_found(chip, SOURCE_ORIGINAL, SOURCE_UPDATED)];
        };

        let reconciled = self.parser.matches_series(chip);
        let (left, right) = if reconciled {
            (original.without_kind(EEPROM_KIND), updated.without_kind(EEPROM_KIND))
        } else {
            (original.tree.clone(), updated.tree.clone())
        };

        let mut found: Vec<Discrepancy> = diff_trees(&left, &right, is_bank_region_list)
            .into_iter()
            .map(|d| {
                Discrepancy::new(
                    chip,
                    DiscrepancyKind::StructureMismatch,
                    Severity::Mismatch,
                    "STRUCTURE",
                    &d.path,
                    Observation::of(SOURCE_ORIGINAL, d.left.as_ref().map(compact)),
                    Observation::of(SOURCE_UPDATED, d.right.as_ref().map(compact)),
                )
            })
            .collect();

        let original_eeprom = original.eeprom_banks();
        let updated_eeprom = updated.eeprom_banks();

        if !reconciled {
            if updated_eeprom.region_count > 0 {
                let before =
                    Some(original_eeprom.total).filter(|_| original_eeprom.region_count > 0);
                found.push(Discrepancy::new(
                    chip,
                    DiscrepancyKind::FieldMismatch,
                    Severity::Mismatch,
                    "UNEXPECTED_EEPROM",
                    "memory",
                    Observation::of(SOURCE_ORIGINAL, before),
                    Observation::of(SOURCE_UPDATED, Some(updated_eeprom.total)),
                ));
            }
            return found;
        }

        if original_eeprom.region_count > 0 {
            found.push(Discrepancy::new(
                chip,
                DiscrepancyKind::FieldMismatch,
                Severity::Info,
                "ORIGINAL_HAS_EEPROM",
                "memory",
                Observation::of(SOURCE_ORIGINAL, Some(original_eeprom.total)),
                Observation::of(SOURCE_UPDATED, Some(updated_eeprom.total)),
            ));
        }

        match record {
            Some(record) => found.extend(self.check_descriptor_eeprom(updated, record)),
            None => debug!(chip, "chip not in research table, EEPROM checks skipped"),
        }

        found
    }

    /// EEPROM regions of a descriptor against the documented layout
    pub fn check_descriptor_eeprom(
        &self,
        descriptor: &Descriptor,
        record: &PartRecord,
    ) -> Vec<Discrepancy> {
        let chip = descriptor.chip.as_str();
        let banks = descriptor.eeprom_banks();
        let doc_total = record.eeprom_total_size_b_from_doc.map(u64::from);
        let doc_b1 = record.eeprom_bank1_size_b.map(u64::from);
        let doc_b2 = record.eeprom_bank2_size_b.map(u64::from);
        let expects_eeprom = doc_total.unwrap_or(0) > 0;

        let size_check = |code: &str, field: &str, doc: Option<u64>, json: Option<u64>, severity| {
            Discrepancy::new(
                chip,
                DiscrepancyKind::FieldMismatch,
                severity,
                code,
                field,
                Observation::of(SOURCE_TABLE, doc),
                Observation::of(SOURCE_UPDATED, json),
            )
        };

        let mut found = Vec::new();

        if banks.region_count == 0 {
            if expects_eeprom {
                found.push(size_check(
                    "EEPROM_MISSING",
                    "eeprom_total_size_b_from_doc",
                    doc_total,
                    None,
                    Severity::Mismatch,
                ));
            }
            return found;
        }

        if !values_agree(doc_total, Some(banks.total)) {
            let code = match doc_total {
                None => "EEPROM_UNEXPECTED_JSON",
                Some(_) => "EEPROM_TOTAL_SIZE",
            };
            found.push(size_check(
                code,
                "eeprom_total_size_b_from_doc",
                doc_total,
                Some(banks.total),
                Severity::Mismatch,
            ));
        }

        let bank_checks = [
            ("EEPROM_B1_SIZE", "EEPROM_B1_UNDECLARED", "eeprom_bank1_size_b", doc_b1, banks.bank1),
            ("EEPROM_B2_SIZE", "EEPROM_B2_UNDECLARED", "eeprom_bank2_size_b", doc_b2, banks.bank2),
        ];
        for (code, undeclared, field, doc, json) in bank_checks {
            if values_agree(doc, json) {
                continue;
            }
            // A bank the table leaves unset is only worth a note
            match doc {
                Some(_) => found.push(size_check(code, field, doc, json, Severity::Mismatch)),
                None if expects_eeprom => {
                    found.push(size_check(undeclared, field, None, json, Severity::Info))
                }
                None => {}
            }
        }

        found
    }

    /// Walk an original descriptor directory and compare each file with the
    /// same-named file of the updated directory
    pub fn compare_descriptor_dirs(
        &self,
        original_dir: &Path,
        updated_dir: &Path,
        table: &[PartRecord],
    ) -> Result<Vec<Discrepancy>> {
        let by_part: HashMap<&str, &PartRecord> =
            table.iter().rev().map(|r| (r.key(), r)).collect();
        let files = list_descriptor_files(original_dir)?;

        let mut found = Vec::new();
        for path in &files {
            let Some(file_name) = path.file_name() else {
                continue;
            };
            let original = Descriptor::load(path)?;

            let updated_path = updated_dir.join(file_name);
            let updated = if updated_path.is_file() {
                Some(Descriptor::load(&updated_path)?)
            } else {
                None
            };

            let record = by_part.get(original.chip.as_str()).copied();
            found.extend(self.compare_descriptor_pair(&original, updated.as_ref(), record));
        }

        info!(
            files = files.len(),
            discrepancies = found.len(),
            "descriptor comparison complete"
        );
        Ok(found)
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
