// 📋 Part Record - One row of the canonical research table
// Empty cell = unset (None), distinct from 0

use crate::compare::FieldValue;
use crate::layout::{Address, ResolvedLayout};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Category marker written when a part cannot be classified
pub const UNCLASSIFIED: &str = "UNCLASSIFIED";

/// Column order of the research table
pub const RESEARCH_COLUMNS: [&str; 14] = [
    "part_number",
    "series_line",
    "category_from_doc",
    "flash_size_kb_prog",
    "ram_size_kb",
    "total_eeprom_b_from_export",
    "eeprom_total_size_b_from_doc",
    "eeprom_bank1_start_addr",
    "eeprom_bank1_size_b",
    "eeprom_bank2_start_addr",
    "eeprom_bank2_size_b",
    "eeprom_write_size_b",
    "eeprom_erase_value",
    "notes",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartRecord {
    pub part_number: String,

    /// Family label, or a parse error marker
    #[serde(default)]
    pub series_line: String,

    /// Category label, or `UNCLASSIFIED`
    #[serde(default)]
    pub category_from_doc: String,

    #[serde(default, deserialize_with = "strict_u32")]
    pub flash_size_kb_prog: Option<u32>,

    #[serde(default, deserialize_with = "strict_u32")]
    pub ram_size_kb: Option<u32>,

    /// EEPROM size from the vendor export
    #[serde(default, deserialize_with = "strict_u32")]
    pub total_eeprom_b_from_export: Option<u32>,

    /// EEPROM size from the documented category layout
    #[serde(default, deserialize_with = "strict_u32")]
    pub eeprom_total_size_b_from_doc: Option<u32>,

    #[serde(default)]
    pub eeprom_bank1_start_addr: Option<Address>,

    #[serde(default, deserialize_with = "strict_u32")]
    pub eeprom_bank1_size_b: Option<u32>,

    #[serde(default)]
    pub eeprom_bank2_start_addr: Option<Address>,

    #[serde(default, deserialize_with = "strict_u32")]
    pub eeprom_bank2_size_b: Option<u32>,

    #[serde(default, deserialize_with = "strict_u32")]
    pub eeprom_write_size_b: Option<u32>,

    #[serde(default)]
    pub eeprom_erase_value: String,

    #[serde(default)]
    pub notes: String,

    /// Columns outside `RESEARCH_COLUMNS`, in file order; carried through rewrites
    #[serde(skip)]
    pub extra: Vec<(String, String)>,
}

impl PartRecord {
    pub fn new(part_number: impl Into<String>) -> Self {
        PartRecord {
            part_number: part_number.into(),
            ..Default::default()
        }
    }

    /// Part number as used for cross-source matching
    pub fn key(&self) -> &str {
        self.part_number.trim()
    }

    /// Exported EEPROM size, if the part has any
    pub fn exported_eeprom(&self) -> Option<u32> {
        self.total_eeprom_b_from_export.filter(|size| *size > 0)
    }

    pub fn is_unclassified(&self) -> bool {
        self.category_from_doc == UNCLASSIFIED
    }

    /// Overwrite every layout column at once
    pub fn set_layout(&mut self, layout: &ResolvedLayout) {
        self.eeprom_bank1_start_addr = layout.bank1_start();
        self.eeprom_bank1_size_b = layout.bank1_size();
        self.eeprom_bank2_start_addr = layout.bank2_start();
        self.eeprom_bank2_size_b = layout.bank2_size();
        self.eeprom_total_size_b_from_doc = Some(layout.total_size);
    }

    /// Value of a column outside `RESEARCH_COLUMNS`
    pub fn extra_value(&self, column: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Cells in `RESEARCH_COLUMNS` order, formatted as they are written to disk
    pub fn cells(&self) -> Vec<String> {
        fn cell<T: ToString>(value: Option<T>) -> String {
            value.map(|v| v.to_string()).unwrap_or_default()
        }

        vec![
            self.part_number.clone(),
            self.series_line.clone(),
            self.category_from_doc.clone(),
            cell(self.flash_size_kb_prog),
            cell(self.ram_size_kb),
            cell(self.total_eeprom_b_from_export),
            cell(self.eeprom_total_size_b_from_doc),
            cell(self.eeprom_bank1_start_addr),
            cell(self.eeprom_bank1_size_b),
            cell(self.eeprom_bank2_start_addr),
            cell(self.eeprom_bank2_size_b),
            cell(self.eeprom_write_size_b),
            self.eeprom_erase_value.clone(),
            self.notes.clone(),
        ]
    }

    /// All comparable columns, keyed by column name
    pub fn field_view(&self) -> BTreeMap<String, Option<FieldValue>> {
        let mut fields = BTreeMap::new();
        let mut put = |name: &str, value: Option<FieldValue>| {
            fields.insert(name.to_string(), value);
        };

        put("series_line", FieldValue::text(&self.series_line));
        put("category_from_doc", FieldValue::text(&self.category_from_doc));
        put("flash_size_kb_prog", self.flash_size_kb_prog.map(FieldValue::Int));
        put("ram_size_kb", self.ram_size_kb.map(FieldValue::Int));
        put(
            "total_eeprom_b_from_export",
            self.total_eeprom_b_from_export.map(FieldValue::Int),
        );
        put(
            "eeprom_total_size_b_from_doc",
            self.eeprom_total_size_b_from_doc.map(FieldValue::Int),
        );
        put(
            "eeprom_bank1_start_addr",
            self.eeprom_bank1_start_addr.map(FieldValue::Addr),
        );
        put("eeprom_bank1_size_b", self.eeprom_bank1_size_b.map(FieldValue::Int));
        put(
            "eeprom_bank2_start_addr",
            self.eeprom_bank2_start_addr.map(FieldValue::Addr),
        );
        put("eeprom_bank2_size_b", self.eeprom_bank2_size_b.map(FieldValue::Int));
        put("eeprom_write_size_b", self.eeprom_write_size_b.map(FieldValue::Int));
        put("eeprom_erase_value", FieldValue::text(&self.eeprom_erase_value));

        fields
    }
}

// ============================================================================
// NUMERIC CELLS
// ============================================================================

/// Parse a numeric cell: "", "128", "128.0" are accepted; "12.5" and "abc" are not
pub fn parse_whole_number(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<u32>() {
        return Some(value);
    }

    let value = trimmed.parse::<f64>().ok()?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

/// Numeric research-table column: empty → None, garbage → error
fn strict_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_whole_number(text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("not a whole number: '{}'", text))),
    }
}

// ============================================================================
// TESTS
// ============================================================================
