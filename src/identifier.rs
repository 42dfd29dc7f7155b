// 🔖 Identifier Parser - Part number → family code
// Anchored, fixed-width grammar: <vendor><series><2 digits><free suffix>
// e.g. STM32 + L0 + 71 + RBT6 → L0x1

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Vendor prefix used by the product exports
pub const DEFAULT_VENDOR_PREFIX: &str = "STM32";

/// Width of the digit group following the series prefix
const DIGIT_GROUP_WIDTH: usize = 2;

// ============================================================================
// FAMILY CODE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FamilyCode {
    /// L0 value line (L010)
    #[serde(rename = "L0x0")]
    L0x0,
    /// L0 base peripherals (L011 .. L081)
    #[serde(rename = "L0x1")]
    L0x1,
    /// L0 with USB
    #[serde(rename = "L0x2")]
    L0x2,
    /// L0 with USB + LCD
    #[serde(rename = "L0x3")]
    L0x3,
    #[serde(rename = "L100")]
    L100,
    #[serde(rename = "L151")]
    L151,
    #[serde(rename = "L152")]
    L152,
    #[serde(rename = "L162")]
    L162,
}

impl FamilyCode {
    pub const ALL: [FamilyCode; 8] = [
        FamilyCode::L0x0,
        FamilyCode::L0x1,
        FamilyCode::L0x2,
        FamilyCode::L0x3,
        FamilyCode::L100,
        FamilyCode::L151,
        FamilyCode::L152,
        FamilyCode::L162,
    ];

    /// Label written into the `series_line` column
    pub fn label(&self) -> &'static str {
        match self {
            FamilyCode::L0x0 => "L0x0",
            FamilyCode::L0x1 => "L0x1",
            FamilyCode::L0x2 => "L0x2",
            FamilyCode::L0x3 => "L0x3",
            FamilyCode::L100 => "L100",
            FamilyCode::L151 => "L151",
            FamilyCode::L152 => "L152",
            FamilyCode::L162 => "L162",
        }
    }
}

impl fmt::Display for FamilyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FamilyCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FamilyCode::ALL
            .iter()
            .copied()
            .find(|family| family.label() == s.trim())
            .ok_or_else(|| Error::invalid_rules(format!("unknown family code '{}'", s)))
    }
}

// ============================================================================
// SERIES PREFIX TABLE
// ============================================================================

/// One series prefix and the digit groups it recognises
#[derive(Debug, Clone)]
struct SeriesPrefix {
    series: &'static str,
    digit_groups: &'static [(&'static str, FamilyCode)],
}

const L0_DIGIT_GROUPS: &[(&str, FamilyCode)] = &[
    ("10", FamilyCode::L0x0),
    ("11", FamilyCode::L0x1),
    ("21", FamilyCode::L0x1),
    ("31", FamilyCode::L0x1),
    ("41", FamilyCode::L0x1),
    ("51", FamilyCode::L0x1),
    ("61", FamilyCode::L0x1),
    ("71", FamilyCode::L0x1),
    ("81", FamilyCode::L0x1),
    ("52", FamilyCode::L0x2),
    ("62", FamilyCode::L0x2),
    ("72", FamilyCode::L0x2),
    ("82", FamilyCode::L0x2),
    ("53", FamilyCode::L0x3),
    ("63", FamilyCode::L0x3),
    ("73", FamilyCode::L0x3),
    ("83", FamilyCode::L0x3),
];

const L1_DIGIT_GROUPS: &[(&str, FamilyCode)] = &[
    ("00", FamilyCode::L100),
    ("51", FamilyCode::L151),
    ("52", FamilyCode::L152),
    ("62", FamilyCode::L162),
];

// ============================================================================
// PARSER
// ============================================================================

pub struct IdentifierParser {
    vendor_prefix: String,
    series: Vec<SeriesPrefix>,
}

impl IdentifierParser {
    /// Parser for the default vendor prefix
    pub fn new() -> Self {
        Self::with_vendor_prefix(DEFAULT_VENDOR_PREFIX)
    }

    /// Parser for a custom vendor prefix (e.g. anonymised exports)
    pub fn with_vendor_prefix(vendor_prefix: impl Into<String>) -> Self {
        let mut series = vec![
            SeriesPrefix {
                series: "L0",
                digit_groups: L0_DIGIT_GROUPS,
            },
            SeriesPrefix {
                series: "L1",
                digit_groups: L1_DIGIT_GROUPS,
            },
        ];
        // Most specific prefix first
        series.sort_by(|a, b| b.series.len().cmp(&a.series.len()));

        IdentifierParser {
            vendor_prefix: vendor_prefix.into(),
            series,
        }
    }

    /// Full prefixes (vendor + series) this parser recognises
    pub fn series_prefixes(&self) -> Vec<String> {
        self.series
            .iter()
            .map(|s| format!("{}{}", self.vendor_prefix, s.series))
            .collect()
    }

    /// True when the identifier belongs to one of the reconciled series,
    /// regardless of whether its digit group is known
    pub fn matches_series(&self, identifier: &str) -> bool {
        let identifier = identifier.trim();
        self.series_prefixes()
            .iter()
            .any(|prefix| identifier.starts_with(prefix.as_str()))
    }

    /// Derive the family code of a part identifier
    ///
    /// Example:
    /// ```
    /// use eeprom_reconcile::{FamilyCode, IdentifierParser};
    ///
    /// let parser = IdentifierParser::new();
    /// assert_eq!(parser.parse("STM32L071RBT6").unwrap(), FamilyCode::L0x1);
    /// assert_eq!(parser.parse("STM32L152RET6").unwrap(), FamilyCode::L152);
    /// ```
    pub fn parse(&self, identifier: &str) -> Result<FamilyCode> {
        let identifier = identifier.trim();

        for series in &self.series {
            let prefix = format!("{}{}", self.vendor_prefix, series.series);
            if !identifier.starts_with(&prefix) {
                continue;
            }

            let digits = identifier
                .get(prefix.len()..prefix.len() + DIGIT_GROUP_WIDTH)
                .filter(|group| group.bytes().all(|b| b.is_ascii_digit()))
                .ok_or_else(|| Error::MalformedDigits {
                    identifier: identifier.to_string(),
                    prefix: prefix.clone(),
                })?;

            return series
                .digit_groups
                .iter()
                .find(|(group, _)| *group == digits)
                .map(|(_, family)| *family)
                .ok_or_else(|| Error::UnknownDigitGroup {
                    identifier: identifier.to_string(),
                    prefix,
                    digits: digits.to_string(),
                });
        }

        Err(Error::UnrecognizedPrefix {
            identifier: identifier.to_string(),
        })
    }
}

impl Default for IdentifierParser {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
