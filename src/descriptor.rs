// 🗂️ Descriptor Trees - Per-chip JSON files with a `memory` list of banks
// memory: [[region, region, ...], [region, ...]], region = {kind, name, size, address, ...}

use crate::error::{Error, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const EEPROM_KIND: &str = "eeprom";

const BANK1_NAME: &str = "EEPROM_BANK_1";
const BANK2_NAME: &str = "EEPROM_BANK_2";
const SINGLE_NAME: &str = "EEPROM";

// ============================================================================
// DESCRIPTOR
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    /// Chip name (file stem), e.g. "STM32L071C8"
    pub chip: String,
    pub tree: Value,
}

/// One memory region as seen by the EEPROM checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub name: Option<String>,
    pub size: u64,
    pub address: Option<u64>,
}

/// EEPROM regions mapped onto banks by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EepromBanks {
    pub region_count: usize,
    pub total: u64,
    pub bank1: Option<u64>,
    pub bank2: Option<u64>,
}

impl Descriptor {
    pub fn new(chip: impl Into<String>, tree: Value) -> Self {
        Descriptor {
            chip: chip.into(),
            tree,
        }
    }

    /// Load `<dir>/<chip>.json`
    pub fn load(path: &Path) -> Result<Self> {
        let chip = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::source_load(path, "file name is not valid UTF-8"))?
            .to_string();

        let content = fs::read_to_string(path).map_err(|e| Error::source_load(path, e))?;
        let tree: Value = serde_json::from_str(&content).map_err(|e| Error::source_load(path, e))?;

        Ok(Descriptor { chip, tree })
    }

    /// Regions of one kind across all banks, in bank order
    pub fn regions_of_kind(&self, kind: &str) -> Vec<MemoryRegion> {
        let Some(banks) = self.tree.get("memory").and_then(Value::as_array) else {
            return Vec::new();
        };

        banks
            .iter()
            .filter_map(Value::as_array)
            .flatten()
            .filter(|region| region.get("kind").and_then(Value::as_str) == Some(kind))
            .map(|region| MemoryRegion {
                name: region.get("name").and_then(Value::as_str).map(str::to_string),
                size: region_size(region),
                address: region.get("address").and_then(whole_number),
            })
            .collect()
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        !self.regions_of_kind(kind).is_empty()
    }

    /// Copy of the tree with every region of `kind` removed from every bank
    pub fn without_kind(&self, kind: &str) -> Value {
        let mut tree = self.tree.clone();
        if let Some(banks) = tree.get_mut("memory").and_then(Value::as_array_mut) {
            for bank in banks.iter_mut().filter_map(Value::as_array_mut) {
                bank.retain(|region| region.get("kind").and_then(Value::as_str) != Some(kind));
            }
        }
        tree
    }

    /// Map EEPROM regions onto bank 1 / bank 2
    ///
    /// `EEPROM_BANK_1` is bank 1; otherwise a region named `EEPROM` is bank 1
    /// when no `EEPROM_BANK_2` exists. `EEPROM_BANK_2` is bank 2. Names are
    /// compared case-insensitively.
    pub fn eeprom_banks(&self) -> EepromBanks {
        let regions = self.regions_of_kind(EEPROM_KIND);

        let size_of = |wanted: &str| -> Option<u64> {
            regions
                .iter()
                .filter(|r| {
                    r.name
                        .as_deref()
                        .map(|n| n.eq_ignore_ascii_case(wanted))
                        .unwrap_or(false)
                })
                .map(|r| r.size)
                .last()
        };

        let bank2 = size_of(BANK2_NAME);
        let bank1 = size_of(BANK1_NAME).or_else(|| match bank2 {
            None => size_of(SINGLE_NAME),
            Some(_) => None,
        });

        EepromBanks {
            region_count: regions.len(),
            total: regions.iter().fold(0u64, |sum, r| sum.saturating_add(r.size)),
            bank1,
            bank2,
        }
    }
}

/// Integer JSON number, or a float with no fractional part (`3072.0`)
fn whole_number(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
        .map(|f| f as u64)
}

/// Size of a region; a missing or non-numeric size counts as 0
fn region_size(region: &Value) -> u64 {
    let size = region.get("size").and_then(whole_number);
    if size.is_none() {
        debug!(region = %region, "region without a usable size");
    }
    size.unwrap_or(0)
}

/// Arrays holding sibling regions of one memory bank: `$.memory[<n>]`
pub fn is_bank_region_list(path: &str) -> bool {
    path.strip_prefix("$.memory[")
        .and_then(|rest| rest.strip_suffix(']'))
        .map(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// All `*.json` files of a descriptor directory, sorted by name
pub fn list_descriptor_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::source_load(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::source_load(dir, e))?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chip(memory: Value) -> Descriptor {
        Descriptor::new("STM32L071RB", json!({ "name": "STM32L071RB", "memory": memory }))
    }

    #[test]
    fn test_regions_of_kind_spans_banks() {
        let d = chip(json!([
            [
                {"kind": "flash", "name": "BANK_1", "size": 131072, "address": 134217728u64},
                {"kind": "eeprom", "name": "EEPROM_BANK_1", "size": 3072, "address": 134742016u64}
            ],
            [
                {"kind": "eeprom", "name": "EEPROM_BANK_2", "size": 3072, "address": 134745088u64}
            ]
        ]));

        let regions = d.regions_of_kind(EEPROM_KIND);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].name.as_deref(), Some("EEPROM_BANK_1"));
        assert_eq!(regions[1].address, Some(0x0808_0C00));
        assert!(d.has_kind("flash"));
        assert!(!d.has_kind("otp"));
    }

    #[test]
    fn test_missing_memory_has_no_regions() {
        let d = Descriptor::new("X", json!({"name": "X"}));
        assert!(d.regions_of_kind(EEPROM_KIND).is_empty());
        assert_eq!(d.eeprom_banks(), EepromBanks::default());
    }

    #[test]
    fn test_without_kind_keeps_other_regions() {
        let d = chip(json!([
            [{"kind": "flash", "name": "BANK_1"}, {"kind": "eeprom", "name": "EEPROM"}],
            [{"kind": "ram", "name": "SRAM"}]
        ]));

        let stripped = d.without_kind(EEPROM_KIND);
        assert_eq!(
            stripped["memory"],
            json!([[{"kind": "flash", "name": "BANK_1"}], [{"kind": "ram", "name": "SRAM"}]])
        );
        // Original untouched
        assert!(d.has_kind(EEPROM_KIND));
    }

    #[test]
    fn test_bank_mapping_named_banks() {
        let d = chip(json!([[
            {"kind": "eeprom", "name": "eeprom_bank_1", "size": 6144},
            {"kind": "eeprom", "name": "EEPROM_BANK_2", "size": 6144}
        ]]));

        let banks = d.eeprom_banks();
        assert_eq!(banks.region_count, 2);
        assert_eq!(banks.total, 12288);
        assert_eq!(banks.bank1, Some(6144));
        assert_eq!(banks.bank2, Some(6144));
    }

    #[test]
    fn test_bank_mapping_single_eeprom_region() {
        let d = chip(json!([[{"kind": "eeprom", "name": "EEPROM", "size": 4096}]]));
        let banks = d.eeprom_banks();
        assert_eq!(banks.bank1, Some(4096));
        assert_eq!(banks.bank2, None);
    }

    #[test]
    fn test_bank_mapping_eeprom_with_bank2_is_not_bank1() {
        let d = chip(json!([[
            {"kind": "eeprom", "name": "EEPROM", "size": 3072},
            {"kind": "eeprom", "name": "EEPROM_BANK_2", "size": 3072}
        ]]));
        let banks = d.eeprom_banks();
        assert_eq!(banks.bank1, None);
        assert_eq!(banks.bank2, Some(3072));
        assert_eq!(banks.total, 6144);
    }

    #[test]
    fn test_float_sizes_are_read() {
        let d = chip(json!([[
            {"kind": "eeprom", "name": "EEPROM_BANK_1", "size": 3072.0, "address": 134742016.0},
            {"kind": "eeprom", "name": "EEPROM_BANK_2", "size": 3072},
            {"kind": "eeprom", "name": "OTHER", "size": 12.5},
            {"kind": "eeprom", "name": "NOSIZE"}
        ]]));

        let regions = d.regions_of_kind(EEPROM_KIND);
        assert_eq!(regions[0].size, 3072);
        assert_eq!(regions[0].address, Some(0x0808_0000));
        assert_eq!(regions[2].size, 0);
        assert_eq!(regions[3].size, 0);

        let banks = d.eeprom_banks();
        assert_eq!(banks.bank1, Some(3072));
        assert_eq!(banks.total, 6144);
    }

    #[test]
    fn test_bank_region_list_paths() {
        assert!(is_bank_region_list("$.memory[0]"));
        assert!(is_bank_region_list("$.memory[12]"));
        assert!(!is_bank_region_list("$.memory"));
        assert!(!is_bank_region_list("$.memory[]"));
        assert!(!is_bank_region_list("$.memory[0][1]"));
        assert!(!is_bank_region_list("$.pins[0]"));
    }

    #[test]
    fn test_load_and_list_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("STM32L151CB.json"), r#"{"memory": []}"#).unwrap();
        fs::write(dir.path().join("STM32L071RB.json"), r#"{"memory": []}"#).unwrap();
        fs::write(dir.path().join("README.txt"), "ignored").unwrap();

        let files = list_descriptor_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("STM32L071RB.json"));

        let d = Descriptor::load(&files[1]).unwrap();
        assert_eq!(d.chip, "STM32L151CB");
    }

    #[test]
    fn test_load_failures_are_source_failures() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("BAD.json");
        fs::write(&bad, "{ not json").unwrap();

        assert!(matches!(Descriptor::load(&bad), Err(Error::SourceLoadFailure { .. })));
        assert!(matches!(
            list_descriptor_files(&dir.path().join("missing")),
            Err(Error::SourceLoadFailure { .. })
        ));
    }
}
