// 📦 Product List Loader - Vendor CSV exports → product rows
// Row 0 = header, row 1 = unit/sub-header (skipped), then one row per part.

use crate::compare::FieldValue;
use crate::error::{Error, Result};
use crate::record::parse_whole_number;
use csv::ReaderBuilder;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PART_NUMBER: &str = "part_number";
const FLASH: &str = "flash_size_kb_prog";
const RAM: &str = "ram_size_kb";
const EEPROM: &str = "data_e2prom_b";
const ADC_BASE: &str = "a_d_converters_12_bit";

// ============================================================================
// PRODUCT ROW
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ProductRow {
    pub part_number: String,
    pub flash_size_kb_prog: Option<u32>,
    pub ram_size_kb: Option<u32>,
    pub data_e2prom_b: Option<u32>,

    /// Remaining columns by normalized name
    pub attributes: BTreeMap<String, String>,

    /// File this row came from
    pub source_file: String,
}

impl ProductRow {
    pub fn new(part_number: impl Into<String>) -> Self {
        ProductRow {
            part_number: part_number.into(),
            flash_size_kb_prog: None,
            ram_size_kb: None,
            data_e2prom_b: None,
            attributes: BTreeMap::new(),
            source_file: String::new(),
        }
    }

    pub fn with_sizes(
        mut self,
        flash_kb: Option<u32>,
        ram_kb: Option<u32>,
        eeprom_b: Option<u32>,
    ) -> Self {
        self.flash_size_kb_prog = flash_kb;
        self.ram_size_kb = ram_kb;
        self.data_e2prom_b = eeprom_b;
        self
    }

    pub fn key(&self) -> &str {
        self.part_number.trim()
    }

    /// Fields this source shares with the research table, under table column names
    pub fn field_view(&self) -> BTreeMap<String, Option<FieldValue>> {
        let mut fields = BTreeMap::new();
        fields.insert(FLASH.to_string(), self.flash_size_kb_prog.map(FieldValue::Int));
        fields.insert(RAM.to_string(), self.ram_size_kb.map(FieldValue::Int));
        fields.insert(
            "total_eeprom_b_from_export".to_string(),
            self.data_e2prom_b.map(FieldValue::Int),
        );
        fields
    }
}

// ============================================================================
// COLUMN NAMES
// ============================================================================

/// Normalize a vendor column header to snake_case
///
/// Example:
/// ```
/// use eeprom_reconcile::products::normalize_column_name;
///
/// assert_eq!(normalize_column_name("Flash Size (kB) (Prog)"), "flash_size_kb_prog");
/// assert_eq!(normalize_column_name("Data E2PROM (B)"), "data_e2prom_b");
/// ```
pub fn normalize_column_name(raw: &str) -> String {
    let mut name = raw
        .trim()
        .to_lowercase()
        .replace([' ', '-'], "_")
        .replace(['(', ')'], "")
        .replace(['/', '.'], "_")
        .replace('@', "at")
        .replace('µ', "u")
        .replace('°', "deg");

    for suffix in ["_typ", "_nom"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name = stripped.to_string();
        }
    }

    name
}

/// Normalize a header row, splitting the two-level A/D converter header
fn normalize_headers(raw: &csv::StringRecord, path: &Path) -> Vec<String> {
    let mut headers: Vec<String> = raw.iter().map(normalize_column_name).collect();

    match headers.iter().position(|h| h == ADC_BASE) {
        Some(idx) if idx + 1 < headers.len() => {
            headers[idx + 1] = format!("{}_number_of_channels", ADC_BASE);
            headers[idx] = format!("{}_converters", ADC_BASE);
        }
        Some(_) => warn!(
            file = %path.display(),
            "no column after '{}' to hold the channel count", ADC_BASE
        ),
        None => debug!(file = %path.display(), "no '{}' column", ADC_BASE),
    }

    headers
}

// ============================================================================
// LOADING
// ============================================================================

/// Load one vendor product list
pub fn load_product_list(path: &Path) -> Result<Vec<ProductRow>> {
    let file = File::open(path).map_err(|e| Error::source_load(path, e))?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let source_file = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.csv")
        .to_string();

    let mut records = reader.records();
    let header = match records.next() {
        Some(row) => row.map_err(|e| Error::source_load(path, e))?,
        None => return Err(Error::source_load(path, "file is empty")),
    };
    let headers = normalize_headers(&header, path);

    let column = |name: &str| headers.iter().position(|h| h == name);
    let part_idx = column(PART_NUMBER)
        .ok_or_else(|| Error::source_load(path, "no 'Part Number' column"))?;
    let flash_idx = column(FLASH);
    let ram_idx = column(RAM);
    let eeprom_idx = column(EEPROM);
    let known = [Some(part_idx), flash_idx, ram_idx, eeprom_idx];

    // Sub-header row (units)
    if let Some(row) = records.next() {
        row.map_err(|e| Error::source_load(path, e))?;
    }

    let mut rows = Vec::new();
    for (line, result) in records.enumerate() {
        let record = result.map_err(|e| {
            Error::source_load(path, format!("line {}: {}", line + 3, e))
        })?;

        let part_number = record.get(part_idx).unwrap_or("").trim().to_string();
        if part_number.is_empty() {
            continue;
        }

        let number = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .and_then(parse_whole_number)
        };

        let attributes = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !known.contains(&Some(*i)))
            .filter_map(|(i, h)| record.get(i).map(|v| (h.clone(), v.to_string())))
            .collect();

        rows.push(ProductRow {
            part_number,
            flash_size_kb_prog: number(flash_idx),
            ram_size_kb: number(ram_idx),
            data_e2prom_b: number(eeprom_idx),
            attributes,
            source_file: source_file.clone(),
        });
    }

    debug!(file = %path.display(), rows = rows.len(), "loaded product list");
    Ok(rows)
}

/// Load and concatenate every product list matching a glob pattern
pub fn load_product_lists(pattern: &str) -> Result<Vec<ProductRow>> {
    let paths: Vec<PathBuf> = glob::glob(pattern)
        .map_err(|e| Error::source_load(pattern, e))?
        .filter_map(|entry| entry.ok())
        .collect();

    if paths.is_empty() {
        return Err(Error::source_load(pattern, "no product list matches the pattern"));
    }

    let mut rows = Vec::new();
    for path in &paths {
        let mut file_rows = load_product_list(path)?;
        info!(file = %path.display(), rows = file_rows.len(), "product list loaded");
        rows.append(&mut file_rows);
    }

    info!(files = paths.len(), rows = rows.len(), "all product lists loaded");
    Ok(rows)
}

/// Unique part numbers, sorted
pub fn unique_part_numbers<'a, I>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut unique: Vec<String> = parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    unique.sort();
    unique.dedup();
    unique
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const EXPORT: &str = "\
Part Number,Flash Size (kB) (Prog),RAM Size (kB),Data E2PROM (B),A/D Converters 12-bit,,Supply Voltage (V) min
,,,,,Number of Channels typ,
STM32L071RBT6,128,20,6144,1,16,1.65
STM32L011D4P6,16,2,512,1,10,1.65
,,,,,,
STM32L100C6U6A,32.0,4,4096,1,14,1.8
";

    #[test]
    fn test_normalize_column_name() {
        assert_eq!(normalize_column_name(" Part Number "), "part_number");
        assert_eq!(normalize_column_name("RAM Size (kB)"), "ram_size_kb");
        assert_eq!(normalize_column_name("A/D Converters 12-bit"), "a_d_converters_12_bit");
        assert_eq!(normalize_column_name("Current @ 25°C (µA) typ"), "current_at_25degc_ua");
        assert_eq!(normalize_column_name("Supply Voltage (V) nom"), "supply_voltage_v");
        assert_eq!(normalize_column_name("Op. Freq. (MHz)"), "op__freq__mhz");
    }

    #[test]
    fn test_load_product_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ProductsList_L0.csv");
        fs::write(&path, EXPORT).unwrap();

        let rows = load_product_list(&path).unwrap();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].part_number, "STM32L071RBT6");
        assert_eq!(rows[0].flash_size_kb_prog, Some(128));
        assert_eq!(rows[0].ram_size_kb, Some(20));
        assert_eq!(rows[0].data_e2prom_b, Some(6144));
        assert_eq!(rows[0].source_file, "ProductsList_L0.csv");
        assert_eq!(
            rows[0].attributes.get("a_d_converters_12_bit_number_of_channels"),
            Some(&"16".to_string())
        );
        assert_eq!(
            rows[0].attributes.get("a_d_converters_12_bit_converters"),
            Some(&"1".to_string())
        );
        assert!(!rows[0].attributes.contains_key("part_number"));

        // Float-formatted numbers from spreadsheet exports
        assert_eq!(rows[2].flash_size_kb_prog, Some(32));
    }

    #[test]
    fn test_missing_file_is_source_failure() {
        let result = load_product_list(Path::new("/nonexistent/ProductsList_L0.csv"));
        assert!(matches!(result, Err(Error::SourceLoadFailure { .. })));
    }

    #[test]
    fn test_missing_part_number_column_is_source_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "Name,Flash\n,\nfoo,1\n").unwrap();

        assert!(matches!(load_product_list(&path), Err(Error::SourceLoadFailure { .. })));
    }

    #[test]
    fn test_load_product_lists_glob() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ProductsList_L0.csv"), EXPORT).unwrap();
        fs::write(dir.path().join("ProductsList_L1.csv"), EXPORT).unwrap();
        fs::write(dir.path().join("Other.csv"), EXPORT).unwrap();

        let pattern = format!("{}/ProductsList_L*.csv", dir.path().display());
        let rows = load_product_lists(&pattern).unwrap();
        assert_eq!(rows.len(), 6);

        let empty = format!("{}/Nothing_*.csv", dir.path().display());
        assert!(matches!(
            load_product_lists(&empty),
            Err(Error::SourceLoadFailure { .. })
        ));
    }

    #[test]
    fn test_unique_part_numbers() {
        let parts = unique_part_numbers(["B", " A ", "B", "", "C"]);
        assert_eq!(parts, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_field_view_uses_table_columns() {
        let row = ProductRow::new("STM32L071RBT6").with_sizes(Some(128), None, Some(6144));
        let view = row.field_view();

        assert_eq!(view.len(), 3);
        assert_eq!(view["total_eeprom_b_from_export"], Some(FieldValue::Int(6144)));
        assert_eq!(view["ram_size_kb"], None);
    }
}
