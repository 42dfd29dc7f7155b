// 🗄️ Research Table - Load, seed and rewrite the canonical CSV in place
// Rows are never deleted; seeding only appends parts seen for the first time.
// Columns this tool does not manage are read and written back untouched.

use crate::error::{Error, Result};
use crate::identifier::IdentifierParser;
use crate::products::ProductRow;
use crate::record::{PartRecord, RESEARCH_COLUMNS};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Load the research table
pub fn load_research_table(path: &Path) -> Result<Vec<PartRecord>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| Error::source_load(path, e))?;
    let headers = reader
        .headers()
        .map_err(|e| Error::source_load(path, e))?
        .clone();

    let extra_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, name)| !RESEARCH_COLUMNS.contains(name))
        .map(|(index, name)| (index, name.to_string()))
        .collect();
    if !extra_columns.is_empty() {
        debug!(file = %path.display(), columns = extra_columns.len(), "keeping extra columns");
    }

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result.map_err(|e| Error::source_load(path, e))?;
        let mut record: PartRecord = row
            .deserialize(Some(&headers))
            .map_err(|e| Error::source_load(path, e))?;
        record.extra = extra_columns
            .iter()
            .map(|(index, name)| (name.clone(), row.get(*index).unwrap_or_default().to_string()))
            .collect();
        records.push(record);
    }

    info!(file = %path.display(), rows = records.len(), "research table loaded");
    Ok(records)
}

/// Extra column names across all rows, in order of first appearance
fn extra_column_names(records: &[PartRecord]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for (name, _) in records.iter().flat_map(|r| r.extra.iter()) {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    names
}

/// Rewrite the research table (written beside the target, then renamed over it)
///
/// Known columns come first in `RESEARCH_COLUMNS` order, followed by any
/// extra columns the table was loaded with.
pub fn save_research_table(path: &Path, records: &[PartRecord]) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    let extra_columns = extra_column_names(records);

    {
        let mut writer = csv::Writer::from_path(&tmp).map_err(|source| Error::Csv {
            path: tmp.clone(),
            source,
        })?;

        let header = RESEARCH_COLUMNS
            .iter()
            .copied()
            .chain(extra_columns.iter().map(String::as_str));
        writer.write_record(header).map_err(|source| Error::Csv {
            path: tmp.clone(),
            source,
        })?;

        for record in records {
            let mut row = record.cells();
            for name in &extra_columns {
                row.push(record.extra_value(name).unwrap_or_default().to_string());
            }
            writer.write_record(&row).map_err(|source| Error::Csv {
                path: tmp.clone(),
                source,
            })?;
        }
        writer.flush().map_err(|source| Error::Io {
            path: tmp.clone(),
            source,
        })?;
    }

    fs::rename(&tmp, path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    info!(file = %path.display(), rows = records.len(), "research table written");
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub added: usize,
    pub already_present: usize,
    pub out_of_series: usize,
    pub without_eeprom: usize,
}

/// Append parts from the product lists that the table does not know yet
///
/// Only parts of the reconciled series with a non-zero exported EEPROM are
/// taken. New rows carry the parsed family (or its error marker) and the
/// exported sizes; documentation fields stay empty.
pub fn seed_research_table(
    records: &mut Vec<PartRecord>,
    products: &[ProductRow],
    parser: &IdentifierParser,
) -> SeedSummary {
    let mut summary = SeedSummary::default();
    let mut known: HashSet<String> = records.iter().map(|r| r.key().to_string()).collect();

    for product in products {
        let key = product.key();

        if !parser.matches_series(key) {
            summary.out_of_series += 1;
            continue;
        }
        if product.data_e2prom_b.unwrap_or(0) == 0 {
            summary.without_eeprom += 1;
            continue;
        }
        if !known.insert(key.to_string()) {
            summary.already_present += 1;
            continue;
        }

        let series_line = match parser.parse(key) {
            Ok(family) => family.label().to_string(),
            Err(e) => {
                debug!(part = key, error = %e, "seeded part has no family");
                e.series_marker().unwrap_or_default().to_string()
            }
        };

        let mut record = PartRecord::new(key);
        record.series_line = series_line;
        record.flash_size_kb_prog = product.flash_size_kb_prog;
        record.ram_size_kb = product.ram_size_kb;
        record.total_eeprom_b_from_export = product.data_e2prom_b;
        records.push(record);
        summary.added += 1;
    }

    info!(
        added = summary.added,
        already_present = summary.already_present,
        out_of_series = summary.out_of_series,
        without_eeprom = summary.without_eeprom,
        "research table seeded"
    );
    summary
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(part: &str, flash: u32, eeprom: u32) -> ProductRow {
        ProductRow::new(part).with_sizes(Some(flash), Some(8), Some(eeprom))
    }

    #[test]
    fn test_seed_filters_and_appends() {
        let parser = IdentifierParser::new();
        let mut existing = PartRecord::new("STM32L071RBT6");
        existing.notes = "checked by hand".to_string();
        let mut records = vec![existing];

        let products = vec![
            product("STM32L071RBT6", 128, 6144),
            product("STM32L011D4P6", 16, 512),
            product("STM32L011D4P6", 16, 512),
            product("STM32F103C8T6", 64, 0),
            product("STM32L010F4P6", 16, 0),
            product("STM32L099XX", 16, 128),
        ];

        let summary = seed_research_table(&mut records, &products, &parser);

        assert_eq!(summary.added, 2);
        assert_eq!(summary.already_present, 2);
        assert_eq!(summary.out_of_series, 1);
        assert_eq!(summary.without_eeprom, 1);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].notes, "checked by hand");
        assert_eq!(records[1].part_number, "STM32L011D4P6");
        assert_eq!(records[1].series_line, "L0x1");
        assert_eq!(records[1].total_eeprom_b_from_export, Some(512));
        assert_eq!(records[1].category_from_doc, "");
        assert_eq!(records[2].series_line, "UNKNOWN_DIGIT_GROUP");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("research.csv");

        let mut record = PartRecord::new("STM32L151CBT6");
        record.flash_size_kb_prog = Some(128);
        record.total_eeprom_b_from_export = Some(4096);
        record.notes = "note, with comma".to_string();

        save_research_table(&path, &[record.clone()]).unwrap();
        assert!(!path.with_extension("csv.tmp").exists());

        let loaded = load_research_table(&path).unwrap();
        assert_eq!(loaded, vec![record]);
    }

    #[test]
    fn test_extra_columns_survive_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("research.csv");
        let text = format!(
            "{},rust_regex_map_key,rust_mem_entry\n\
             STM32L071RBT6,L0x1,,128,20,6144,,,,,,,,,STM32L07.*,eeprom_l07x\n\
             STM32L011D4P6,L0x1,,16,2,512,,,,,,,,checked,,\n",
            RESEARCH_COLUMNS.join(",")
        );
        fs::write(&path, text).unwrap();

        let mut records = load_research_table(&path).unwrap();
        assert_eq!(records[0].extra_value("rust_regex_map_key"), Some("STM32L07.*"));
        assert_eq!(records[1].notes, "checked");

        // Classification-style update, then a seeded row without extras
        records[0].category_from_doc = "Category 5 (128K Flash)".to_string();
        records.push(PartRecord::new("STM32L151CBT6"));
        save_research_table(&path, &records).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        let header = written.lines().next().unwrap();
        assert!(header.ends_with(",notes,rust_regex_map_key,rust_mem_entry"));
        assert_eq!(header.split(',').count(), 16);

        let reloaded = load_research_table(&path).unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded[0].category_from_doc, "Category 5 (128K Flash)");
        assert_eq!(reloaded[0].extra_value("rust_regex_map_key"), Some("STM32L07.*"));
        assert_eq!(reloaded[0].extra_value("rust_mem_entry"), Some("eeprom_l07x"));
        assert_eq!(reloaded[1].extra_value("rust_mem_entry"), Some(""));
        assert_eq!(reloaded[2].extra_value("rust_mem_entry"), Some(""));
    }

    #[test]
    fn test_empty_table_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("research.csv");

        save_research_table(&path, &[]).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written.trim_end(), RESEARCH_COLUMNS.join(","));
        assert!(load_research_table(&path).unwrap().is_empty());
    }

    #[test]
    fn test_load_missing_table_is_source_failure() {
        let result = load_research_table(Path::new("/nonexistent/research.csv"));
        assert!(matches!(result, Err(Error::SourceLoadFailure { .. })));
    }
}
