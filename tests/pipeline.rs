// 🔁 End-to-end: product lists → seed → classify → reconcile

use eeprom_reconcile::{
    load_product_lists, load_research_table, save_research_table, seed_research_table, Address,
    ClassificationEngine, DiscrepancyKind, IdentifierParser, ReconciliationEngine,
    ReconciliationReport, CategoryClassifier,
};
use serde_json::json;
use std::fs;
use std::path::Path;

const L0_EXPORT: &str = "\
Part Number,Flash Size (kB) (Prog),RAM Size (kB),Data E2PROM (B),A/D Converters 12-bit,
,,,,,Number of Channels typ
STM32L071RB,128,20,6144,1,16
STM32L011D4,16,2,512,1,10
STM32L010F4,16,2,128,1,10
STM32F030C8,64,8,0,1,10
";

const L1_EXPORT: &str = "\
Part Number,Flash Size (kB) (Prog),RAM Size (kB),Data E2PROM (B)
,,,
STM32L100C6,32,4,4096
STM32L151RE,512,80,16384
";

fn write_exports(dir: &Path) -> String {
    fs::write(dir.join("ProductsList_L0.csv"), L0_EXPORT).unwrap();
    fs::write(dir.join("ProductsList_L1.csv"), L1_EXPORT).unwrap();
    format!("{}/ProductsList_L*.csv", dir.display())
}

fn descriptor(eeprom: serde_json::Value) -> String {
    json!({
        "name": "STM32L071RB",
        "memory": [[
            {"kind": "flash", "name": "BANK_1", "size": 131072, "address": 134217728u64},
            {"kind": "ram", "name": "SRAM", "size": 20480, "address": 536870912u64}
        ], eeprom]
    })
    .to_string()
}

#[test]
fn test_seed_classify_reconcile() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = write_exports(dir.path());
    let table_path = dir.path().join("research.csv");
    let parser = IdentifierParser::new();

    // Seed
    let products = load_product_lists(&pattern).unwrap();
    let mut records = Vec::new();
    let seeded = seed_research_table(&mut records, &products, &parser);
    assert_eq!(seeded.added, 5);
    assert_eq!(seeded.out_of_series, 1);
    save_research_table(&table_path, &records).unwrap();

    // Classify
    let engine = ClassificationEngine::builtin().unwrap();
    let mut records = load_research_table(&table_path).unwrap();
    let summary = engine.classify_table(&mut records);
    assert_eq!(summary.classified, 4);
    assert_eq!(summary.unclassified, 1);
    save_research_table(&table_path, &records).unwrap();

    let records = load_research_table(&table_path).unwrap();
    let l071 = records.iter().find(|r| r.part_number == "STM32L071RB").unwrap();
    assert_eq!(l071.category_from_doc, "Category 5 (128K Flash)");
    assert_eq!(l071.eeprom_bank2_start_addr, Some(Address(0x0808_0C00)));

    let l010 = records.iter().find(|r| r.part_number == "STM32L010F4").unwrap();
    assert!(l010.is_unclassified());
    assert_eq!(l010.series_line, "L0x0");

    let l151 = records.iter().find(|r| r.part_number == "STM32L151RE").unwrap();
    assert_eq!(l151.category_from_doc, "Cat.5/Cat.6 (L151)");
    assert_eq!(l151.eeprom_bank2_start_addr, Some(Address(0x0808_2000)));

    // Descriptors: L071 gains its EEPROM banks, nothing else changes
    let original = dir.path().join("original");
    let updated = dir.path().join("updated");
    fs::create_dir_all(&original).unwrap();
    fs::create_dir_all(&updated).unwrap();
    fs::write(original.join("STM32L071RB.json"), descriptor(json!([]))).unwrap();
    fs::write(
        updated.join("STM32L071RB.json"),
        descriptor(json!([
            {"kind": "eeprom", "name": "EEPROM_BANK_1", "size": 3072, "address": 134742016u64},
            {"kind": "eeprom", "name": "EEPROM_BANK_2", "size": 3072, "address": 134745088u64}
        ])),
    )
    .unwrap();

    // Reconcile
    let reconciler = ReconciliationEngine::new();
    let mut report = ReconciliationReport::new();
    report.add_check("product_list", reconciler.compare_products(&records, &products));
    report.add_check("table", reconciler.check_table(&records));
    report.add_check(
        "descriptors",
        reconciler
            .compare_descriptor_dirs(&original, &updated, &records)
            .unwrap(),
    );

    // Only the unclassified L010 is flagged (export without documented size)
    let tags: Vec<String> = report.discrepancies.iter().map(|d| d.tag()).collect();
    assert_eq!(tags, vec!["INFO_EXPORT_VS_DOC"]);
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_table_part_missing_from_export() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = write_exports(dir.path());
    let products = load_product_lists(&pattern).unwrap();

    let mut records = Vec::new();
    seed_research_table(&mut records, &products, &IdentifierParser::new());
    let mut extra = eeprom_reconcile::PartRecord::new("STM32L011F3");
    extra.total_eeprom_b_from_export = Some(512);
    records.push(extra);

    let found = ReconciliationEngine::new().compare_products(&records, &products);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].kind, DiscrepancyKind::NotFoundInSource);
    assert_eq!(found[0].part_number, "STM32L011F3");
}

#[test]
fn test_anonymised_prefix() {
    let engine = ClassificationEngine::new(
        IdentifierParser::with_vendor_prefix("XXXX"),
        CategoryClassifier::builtin().unwrap(),
    );

    let (category, layout) = engine.classify_part("XXXXL100C6", None, 4096).unwrap();
    assert_eq!(category.as_str(), "Cat.1 (L100)");
    assert_eq!(layout.bank1_start(), Some(Address(0x0808_0000)));
    assert_eq!(layout.bank2_start(), None);

    assert!(engine.classify_part("STM32L100C6", None, 4096).is_err());
}
