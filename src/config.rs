// ⚙️ Run Configuration - JSON file + defaults, CLI flags override single fields

use crate::error::{Error, Result};
use crate::identifier::DEFAULT_VENDOR_PREFIX;
use crate::report::ReportFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_RESEARCH_TABLE: &str = "stm32_l0_l1_eeprom_research.csv";
pub const DEFAULT_PRODUCT_LIST_GLOB: &str = "ProductsList_L*.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Vendor prefix of every part identifier, e.g. "STM32"
    pub vendor_prefix: String,

    /// Canonical research table, rewritten in place
    pub research_table: PathBuf,

    /// Glob matching the vendor product list exports
    pub product_list_glob: String,

    /// Custom rule table; the embedded one when unset
    pub rules_file: Option<PathBuf>,

    /// Descriptor directories to compare (`<chip>.json` files)
    pub original_descriptors: Option<PathBuf>,
    pub updated_descriptors: Option<PathBuf>,

    pub report_format: ReportFormat,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            vendor_prefix: DEFAULT_VENDOR_PREFIX.to_string(),
            research_table: PathBuf::from(DEFAULT_RESEARCH_TABLE),
            product_list_glob: DEFAULT_PRODUCT_LIST_GLOB.to_string(),
            rules_file: None,
            original_descriptors: None,
            updated_descriptors: None,
            report_format: ReportFormat::Text,
        }
    }
}

impl Config {
    /// Load a JSON config file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::source_load(path, e))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| Error::source_load(path, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Config file when given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.vendor_prefix.trim().is_empty() {
            return Err(Error::configuration("vendor_prefix must not be empty"));
        }
        if self.product_list_glob.trim().is_empty() {
            return Err(Error::configuration("product_list_glob must not be empty"));
        }
        if self.research_table.as_os_str().is_empty() {
            return Err(Error::configuration("research_table must not be empty"));
        }
        if self.original_descriptors.is_some() != self.updated_descriptors.is_some() {
            return Err(Error::configuration(
                "original_descriptors and updated_descriptors must be set together",
            ));
        }
        Ok(())
    }

    pub fn with_vendor_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.vendor_prefix = prefix.into();
        self
    }

    pub fn with_research_table(mut self, path: impl Into<PathBuf>) -> Self {
        self.research_table = path.into();
        self
    }

    pub fn with_product_list_glob(mut self, pattern: impl Into<String>) -> Self {
        self.product_list_glob = pattern.into();
        self
    }

    pub fn with_rules_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.rules_file = Some(path.into());
        self
    }

    pub fn with_descriptor_dirs(
        mut self,
        original: impl Into<PathBuf>,
        updated: impl Into<PathBuf>,
    ) -> Self {
        self.original_descriptors = Some(original.into());
        self.updated_descriptors = Some(updated.into());
        self
    }

    pub fn with_report_format(mut self, format: ReportFormat) -> Self {
        self.report_format = format;
        self
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.vendor_prefix, "STM32");
        assert_eq!(config.research_table, PathBuf::from("stm32_l0_l1_eeprom_research.csv"));
        assert_eq!(config.product_list_glob, "ProductsList_L*.csv");
        assert_eq!(config.report_format, ReportFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"vendor_prefix": "XXXX", "report_format": "json"}"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.vendor_prefix, "XXXX");
        assert_eq!(config.report_format, ReportFormat::Json);
        assert_eq!(config.product_list_glob, DEFAULT_PRODUCT_LIST_GLOB);
    }

    #[test]
    fn test_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(Config::from_file(&path), Err(Error::SourceLoadFailure { .. })));

        fs::write(&path, r#"{"vendor_prefix": " "}"#).unwrap();
        assert!(matches!(Config::from_file(&path), Err(Error::Configuration { .. })));

        assert!(matches!(
            Config::load(Some(&dir.path().join("missing.json"))),
            Err(Error::SourceLoadFailure { .. })
        ));
    }

    #[test]
    fn test_descriptor_dirs_come_in_pairs() {
        let mut config = Config::default();
        config.original_descriptors = Some(PathBuf::from("original"));
        assert!(config.validate().is_err());

        let config = Config::default().with_descriptor_dirs("original", "updated");
        assert!(config.validate().is_ok());
    }
}
