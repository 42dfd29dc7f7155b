// 🚨 Error Taxonomy - Everything that can stop a part or a run
// Per-part failures (parser, classifier) degrade one row; source failures stop the run.

use std::path::PathBuf;

/// Result type alias used across the library
pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // ========================================================================
    // IDENTIFIER PARSER
    // ========================================================================
    /// Identifier does not start with any known vendor/series prefix
    #[error("unrecognized prefix in part identifier '{identifier}'")]
    UnrecognizedPrefix { identifier: String },

    /// Prefix matched but the fixed-width digit group could not be extracted
    #[error("malformed digit group after '{prefix}' in part identifier '{identifier}'")]
    MalformedDigits { identifier: String, prefix: String },

    /// Digit group is well formed but not part of any known family
    #[error("unknown digit group '{digits}' after '{prefix}' in part identifier '{identifier}'")]
    UnknownDigitGroup {
        identifier: String,
        prefix: String,
        digits: String,
    },

    // ========================================================================
    // CATEGORY CLASSIFIER
    // ========================================================================
    /// No rule of the family matches the (flash, eeprom) pair
    #[error("no category for family {family} with flash {flash_kb:?} KB and EEPROM {eeprom_b} B")]
    NoMatchingCategory {
        family: String,
        flash_kb: Option<u32>,
        eeprom_b: u32,
    },

    /// Rule table is unusable (overlapping rules, bad bank layout, unknown family)
    #[error("invalid rule table: {message}")]
    InvalidRules { message: String },

    // ========================================================================
    // COLLABORATOR I/O
    // ========================================================================
    /// Input file missing or unparsable; fatal for the run
    #[error("failed to load source '{}': {cause}", path.display())]
    SourceLoadFailure { path: PathBuf, cause: String },

    /// Output could not be written
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV serialization error while writing a table
    #[error("CSV error on '{}': {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Configuration rejected
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl Error {
    /// Build a source-load failure from any displayable cause
    pub fn source_load(path: impl Into<PathBuf>, cause: impl std::fmt::Display) -> Self {
        Error::SourceLoadFailure {
            path: path.into(),
            cause: cause.to_string(),
        }
    }

    pub fn invalid_rules(message: impl Into<String>) -> Self {
        Error::InvalidRules {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Marker written into the research table when identifier parsing fails
    pub fn series_marker(&self) -> Option<&'static str> {
        match self {
            Error::UnrecognizedPrefix { .. } => Some("UNRECOGNIZED_PREFIX"),
            Error::MalformedDigits { .. } => Some("MALFORMED_DIGITS"),
            Error::UnknownDigitGroup { .. } => Some("UNKNOWN_DIGIT_GROUP"),
            _ => None,
        }
    }

    /// True for errors that only affect a single part
    pub fn is_per_part(&self) -> bool {
        matches!(
            self,
            Error::UnrecognizedPrefix { .. }
                | Error::MalformedDigits { .. }
                | Error::UnknownDigitGroup { .. }
                | Error::NoMatchingCategory { .. }
        )
    }
}
