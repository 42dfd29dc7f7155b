// 📝 Discrepancy Report - One tagged line per issue, or the whole report as JSON

use crate::reconciliation::{Discrepancy, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("unknown report format '{}' (expected text or json)", other)),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Text => f.write_str("text"),
            ReportFormat::Json => f.write_str("json"),
        }
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub generated_at: DateTime<Utc>,
    /// Names of the checks that ran, e.g. "product_list"
    pub checks: Vec<String>,
    pub discrepancies: Vec<Discrepancy>,
}

impl ReconciliationReport {
    pub fn new() -> Self {
        ReconciliationReport {
            generated_at: Utc::now(),
            checks: Vec::new(),
            discrepancies: Vec::new(),
        }
    }

    /// Record a finished check and its findings
    pub fn add_check(&mut self, name: &str, found: Vec<Discrepancy>) {
        self.checks.push(name.to_string());
        self.discrepancies.extend(found);
    }

    pub fn mismatch_count(&self) -> usize {
        self.discrepancies.iter().filter(|d| d.is_mismatch()).count()
    }

    pub fn info_count(&self) -> usize {
        self.discrepancies
            .iter()
            .filter(|d| d.severity == Severity::Info)
            .count()
    }

    pub fn has_mismatches(&self) -> bool {
        self.mismatch_count() > 0
    }

    /// Occurrences of each tag, sorted by tag
    pub fn counts_by_tag(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for d in &self.discrepancies {
            *counts.entry(d.tag()).or_insert(0) += 1;
        }
        counts
    }

    pub fn summary(&self) -> String {
        if self.discrepancies.is_empty() {
            return "All checks passed".to_string();
        }
        format!(
            "{} mismatches, {} info ({} checks)",
            self.mismatch_count(),
            self.info_count(),
            self.checks.len()
        )
    }

    /// Discrepancy lines followed by the summary line
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for d in &self.discrepancies {
            out.push_str(&d.to_string());
            out.push('\n');
        }
        out.push_str(&self.summary());
        out.push('\n');
        out
    }

    pub fn render_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render(&self, format: ReportFormat) -> serde_json::Result<String> {
        match format {
            ReportFormat::Text => Ok(self.render_text()),
            ReportFormat::Json => self.render_json(),
        }
    }

    /// 0 when nothing contradicts, 2 when any mismatch was found
    pub fn exit_code(&self) -> i32 {
        if self.has_mismatches() {
            2
        } else {
            0
        }
    }
}

impl Default for ReconciliationReport {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
