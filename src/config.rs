use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::extract::{ColumnLayout, LabeledLayout};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{field} is not a valid pattern: {source}")]
    Pattern {
        field: String,
        source: regex::Error,
    },
    #[error("{field} {message}")]
    Invalid { field: String, message: String },
    #[error("unknown section: {0}")]
    UnknownSection(String),
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    #[default]
    Labeled,
    Columns,
}

impl LayoutKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LayoutKind::Labeled => "labeled",
            LayoutKind::Columns => "columns",
        }
    }
}

/// Line patterns for documents that print one labeled block per student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct LabeledPatterns {
    pub seat: String,
    pub name: String,
    pub subject: String,
    pub total: String,
    pub percentage: String,
    pub result: String,
    pub division: String,
    pub ignore: String,
    /// Labels that look like `Label: value` but are never subjects. Matched
    /// case-insensitively, ignoring dots and repeated spaces.
    pub non_subject_labels: Vec<String>,
}

impl Default for LabeledPatterns {
    fn default() -> Self {
        Self {
            seat: r"(?i)\bseat\s*(?:no|number)\.?\s*[:\-]?\s*(?P<seat>[A-Z]*\d[A-Z0-9/\-]*)"
                .to_string(),
            name: r"(?i)\bname\s*[:\-]\s*(?P<name>.+?)\s*$".to_string(),
            subject: r"^\s*(?P<subject>[A-Za-z][A-Za-z0-9 .&()\-]*?)\s*[:=]\s*(?P<mark>[^\s/]+)(?:\s*/\s*(?P<max>\S+))?\s*$"
                .to_string(),
            total: r"(?i)^\s*(?:grand\s+)?total(?:\s+marks)?\s*[:=]\s*(?P<value>[^\s/]+)(?:\s*/\s*(?P<max>\S+))?\s*$"
                .to_string(),
            percentage: r"(?i)^\s*(?:percentage|percent|%)\s*[:=]\s*(?P<value>\S+)\s*$".to_string(),
            result: r"(?i)^\s*(?:result|status)\s*[:=]\s*(?P<value>.+?)\s*$".to_string(),
            division: r"(?i)^\s*(?:division|class)\s*[:=]\s*(?P<value>.+?)\s*$".to_string(),
            ignore: r"(?i)^\s*(?:page\s+\d+(?:\s+of\s+\d+)?|date\s*[:=].*|printed\s+on.*)\s*$"
                .to_string(),
            non_subject_labels: [
                "gpa",
                "sgpa",
                "cgpa",
                "roll no",
                "roll number",
                "enrolment no",
                "enrollment no",
                "enrolment number",
                "enrollment number",
                "enrol no",
                "prn",
                "semester",
                "sem",
                "credits",
                "total credits",
                "credits earned",
                "grand total",
                "year",
                "exam year",
                "attempt",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Patterns for documents that print a header row and one row per student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ColumnPatterns {
    pub header: String,
    pub row: String,
    pub total_headers: Vec<String>,
    pub percentage_headers: Vec<String>,
    pub result_headers: Vec<String>,
    pub division_headers: Vec<String>,
}

impl Default for ColumnPatterns {
    fn default() -> Self {
        Self {
            header: r"(?i)^\s*seat\s*(?:no|number)\.?\s+name\s+(?P<columns>.+?)\s*$".to_string(),
            row: r"^\s*(?P<seat>[A-Za-z]{0,8}\d{2,}[A-Za-z0-9]*)\s+(?P<rest>.+?)\s*$".to_string(),
            total_headers: vec!["TOTAL".into(), "TOT".into()],
            percentage_headers: vec![
                "PERCENTAGE".into(),
                "PERCENT".into(),
                "PCT".into(),
                "%".into(),
            ],
            result_headers: vec!["RESULT".into(), "STATUS".into()],
            division_headers: vec!["DIVISION".into(), "CLASS".into(), "DIV".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct LayoutConfig {
    pub kind: LayoutKind,
    pub labeled: LabeledPatterns,
    pub columns: ColumnPatterns,
}

impl LayoutConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        LabeledLayout::compile(&self.labeled)?;
        ColumnLayout::compile(&self.columns)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct GradingConfig {
    pub pass_mark_percent: f64,
    pub default_max_mark: f64,
    pub distinction_min: f64,
    pub first_min: f64,
    pub second_min: f64,
    pub reconcile_tolerance: f64,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            pass_mark_percent: 35.0,
            default_max_mark: 100.0,
            distinction_min: 75.0,
            first_min: 60.0,
            second_min: 50.0,
            reconcile_tolerance: 0.5,
        }
    }
}

impl GradingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pct = |field: &str, v: f64| {
            if v.is_finite() && (0.0..=100.0).contains(&v) {
                Ok(())
            } else {
                Err(ConfigError::invalid(field, "must be in 0..=100"))
            }
        };
        pct("passMarkPercent", self.pass_mark_percent)?;
        pct("distinctionMin", self.distinction_min)?;
        pct("firstMin", self.first_min)?;
        pct("secondMin", self.second_min)?;
        if !(self.default_max_mark.is_finite() && self.default_max_mark > 0.0) {
            return Err(ConfigError::invalid("defaultMaxMark", "must be > 0"));
        }
        if !(self.reconcile_tolerance.is_finite() && self.reconcile_tolerance >= 0.0) {
            return Err(ConfigError::invalid("reconcileTolerance", "must be >= 0"));
        }
        if self.second_min > self.first_min || self.first_min > self.distinction_min {
            return Err(ConfigError::invalid(
                "divisionBands",
                "must satisfy secondMin <= firstMin <= distinctionMin",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ReportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xlsx" | "excel" => Some(ReportFormat::Xlsx),
            "csv" => Some(ReportFormat::Csv),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReportFormat::Xlsx => "xlsx",
            ReportFormat::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectOrder {
    #[default]
    Appearance,
    Alphabetical,
}

impl SubjectOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "appearance" => Some(SubjectOrder::Appearance),
            "alphabetical" | "sorted" => Some(SubjectOrder::Alphabetical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ReportConfig {
    pub default_format: ReportFormat,
    pub subject_order: SubjectOrder,
    pub sheet_name: String,
    pub top_n: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            default_format: ReportFormat::Xlsx,
            subject_order: SubjectOrder::Appearance,
            sheet_name: "Results".to_string(),
            top_n: 10,
        }
    }
}

impl ReportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = self.sheet_name.trim();
        if name.is_empty() || name.chars().count() > 31 {
            return Err(ConfigError::invalid("sheetName", "length must be 1..=31"));
        }
        if name.contains(['[', ']', ':', '*', '?', '/', '\\']) {
            return Err(ConfigError::invalid(
                "sheetName",
                "must not contain any of [ ] : * ? / \\",
            ));
        }
        if !(1..=1000).contains(&self.top_n) {
            return Err(ConfigError::invalid("topN", "must be in 1..=1000"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ResultdConfig {
    pub layout: LayoutConfig,
    pub grading: GradingConfig,
    pub report: ReportConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    Layout,
    Grading,
    Report,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Layout, Section::Grading, Section::Report];

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "layout" => Ok(Section::Layout),
            "grading" => Ok(Section::Grading),
            "report" => Ok(Section::Report),
            other => Err(ConfigError::UnknownSection(other.to_string())),
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Section::Layout => "layout",
            Section::Grading => "grading",
            Section::Report => "report",
        }
    }
}

impl ResultdConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: ResultdConfig = serde_json::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.layout.validate()?;
        self.grading.validate()?;
        self.report.validate()
    }

    pub fn section_json(&self, section: Section) -> Value {
        let v = match section {
            Section::Layout => serde_json::to_value(&self.layout),
            Section::Grading => serde_json::to_value(&self.grading),
            Section::Report => serde_json::to_value(&self.report),
        };
        v.unwrap_or(Value::Null)
    }

    /// Deep-merges `patch` into one section. Nothing changes unless the merged
    /// section deserializes and validates.
    pub fn apply_patch(
        &mut self,
        section: Section,
        patch: &Map<String, Value>,
    ) -> Result<Value, ConfigError> {
        let mut current = self.section_json(section);
        merge_json(&mut current, patch);
        match section {
            Section::Layout => {
                let next: LayoutConfig = serde_json::from_value(current)?;
                next.validate()?;
                self.layout = next;
            }
            Section::Grading => {
                let next: GradingConfig = serde_json::from_value(current)?;
                next.validate()?;
                self.grading = next;
            }
            Section::Report => {
                let next: ReportConfig = serde_json::from_value(current)?;
                next.validate()?;
                self.report = next;
            }
        }
        Ok(self.section_json(section))
    }
}

fn merge_json(target: &mut Value, patch: &Map<String, Value>) {
    let Some(obj) = target.as_object_mut() else {
        *target = Value::Object(patch.clone());
        return;
    };
    for (k, v) in patch {
        let both_objects = obj.get(k).map(Value::is_object).unwrap_or(false) && v.is_object();
        if !both_objects {
            obj.insert(k.clone(), v.clone());
            continue;
        }
        if let (Some(existing), Value::Object(inner)) = (obj.get_mut(k), v) {
            merge_json(existing, inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_validate() {
        ResultdConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn missing_keys_take_defaults() {
        let cfg: ResultdConfig =
            serde_json::from_value(json!({ "grading": { "passMarkPercent": 40 } })).expect("parse");
        assert_eq!(cfg.grading.pass_mark_percent, 40.0);
        assert_eq!(cfg.grading.default_max_mark, 100.0);
        assert_eq!(cfg.layout.kind, LayoutKind::Labeled);
        assert_eq!(cfg.report.sheet_name, "Results");
    }

    #[test]
    fn patch_merges_nested_layout_fields() {
        let mut cfg = ResultdConfig::default();
        let patch = json!({ "kind": "columns", "columns": { "totalHeaders": ["GT"] } });
        let merged = cfg
            .apply_patch(Section::Layout, patch.as_object().expect("object"))
            .expect("apply");
        assert_eq!(cfg.layout.kind, LayoutKind::Columns);
        assert_eq!(cfg.layout.columns.total_headers, vec!["GT".to_string()]);
        assert_eq!(cfg.layout.columns.result_headers[0], "RESULT");
        assert_eq!(merged["kind"], "columns");
    }

    #[test]
    fn bad_patch_leaves_config_untouched() {
        let mut cfg = ResultdConfig::default();
        let bad_regex = json!({ "labeled": { "seat": "(unclosed" } });
        let e = cfg
            .apply_patch(Section::Layout, bad_regex.as_object().expect("object"))
            .expect_err("bad regex");
        assert!(matches!(e, ConfigError::Pattern { .. }));
        assert_eq!(cfg.layout, LayoutConfig::default());

        let unknown = json!({ "passMark": 40 });
        assert!(cfg
            .apply_patch(Section::Grading, unknown.as_object().expect("object"))
            .is_err());

        let bands = json!({ "firstMin": 80 });
        assert!(cfg
            .apply_patch(Section::Grading, bands.as_object().expect("object"))
            .is_err());
        assert_eq!(cfg.grading, GradingConfig::default());
    }

    #[test]
    fn report_sheet_name_rules() {
        let mut cfg = ResultdConfig::default();
        let bad = json!({ "sheetName": "a/b" });
        assert!(cfg
            .apply_patch(Section::Report, bad.as_object().expect("object"))
            .is_err());
        let good = json!({ "sheetName": "Semester 1", "defaultFormat": "csv" });
        cfg.apply_patch(Section::Report, good.as_object().expect("object"))
            .expect("apply");
        assert_eq!(cfg.report.default_format, ReportFormat::Csv);
    }
}
