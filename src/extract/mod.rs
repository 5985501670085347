//! PDF result sheet extraction.
//!
//! Text comes out of the PDF page by page, a [`LayoutStrategy`] cuts it into
//! one raw block per student, and the record builder turns each block into a
//! [`StudentRecord`]. A block that cannot be built is skipped and reported;
//! it never aborts the batch.

mod columns;
mod labeled;
mod pdf_text;
mod record;

pub use columns::ColumnLayout;
pub use labeled::LabeledLayout;
pub use pdf_text::{read_file, read_pages, PageText};
pub use record::build_record;

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::{ConfigError, GradingConfig, LayoutConfig, LayoutKind};
use crate::model::StudentRecord;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("not a readable PDF: {0}")]
    Unreadable(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMark {
    pub subject: String,
    pub mark: String,
    pub max: Option<String>,
}

/// Fields lifted from one student block, still as printed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBlock {
    pub index: usize,
    pub page: usize,
    pub seat_number: Option<String>,
    pub name: Option<String>,
    pub subjects: Vec<RawMark>,
    pub total: Option<String>,
    pub total_max: Option<String>,
    pub percentage: Option<String>,
    pub result: Option<String>,
    pub division: Option<String>,
    /// Set by the layout when the block shape itself is wrong.
    pub error: Option<String>,
}

impl RawBlock {
    pub fn new(index: usize, page: usize) -> Self {
        Self {
            index,
            page,
            ..Self::default()
        }
    }
}

pub trait LayoutStrategy {
    fn kind(&self) -> LayoutKind;

    /// Splits document text into student blocks in order of appearance.
    fn segment(&self, pages: &[PageText]) -> Vec<RawBlock>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedBlock {
    pub block: usize,
    pub page: usize,
    pub seat_number: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationWarning {
    pub seat_number: String,
    pub field: String,
    pub printed: String,
    pub computed: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum Diagnostic {
    NoDataFound { pages: usize },
    PartialParseError(SkippedBlock),
    ReconciliationMismatch(ReconciliationWarning),
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    #[serde(skip)]
    pub records: Vec<StudentRecord>,
    pub pages: usize,
    pub blocks_found: usize,
    pub skipped: Vec<SkippedBlock>,
    pub warnings: Vec<ReconciliationWarning>,
}

impl Extraction {
    pub fn has_records(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        if self.records.is_empty() {
            out.push(Diagnostic::NoDataFound { pages: self.pages });
        }
        out.extend(self.skipped.iter().cloned().map(Diagnostic::PartialParseError));
        out.extend(
            self.warnings
                .iter()
                .cloned()
                .map(Diagnostic::ReconciliationMismatch),
        );
        out
    }
}

pub struct Extractor {
    strategy: Box<dyn LayoutStrategy>,
    grading: GradingConfig,
}

impl Extractor {
    pub fn new(strategy: Box<dyn LayoutStrategy>, grading: GradingConfig) -> Self {
        Self { strategy, grading }
    }

    pub fn from_config(layout: &LayoutConfig, grading: &GradingConfig) -> Result<Self, ConfigError> {
        let strategy: Box<dyn LayoutStrategy> = match layout.kind {
            LayoutKind::Labeled => Box::new(LabeledLayout::compile(&layout.labeled)?),
            LayoutKind::Columns => Box::new(ColumnLayout::compile(&layout.columns)?),
        };
        Ok(Self::new(strategy, grading.clone()))
    }

    pub fn kind(&self) -> LayoutKind {
        self.strategy.kind()
    }

    pub fn extract(&self, bytes: &[u8]) -> Result<Extraction, ExtractError> {
        let pages = read_pages(bytes)?;
        Ok(self.extract_pages(&pages))
    }

    pub fn extract_pages(&self, pages: &[PageText]) -> Extraction {
        let blocks = self.strategy.segment(pages);
        let mut out = Extraction {
            pages: pages.len(),
            blocks_found: blocks.len(),
            ..Extraction::default()
        };
        let mut seen: HashSet<String> = HashSet::new();

        for block in &blocks {
            let skip = |reason: String| SkippedBlock {
                block: block.index,
                page: block.page,
                seat_number: block.seat_number.clone(),
                reason,
            };
            match build_record(block, &self.grading) {
                Ok((record, warnings)) => {
                    if !seen.insert(record.seat_number.clone()) {
                        out.skipped.push(skip(format!(
                            "duplicate seat number {}",
                            record.seat_number
                        )));
                        continue;
                    }
                    for w in &warnings {
                        debug!(
                            "seat {}: printed {} {} differs from computed {}",
                            w.seat_number, w.field, w.printed, w.computed
                        );
                    }
                    out.warnings.extend(warnings);
                    out.records.push(record);
                }
                Err(reason) => out.skipped.push(skip(reason)),
            }
        }

        for s in &out.skipped {
            warn!(
                "skipped block {} on page {} ({}): {}",
                s.block,
                s.page,
                s.seat_number.as_deref().unwrap_or("no seat"),
                s.reason
            );
        }
        info!(
            "{} layout: {} pages, {} blocks, {} records, {} skipped, {} warnings",
            self.strategy.kind().as_str(),
            out.pages,
            out.blocks_found,
            out.records.len(),
            out.skipped.len(),
            out.warnings.len()
        );
        out
    }
}
