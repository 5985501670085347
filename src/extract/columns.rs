use regex::Regex;

use super::labeled::compile_pattern;
use super::{LayoutStrategy, PageText, RawBlock, RawMark};
use crate::config::{ColumnPatterns, ConfigError, LayoutKind};

#[derive(Debug, Clone, PartialEq)]
enum Column {
    Subject { name: String, max: Option<String> },
    Total,
    Percentage,
    Result,
    Division,
}

/// A header row names the columns, then one row per student:
///
/// ```text
/// Seat No  Name          MATH  ENG/50  TOTAL  PERCENTAGE  RESULT
/// 1001     Jane Doe      80    35      115    76.67       PASS
/// ```
///
/// The name takes whatever leading tokens the columns do not claim.
#[derive(Debug, Clone)]
pub struct ColumnLayout {
    header: Regex,
    row: Regex,
    total_headers: Vec<String>,
    percentage_headers: Vec<String>,
    result_headers: Vec<String>,
    division_headers: Vec<String>,
}

fn upper_all(v: &[String]) -> Vec<String> {
    v.iter().map(|s| s.trim().to_ascii_uppercase()).collect()
}

/// `MATH`, `MATH/100` or `MATH(100)`.
fn split_subject_header(token: &str) -> (String, Option<String>) {
    if let Some((name, max)) = token.split_once('/') {
        return (name.to_string(), Some(max.to_string()));
    }
    if let Some(open) = token.find('(') {
        if token.ends_with(')') && open > 0 {
            let max = &token[open + 1..token.len() - 1];
            return (token[..open].to_string(), Some(max.to_string()));
        }
    }
    (token.to_string(), None)
}

impl ColumnLayout {
    pub fn compile(p: &ColumnPatterns) -> Result<Self, ConfigError> {
        Ok(Self {
            header: compile_pattern("columns.header", &p.header, &["columns"])?,
            row: compile_pattern("columns.row", &p.row, &["seat", "rest"])?,
            total_headers: upper_all(&p.total_headers),
            percentage_headers: upper_all(&p.percentage_headers),
            result_headers: upper_all(&p.result_headers),
            division_headers: upper_all(&p.division_headers),
        })
    }

    fn parse_header(&self, columns: &str) -> Vec<Column> {
        columns
            .split_whitespace()
            .map(|token| {
                let up = token.to_ascii_uppercase();
                if self.total_headers.contains(&up) {
                    Column::Total
                } else if self.percentage_headers.contains(&up) {
                    Column::Percentage
                } else if self.result_headers.contains(&up) {
                    Column::Result
                } else if self.division_headers.contains(&up) {
                    Column::Division
                } else {
                    let (name, max) = split_subject_header(token);
                    Column::Subject { name, max }
                }
            })
            .collect()
    }

    fn read_row(&self, columns: &[Column], seat: &str, rest: &str, block: &mut RawBlock) {
        block.seat_number = Some(seat.to_string());
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        if tokens.len() <= columns.len() {
            block.error = Some(format!(
                "row has {} values, expected a name and {} columns",
                tokens.len(),
                columns.len()
            ));
            return;
        }
        let split = tokens.len() - columns.len();
        block.name = Some(tokens[..split].join(" "));

        for (col, value) in columns.iter().zip(&tokens[split..]) {
            let value = value.to_string();
            match col {
                Column::Subject { name, max } => {
                    let (mark, row_max) = match value.split_once('/') {
                        Some((m, x)) => (m.to_string(), Some(x.to_string())),
                        None => (value, None),
                    };
                    block.subjects.push(RawMark {
                        subject: name.clone(),
                        mark,
                        max: row_max.or_else(|| max.clone()),
                    });
                }
                Column::Total => match value.split_once('/') {
                    Some((t, x)) => {
                        block.total = Some(t.to_string());
                        block.total_max = Some(x.to_string());
                    }
                    None => block.total = Some(value),
                },
                Column::Percentage => block.percentage = Some(value),
                Column::Result => block.result = Some(value),
                Column::Division => block.division = Some(value),
            }
        }
    }
}

impl LayoutStrategy for ColumnLayout {
    fn kind(&self) -> LayoutKind {
        LayoutKind::Columns
    }

    fn segment(&self, pages: &[PageText]) -> Vec<RawBlock> {
        let mut blocks: Vec<RawBlock> = Vec::new();
        let mut columns: Vec<Column> = Vec::new();

        for page in pages {
            for raw in page.text.lines() {
                let line = raw.trim();
                if line.is_empty() {
                    continue;
                }
                if let Some(caps) = self.header.captures(line) {
                    if let Some(cols) = caps.name("columns") {
                        columns = self.parse_header(cols.as_str());
                    }
                    continue;
                }
                if columns.is_empty() {
                    continue;
                }
                let Some(caps) = self.row.captures(line) else {
                    continue;
                };
                let (Some(seat), Some(rest)) = (caps.name("seat"), caps.name("rest")) else {
                    continue;
                };
                let mut block = RawBlock::new(blocks.len(), page.number);
                self.read_row(&columns, seat.as_str(), rest.as_str(), &mut block);
                blocks.push(block);
            }
        }
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GradingConfig, LayoutConfig};
    use crate::extract::Extractor;
    use crate::model::Status;

    fn layout() -> ColumnLayout {
        ColumnLayout::compile(&ColumnPatterns::default()).expect("compile")
    }

    fn pages(texts: &[&str]) -> Vec<PageText> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| PageText {
                number: i + 1,
                text: t.to_string(),
            })
            .collect()
    }

    #[test]
    fn header_tokens_become_columns() {
        let cols = layout().parse_header("MATH ENG/50 LAB(25) TOTAL % RESULT CLASS");
        assert_eq!(
            cols,
            vec![
                Column::Subject {
                    name: "MATH".into(),
                    max: None
                },
                Column::Subject {
                    name: "ENG".into(),
                    max: Some("50".into())
                },
                Column::Subject {
                    name: "LAB".into(),
                    max: Some("25".into())
                },
                Column::Total,
                Column::Percentage,
                Column::Result,
                Column::Division,
            ]
        );
    }

    #[test]
    fn rows_split_name_from_values() {
        let text = "\
RESULT SHEET 2024
Seat No  Name  MATH  ENG/50  TOTAL  PERCENTAGE  RESULT
1001  Jane  Q  Doe  80  35  115  76.67  PASS
1002  Raj  AB  40  120  30.00  FAIL
";
        let blocks = layout().segment(&pages(&[text]));
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].name.as_deref(), Some("Jane Q Doe"));
        assert_eq!(blocks[0].subjects[1].max.as_deref(), Some("50"));
        assert_eq!(blocks[0].total.as_deref(), Some("115"));
        assert_eq!(blocks[1].subjects[0].mark, "AB");
        assert_eq!(blocks[1].error, None);
    }

    #[test]
    fn short_row_is_marked_malformed() {
        let text = "Seat No Name MATH ENG TOTAL\n1001 80 70 150\n";
        let blocks = layout().segment(&pages(&[text]));
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].error.is_some());
    }

    #[test]
    fn extractor_builds_records_across_pages() {
        let mut cfg = LayoutConfig::default();
        cfg.kind = LayoutKind::Columns;
        let ex = Extractor::from_config(&cfg, &GradingConfig::default()).expect("compile");
        let out = ex.extract_pages(&pages(&[
            "Seat No Name MATH ENG TOTAL RESULT\nSEAT001 Jane Doe 80 70 150 PASS\n",
            "Page 2\nSeat No Name MATH ENG PHY TOTAL RESULT\nSEAT002 Amit Shah 30 60 50 140 FAIL\n",
        ]));
        assert_eq!(out.blocks_found, 2);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].percentage, 75.0);
        assert_eq!(out.records[1].subjects.len(), 3);
        assert_eq!(out.records[1].status, Status::Fail);
        assert!(out.warnings.is_empty());
    }
}
