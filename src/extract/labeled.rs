use regex::Regex;

use super::{LayoutStrategy, PageText, RawBlock, RawMark};
use crate::config::{ConfigError, LabeledPatterns, LayoutKind};

/// One block per student, opened by the seat line and read line by line.
///
/// ```text
/// Seat No: SEAT001   Name: Jane Doe
/// Math: 80/100
/// Eng = 70
/// Total: 150/200
/// Percentage: 75.00%
/// Result: PASS
/// ```
#[derive(Debug, Clone)]
pub struct LabeledLayout {
    seat: Regex,
    name: Regex,
    subject: Regex,
    total: Regex,
    percentage: Regex,
    result: Regex,
    division: Regex,
    ignore: Regex,
    non_subject: Vec<String>,
}

/// `Roll No.`, `ROLL  no` and `roll no` are the same label.
fn label_key(label: &str) -> String {
    label
        .replace('.', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub(crate) fn compile_pattern(
    field: &str,
    pattern: &str,
    groups: &[&str],
) -> Result<Regex, ConfigError> {
    let re = Regex::new(pattern).map_err(|source| ConfigError::Pattern {
        field: field.to_string(),
        source,
    })?;
    for g in groups {
        if !re.capture_names().flatten().any(|n| n == *g) {
            return Err(ConfigError::Invalid {
                field: field.to_string(),
                message: format!("must have a named group (?P<{}>...)", g),
            });
        }
    }
    Ok(re)
}

impl LabeledLayout {
    pub fn compile(p: &LabeledPatterns) -> Result<Self, ConfigError> {
        Ok(Self {
            seat: compile_pattern("labeled.seat", &p.seat, &["seat"])?,
            name: compile_pattern("labeled.name", &p.name, &["name"])?,
            subject: compile_pattern("labeled.subject", &p.subject, &["subject", "mark"])?,
            total: compile_pattern("labeled.total", &p.total, &["value"])?,
            percentage: compile_pattern("labeled.percentage", &p.percentage, &["value"])?,
            result: compile_pattern("labeled.result", &p.result, &["value"])?,
            division: compile_pattern("labeled.division", &p.division, &["value"])?,
            ignore: compile_pattern("labeled.ignore", &p.ignore, &[])?,
            non_subject: p
                .non_subject_labels
                .iter()
                .map(|l| label_key(l))
                .filter(|k| !k.is_empty())
                .collect(),
        })
    }

    fn value(re: &Regex, line: &str) -> Option<String> {
        re.captures(line)
            .and_then(|c| c.name("value").map(|m| m.as_str().trim().to_string()))
    }

    fn name_on(&self, line: &str) -> Option<String> {
        self.name
            .captures(line)
            .and_then(|c| c.name("name").map(|m| m.as_str().trim().to_string()))
            .filter(|s| !s.is_empty())
    }

    fn classify(&self, line: &str, block: &mut RawBlock) {
        if self.ignore.is_match(line) {
            return;
        }
        if block.name.is_none() {
            if let Some(name) = self.name_on(line) {
                block.name = Some(name);
                return;
            }
        }
        if let Some(c) = self.total.captures(line) {
            block.total = c.name("value").map(|m| m.as_str().to_string());
            block.total_max = c.name("max").map(|m| m.as_str().to_string());
            return;
        }
        if let Some(v) = Self::value(&self.percentage, line) {
            block.percentage = Some(v);
            return;
        }
        if let Some(v) = Self::value(&self.result, line) {
            block.result = Some(v);
            return;
        }
        if let Some(v) = Self::value(&self.division, line) {
            block.division = Some(v);
            return;
        }
        if let Some(c) = self.subject.captures(line) {
            let (Some(subject), Some(mark)) = (c.name("subject"), c.name("mark")) else {
                return;
            };
            if self.non_subject.contains(&label_key(subject.as_str())) {
                return;
            }
            block.subjects.push(RawMark {
                subject: subject.as_str().to_string(),
                mark: mark.as_str().to_string(),
                max: c.name("max").map(|m| m.as_str().to_string()),
            });
        }
    }
}

impl LayoutStrategy for LabeledLayout {
    fn kind(&self) -> LayoutKind {
        LayoutKind::Labeled
    }

    fn segment(&self, pages: &[PageText]) -> Vec<RawBlock> {
        let mut blocks: Vec<RawBlock> = Vec::new();
        let mut current: Option<RawBlock> = None;

        for page in pages {
            for raw in page.text.lines() {
                let line = raw.trim();
                if line.is_empty() {
                    continue;
                }
                if let Some(caps) = self.seat.captures(line) {
                    if let Some(done) = current.take() {
                        blocks.push(done);
                    }
                    let mut block = RawBlock::new(blocks.len(), page.number);
                    block.seat_number = caps.name("seat").map(|m| m.as_str().to_string());
                    block.name = self.name_on(line);
                    current = Some(block);
                    continue;
                }
                // Text before the first seat line is the sheet preamble.
                let Some(block) = current.as_mut() else {
                    continue;
                };
                self.classify(line, block);
            }
        }
        if let Some(done) = current.take() {
            blocks.push(done);
        }
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> LabeledLayout {
        LabeledLayout::compile(&LabeledPatterns::default()).expect("compile")
    }

    fn page(text: &str) -> Vec<PageText> {
        vec![PageText {
            number: 1,
            text: text.to_string(),
        }]
    }

    #[test]
    fn reads_all_labeled_fields() {
        let text = "\
UNIVERSITY OF EXAMPLE
B.Sc. Semester I Results
Seat No: SEAT001   Name: Jane Doe
Math: 80/100
Eng = 70
Computer Science: 65 / 100
Total: 215/300
Percentage: 71.67%
Result: PASS
Class: First
Printed on 12/05/2024
";
        let blocks = layout().segment(&page(text));
        assert_eq!(blocks.len(), 1);
        let b = &blocks[0];
        assert_eq!(b.seat_number.as_deref(), Some("SEAT001"));
        assert_eq!(b.name.as_deref(), Some("Jane Doe"));
        let subjects: Vec<_> = b.subjects.iter().map(|s| s.subject.as_str()).collect();
        assert_eq!(subjects, vec!["Math", "Eng", "Computer Science"]);
        assert_eq!(b.subjects[0].max.as_deref(), Some("100"));
        assert_eq!(b.subjects[1].max, None);
        assert_eq!(b.subjects[2].mark, "65");
        assert_eq!(b.total.as_deref(), Some("215"));
        assert_eq!(b.total_max.as_deref(), Some("300"));
        assert_eq!(b.percentage.as_deref(), Some("71.67%"));
        assert_eq!(b.result.as_deref(), Some("PASS"));
        assert_eq!(b.division.as_deref(), Some("First"));
    }

    #[test]
    fn name_may_follow_on_its_own_line() {
        let blocks = layout().segment(&page("Seat No. 1200\nStudent Name: Ravi  Kumar\nMath: 40\n"));
        assert_eq!(blocks[0].seat_number.as_deref(), Some("1200"));
        assert_eq!(blocks[0].name.as_deref(), Some("Ravi  Kumar"));
        assert_eq!(blocks[0].subjects.len(), 1);
    }

    #[test]
    fn header_row_without_digits_is_not_a_seat() {
        let blocks = layout().segment(&page("Seat No  Name  Marks\nSeat No: 7\nName: X\nMath: 1\n"));
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].seat_number.as_deref(), Some("7"));
        assert_eq!(blocks[0].index, 0);
    }

    #[test]
    fn non_numeric_mark_is_kept_raw() {
        let blocks = layout().segment(&page("Seat No: 9\nName: Y\nMath: AB\n"));
        assert_eq!(blocks[0].subjects[0].mark, "AB");
    }

    #[test]
    fn summary_lines_are_not_subjects() {
        let text = "\
Seat No: 1001
Name: Jane Doe
Roll No.: 4521
Enrolment Number: 2021/CS/88
Semester: III
Math: 80
Eng: 70
Total Credits: 20
SGPA: 8.50
CGPA = 8.1
Grand Total: 150/200
";
        let blocks = layout().segment(&page(text));
        let subjects: Vec<_> = blocks[0].subjects.iter().map(|s| s.subject.as_str()).collect();
        assert_eq!(subjects, vec!["Math", "Eng"]);
        assert_eq!(blocks[0].total.as_deref(), Some("150"));
        assert_eq!(blocks[0].total_max.as_deref(), Some("200"));
    }

    #[test]
    fn non_subject_labels_are_configurable() {
        let mut p = LabeledPatterns::default();
        p.non_subject_labels = vec!["Lab  Batch".to_string()];
        let l = LabeledLayout::compile(&p).expect("compile");
        let blocks = l.segment(&page("Seat No: 5\nName: Z\nLab Batch: 2\nSGPA: 7\nMath: 50\n"));
        let subjects: Vec<_> = blocks[0].subjects.iter().map(|s| s.subject.as_str()).collect();
        assert_eq!(subjects, vec!["SGPA", "Math"]);
    }

    #[test]
    fn pattern_without_required_group_is_rejected() {
        let mut p = LabeledPatterns::default();
        p.seat = r"seat\s*no\s*(\d+)".to_string();
        let e = LabeledLayout::compile(&p).expect_err("missing group");
        assert!(e.to_string().contains("(?P<seat>"));
    }
}
