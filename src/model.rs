use serde::{Deserialize, Serialize};

use crate::config::GradingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pass,
    Fail,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
        }
    }

    /// Reads a printed result cell. University sheets use several spellings.
    pub fn parse(s: &str) -> Option<Self> {
        let t = s.trim().trim_end_matches('.').to_ascii_uppercase();
        match t.as_str() {
            "PASS" | "PASSES" | "PASSED" | "P" | "SUCCESSFUL" => Some(Status::Pass),
            "FAIL" | "FAILS" | "FAILED" | "F" | "UNSUCCESSFUL" | "ATKT" => Some(Status::Fail),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Division {
    Distinction,
    First,
    Second,
    Third,
    Fail,
}

impl Division {
    pub const ALL: [Division; 5] = [
        Division::Distinction,
        Division::First,
        Division::Second,
        Division::Third,
        Division::Fail,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Division::Distinction => "DISTINCTION",
            Division::First => "FIRST",
            Division::Second => "SECOND",
            Division::Third => "THIRD",
            Division::Fail => "FAIL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let t = s.trim().to_ascii_uppercase();
        let t = t
            .trim_end_matches(" CLASS")
            .trim_end_matches(" DIVISION")
            .trim();
        match t {
            "DISTINCTION" | "DIST" => Some(Division::Distinction),
            "FIRST" | "I" | "1ST" => Some(Division::First),
            "SECOND" | "II" | "2ND" => Some(Division::Second),
            "THIRD" | "III" | "3RD" | "PASS" => Some(Division::Third),
            "FAIL" | "FAILS" | "F" => Some(Division::Fail),
            _ => None,
        }
    }

    /// Band lookup. A failing student is always `Fail` regardless of percentage.
    pub fn from_percentage(percentage: f64, status: Status, grading: &GradingConfig) -> Self {
        if status == Status::Fail {
            return Division::Fail;
        }
        if percentage >= grading.distinction_min {
            Division::Distinction
        } else if percentage >= grading.first_min {
            Division::First
        } else if percentage >= grading.second_min {
            Division::Second
        } else {
            Division::Third
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMark {
    pub subject: String,
    pub mark: f64,
    pub max_mark: f64,
}

impl SubjectMark {
    pub fn passes(&self, pass_mark_percent: f64) -> bool {
        self.mark + 1e-9 >= self.max_mark * pass_mark_percent / 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub seat_number: String,
    pub name: String,
    pub subjects: Vec<SubjectMark>,
    pub total_marks: f64,
    pub max_total: f64,
    pub percentage: f64,
    pub status: Status,
    pub division: Division,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub printed_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unparsed_fields: Vec<String>,
}

impl StudentRecord {
    pub fn mark_for(&self, subject: &str) -> Option<&SubjectMark> {
        self.subjects.iter().find(|s| s.subject == subject)
    }
}

/// One ingested result document. Replaced wholesale on the next ingestion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: String,
    pub fingerprint: String,
    pub source_name: String,
    pub ingested_at: String,
    pub layout_kind: String,
    pub grading: GradingConfig,
    #[serde(skip)]
    pub records: Vec<StudentRecord>,
    pub skipped_count: usize,
    pub warning_count: usize,
}

impl Dataset {
    /// Union of subject keys in order of first appearance.
    pub fn subjects(&self) -> Vec<String> {
        subject_union(&self.records)
    }
}

pub fn subject_union<'a>(records: impl IntoIterator<Item = &'a StudentRecord>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for r in records {
        for s in &r.subjects {
            if !out.iter().any(|x| x == &s.subject) {
                out.push(s.subject.clone());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_accepts_common_spellings() {
        assert_eq!(Status::parse("pass"), Some(Status::Pass));
        assert_eq!(Status::parse(" FAILS "), Some(Status::Fail));
        assert_eq!(Status::parse("ATKT"), Some(Status::Fail));
        assert_eq!(Status::parse("absent"), None);
    }

    #[test]
    fn division_bands_follow_grading() {
        let g = GradingConfig::default();
        assert_eq!(
            Division::from_percentage(80.0, Status::Pass, &g),
            Division::Distinction
        );
        assert_eq!(Division::from_percentage(75.0, Status::Pass, &g), Division::Distinction);
        assert_eq!(Division::from_percentage(60.0, Status::Pass, &g), Division::First);
        assert_eq!(Division::from_percentage(59.99, Status::Pass, &g), Division::Second);
        assert_eq!(Division::from_percentage(40.0, Status::Pass, &g), Division::Third);
        assert_eq!(Division::from_percentage(90.0, Status::Fail, &g), Division::Fail);
        assert_eq!(Division::parse("First Class"), Some(Division::First));
        assert_eq!(Division::parse("II"), Some(Division::Second));
    }

    #[test]
    fn subject_union_keeps_first_appearance_order() {
        let mk = |seat: &str, subs: &[&str]| StudentRecord {
            seat_number: seat.to_string(),
            name: seat.to_string(),
            subjects: subs
                .iter()
                .map(|s| SubjectMark {
                    subject: s.to_string(),
                    mark: 50.0,
                    max_mark: 100.0,
                })
                .collect(),
            total_marks: 0.0,
            max_total: 0.0,
            percentage: 0.0,
            status: Status::Pass,
            division: Division::Third,
            printed_fields: Vec::new(),
            unparsed_fields: Vec::new(),
        };
        let records = vec![mk("A", &["Math", "Eng"]), mk("B", &["Eng", "Phy"])];
        assert_eq!(subject_union(&records), vec!["Math", "Eng", "Phy"]);
    }
}
