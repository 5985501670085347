use serde::Serialize;
use std::cmp::Ordering;

use crate::config::GradingConfig;
use crate::model::{subject_union, Division, Status, StudentRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStudent {
    pub rank: usize,
    pub seat_number: String,
    pub name: String,
    pub total_marks: f64,
    pub max_total: f64,
    pub percentage: f64,
    pub status: Status,
    pub division: Division,
}

fn by_merit(a: &StudentRecord, b: &StudentRecord) -> Ordering {
    b.percentage
        .partial_cmp(&a.percentage)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.seat_number.cmp(&b.seat_number))
}

/// Percentage descending, seat number ascending.
pub fn merit_order(records: &[StudentRecord]) -> Vec<&StudentRecord> {
    let mut sorted: Vec<&StudentRecord> = records.iter().collect();
    sorted.sort_by(|a, b| by_merit(a, b));
    sorted
}

/// Merit order with competition ranks: equal percentages share a rank
/// (1, 2, 2, 4).
pub fn rank(records: &[StudentRecord]) -> Vec<RankedStudent> {
    let sorted = merit_order(records);
    let mut out: Vec<RankedStudent> = Vec::with_capacity(sorted.len());
    for (i, r) in sorted.into_iter().enumerate() {
        let rank = match out.last() {
            Some(prev) if prev.percentage == r.percentage => prev.rank,
            _ => i + 1,
        };
        out.push(RankedStudent {
            rank,
            seat_number: r.seat_number.clone(),
            name: r.name.clone(),
            total_marks: r.total_marks,
            max_total: r.max_total,
            percentage: r.percentage,
            status: r.status,
            division: r.division,
        });
    }
    out
}

pub fn top_n(records: &[StudentRecord], n: Option<usize>) -> Vec<RankedStudent> {
    let mut ranked = rank(records);
    if let Some(n) = n {
        ranked.truncate(n);
    }
    ranked
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassFailSummary {
    pub student_count: usize,
    pub pass_count: usize,
    pub fail_count: usize,
    pub pass_rate: f64,
    pub fail_rate: f64,
}

pub fn pass_fail(records: &[StudentRecord]) -> PassFailSummary {
    let pass_count = records.iter().filter(|r| r.status == Status::Pass).count();
    let fail_count = records.len() - pass_count;
    let (pass_rate, fail_rate) = if records.is_empty() {
        (0.0, 0.0)
    } else {
        let p = 100.0 * pass_count as f64 / records.len() as f64;
        (p, 100.0 - p)
    };
    PassFailSummary {
        student_count: records.len(),
        pass_count,
        fail_count,
        pass_rate,
        fail_rate,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DivisionBucket {
    pub division: Division,
    pub count: usize,
    pub percent: f64,
}

/// Every division appears, in band order, even with a zero count.
pub fn divisions(records: &[StudentRecord]) -> Vec<DivisionBucket> {
    Division::ALL
        .iter()
        .map(|d| {
            let count = records.iter().filter(|r| r.division == *d).count();
            let percent = if records.is_empty() {
                0.0
            } else {
                100.0 * count as f64 / records.len() as f64
            };
            DivisionBucket {
                division: *d,
                count,
                percent,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStats {
    pub subject: String,
    pub entrants: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub max_mark: f64,
    pub pass_count: usize,
    pub pass_rate: f64,
}

/// Statistics per subject over the union of subjects; a student only counts
/// as an entrant for subjects on their own sheet.
pub fn subject_stats(records: &[StudentRecord], pass_mark_percent: f64) -> Vec<SubjectStats> {
    subject_union(records)
        .into_iter()
        .map(|subject| {
            let marks: Vec<_> = records
                .iter()
                .filter_map(|r| r.mark_for(&subject))
                .collect();
            let entrants = marks.len();
            let sum: f64 = marks.iter().map(|m| m.mark).sum();
            let min = marks.iter().map(|m| m.mark).fold(f64::INFINITY, f64::min);
            let max = marks.iter().map(|m| m.mark).fold(f64::NEG_INFINITY, f64::max);
            let max_mark = marks.iter().map(|m| m.max_mark).fold(0.0, f64::max);
            let pass_count = marks
                .iter()
                .filter(|m| m.passes(pass_mark_percent))
                .count();
            SubjectStats {
                subject,
                entrants,
                mean: sum / entrants.max(1) as f64,
                min,
                max,
                max_mark,
                pass_count,
                pass_rate: 100.0 * pass_count as f64 / entrants.max(1) as f64,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Partial,
    Exact,
}

impl SearchMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "partial" | "contains" => Some(SearchMode::Partial),
            "exact" => Some(SearchMode::Exact),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Partial => "partial",
            SearchMode::Exact => "exact",
        }
    }
}

fn fold_key(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Case-insensitive match on seat number or name, in document order.
pub fn search<'a>(
    records: &'a [StudentRecord],
    query: &str,
    mode: SearchMode,
) -> Vec<&'a StudentRecord> {
    let q = fold_key(query);
    if q.is_empty() {
        return Vec::new();
    }
    records
        .iter()
        .filter(|r| {
            let seat = fold_key(&r.seat_number);
            let name = fold_key(&r.name);
            match mode {
                SearchMode::Exact => seat == q || name == q,
                SearchMode::Partial => seat.contains(&q) || name.contains(&q),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionBin {
    pub label: String,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

fn fmt_bound(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// `35-49` for `[35, 50)`; the last bin is closed.
fn bin_label(min: f64, max: f64, last: bool) -> String {
    let upper = if !last && max.fract() == 0.0 && max - 1.0 >= min {
        max - 1.0
    } else {
        max
    };
    format!("{}-{}", fmt_bound(min), fmt_bound(upper))
}

/// Five half-open bins cut at the pass mark and the division bands; the last
/// one includes 100.
pub fn percentage_bins(records: &[StudentRecord], grading: &GradingConfig) -> Vec<DistributionBin> {
    let mut edges = [
        0.0,
        grading.pass_mark_percent,
        grading.second_min,
        grading.first_min,
        grading.distinction_min,
        100.0,
    ];
    edges.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let bins = edges.len() - 1;
    edges
        .windows(2)
        .enumerate()
        .map(|(i, w)| {
            let (min, max) = (w[0], w[1]);
            let last = i + 1 == bins;
            let count = records
                .iter()
                .map(|r| r.percentage)
                .filter(|p| *p >= min && (*p < max || (last && *p <= max)))
                .count();
            DistributionBin {
                label: bin_label(min, max, last),
                min,
                max,
                count,
            }
        })
        .collect()
}

fn compute_median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[(n / 2) - 1] + sorted[n / 2]) / 2.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardKpis {
    pub student_count: usize,
    pub subject_count: usize,
    pub average_percentage: Option<f64>,
    pub median_percentage: Option<f64>,
    pub highest_percentage: Option<f64>,
    pub lowest_percentage: Option<f64>,
    pub pass_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardModel {
    pub kpis: DashboardKpis,
    pub bins: Vec<DistributionBin>,
    pub top: Vec<RankedStudent>,
    pub bottom: Vec<RankedStudent>,
}

pub fn dashboard(
    records: &[StudentRecord],
    top_bottom: usize,
    grading: &GradingConfig,
) -> DashboardModel {
    let pcts: Vec<f64> = records.iter().map(|r| r.percentage).collect();
    let average_percentage = if pcts.is_empty() {
        None
    } else {
        Some(pcts.iter().sum::<f64>() / pcts.len() as f64)
    };
    let ranked = rank(records);
    let top = ranked.iter().take(top_bottom).cloned().collect::<Vec<_>>();
    let bottom = ranked
        .iter()
        .rev()
        .take(top_bottom)
        .cloned()
        .collect::<Vec<_>>();

    DashboardModel {
        kpis: DashboardKpis {
            student_count: records.len(),
            subject_count: subject_union(records).len(),
            average_percentage,
            median_percentage: compute_median(&pcts),
            highest_percentage: ranked.first().map(|r| r.percentage),
            lowest_percentage: ranked.last().map(|r| r.percentage),
            pass_rate: pass_fail(records).pass_rate,
        },
        bins: percentage_bins(records, grading),
        top,
        bottom,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRow {
    pub seat_number: String,
    pub name: String,
    pub percentage: f64,
    pub status: Status,
}

/// Leading rows in document order, for the post-upload preview.
pub fn sample(records: &[StudentRecord], n: usize) -> Vec<SampleRow> {
    records
        .iter()
        .take(n)
        .map(|r| SampleRow {
            seat_number: r.seat_number.clone(),
            name: r.name.clone(),
            percentage: r.percentage,
            status: r.status,
        })
        .collect()
}
