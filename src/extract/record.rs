use super::{RawBlock, ReconciliationWarning};
use crate::config::GradingConfig;
use crate::model::{Division, Status, StudentRecord, SubjectMark};

/// Strips whitespace and decoration (`%`, `*`, `,`, `#`) and parses a
/// non-negative finite number.
pub fn normalize_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '%' | '*' | ',' | '#'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let v = cleaned.parse::<f64>().ok()?;
    (v.is_finite() && v >= 0.0).then_some(v)
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn fmt_num(x: f64) -> String {
    if x.fract() == 0.0 {
        format!("{}", x as i64)
    } else {
        format!("{:.2}", x)
    }
}

/// Builds one record from a raw block. `Err` carries the skip reason.
pub fn build_record(
    raw: &RawBlock,
    grading: &GradingConfig,
) -> Result<(StudentRecord, Vec<ReconciliationWarning>), String> {
    if let Some(e) = &raw.error {
        return Err(e.clone());
    }
    let seat_number = raw
        .seat_number
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "missing seat number".to_string())?
        .to_string();
    let name = raw
        .name
        .as_deref()
        .map(collapse_ws)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "missing name".to_string())?;
    if raw.subjects.is_empty() {
        return Err("no subject marks".to_string());
    }

    let mut subjects: Vec<SubjectMark> = Vec::with_capacity(raw.subjects.len());
    for m in &raw.subjects {
        let subject = collapse_ws(&m.subject);
        if subjects.iter().any(|s| s.subject == subject) {
            return Err(format!("subject {} appears twice", subject));
        }
        let mark = normalize_number(&m.mark)
            .ok_or_else(|| format!("non-numeric mark {:?} for {}", m.mark.trim(), subject))?;
        let max_mark = match m.max.as_deref() {
            Some(s) => normalize_number(s)
                .filter(|v| *v > 0.0)
                .ok_or_else(|| format!("bad maximum {:?} for {}", s.trim(), subject))?,
            None => grading.default_max_mark,
        };
        if mark > max_mark + 1e-9 {
            return Err(format!(
                "mark {} exceeds maximum {} for {}",
                fmt_num(mark),
                fmt_num(max_mark),
                subject
            ));
        }
        subjects.push(SubjectMark {
            subject,
            mark,
            max_mark,
        });
    }

    let tol = grading.reconcile_tolerance;
    let mut warnings = Vec::new();
    let mut printed_fields = Vec::new();
    let mut unparsed_fields = Vec::new();
    let mut mismatch = |field: &str, printed: String, computed: String| {
        warnings.push(ReconciliationWarning {
            seat_number: seat_number.clone(),
            field: field.to_string(),
            printed,
            computed,
        });
    };

    let computed_total: f64 = subjects.iter().map(|s| s.mark).sum();
    let computed_max: f64 = subjects.iter().map(|s| s.max_mark).sum();

    let mut total_marks = computed_total;
    if let Some(printed) = raw.total.as_deref() {
        match normalize_number(printed) {
            Some(v) => {
                printed_fields.push("totalMarks".to_string());
                if (v - computed_total).abs() > tol {
                    mismatch("totalMarks", fmt_num(v), fmt_num(computed_total));
                }
                total_marks = v;
            }
            None => unparsed_fields.push("totalMarks".to_string()),
        }
    }
    let mut max_total = computed_max;
    if let Some(printed) = raw.total_max.as_deref() {
        match normalize_number(printed).filter(|v| *v > 0.0) {
            Some(v) => {
                printed_fields.push("maxTotal".to_string());
                if (v - computed_max).abs() > tol {
                    mismatch("maxTotal", fmt_num(v), fmt_num(computed_max));
                }
                max_total = v;
            }
            None => unparsed_fields.push("maxTotal".to_string()),
        }
    }

    let computed_pct = if max_total > 0.0 {
        round2(100.0 * total_marks / max_total)
    } else {
        0.0
    };
    let mut percentage = computed_pct;
    if let Some(printed) = raw.percentage.as_deref() {
        match normalize_number(printed).filter(|v| *v <= 100.0) {
            Some(v) => {
                printed_fields.push("percentage".to_string());
                if (v - computed_pct).abs() > tol {
                    mismatch("percentage", fmt_num(v), fmt_num(computed_pct));
                }
                percentage = v;
            }
            None => unparsed_fields.push("percentage".to_string()),
        }
    }
    if !(0.0..=100.0).contains(&percentage) {
        return Err(format!("percentage {} outside 0..=100", fmt_num(percentage)));
    }

    let derived_status = if subjects
        .iter()
        .all(|s| s.passes(grading.pass_mark_percent))
    {
        Status::Pass
    } else {
        Status::Fail
    };
    let mut status = derived_status;
    if let Some(printed) = raw.result.as_deref() {
        match Status::parse(printed) {
            Some(v) => {
                printed_fields.push("status".to_string());
                if v != derived_status {
                    mismatch(
                        "status",
                        v.as_str().to_string(),
                        derived_status.as_str().to_string(),
                    );
                }
                status = v;
            }
            None => unparsed_fields.push("status".to_string()),
        }
    }

    let derived_division = Division::from_percentage(percentage, status, grading);
    let mut division = derived_division;
    if let Some(printed) = raw.division.as_deref() {
        match Division::parse(printed) {
            Some(v) => {
                printed_fields.push("division".to_string());
                if v != derived_division {
                    mismatch(
                        "division",
                        v.as_str().to_string(),
                        derived_division.as_str().to_string(),
                    );
                }
                division = v;
            }
            None => unparsed_fields.push("division".to_string()),
        }
    }

    Ok((
        StudentRecord {
            seat_number,
            name,
            subjects,
            total_marks,
            max_total,
            percentage,
            status,
            division,
            printed_fields,
            unparsed_fields,
        },
        warnings,
    ))
}
