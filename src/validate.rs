//! Business-rule validation for grade entries.
//!
//! Validation findings are data, not errors: every rule is evaluated (no
//! short-circuit) so a caller sees all violations at once, and warnings are
//! informational only. The message strings are user-visible and locked by
//! tests.

use std::collections::HashSet;

use serde::Serialize;

use crate::model::{EntryKey, GradeEntry, GradePeriod};

/// Uniform result shape for every validation variant.
/// Invariant: `is_valid == errors.is_empty()`; warnings never affect it.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn finish(errors: Vec<String>, warnings: Vec<String>) -> Self {
        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

fn check_score_bounds(score: f64, max_score: f64, errors: &mut Vec<String>) {
    if score < 0.0 {
        errors.push("Score cannot be negative".to_string());
    }
    if score > max_score {
        errors.push("Score cannot exceed maximum score".to_string());
    }
    if score > 100.0 {
        errors.push("Score cannot exceed 100".to_string());
    }
    if max_score <= 0.0 {
        errors.push("Maximum score must be greater than 0".to_string());
    }
    if max_score > 100.0 {
        errors.push("Maximum score cannot exceed 100".to_string());
    }
}

/// Full validation of one authoritative grade entry.
pub fn validate_grade(entry: &GradeEntry) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    check_score_bounds(entry.score, entry.max_score, &mut errors);

    // The stated percentage must agree with the raw score. Division as-is:
    // a 0/0 NaN comparison is false and raises nothing, matching the source.
    let calculated = (entry.score / entry.max_score) * 100.0;
    if (calculated - entry.percentage).abs() > 0.1 {
        errors.push("Percentage calculation mismatch".to_string());
    }

    let required: [(&str, &str); 5] = [
        (&entry.student_id, "Student ID is required"),
        (&entry.subject_id, "Subject ID is required"),
        (&entry.teacher_id, "Teacher ID is required"),
        (&entry.student_name, "Student name is required"),
        (&entry.subject_name, "Subject name is required"),
    ];
    for (value, message) in required {
        if value.trim().is_empty() {
            errors.push(message.to_string());
        }
    }

    if entry.score < 50.0 && entry.percentage < 50.0 {
        warnings.push("Grade is below passing threshold".to_string());
    }
    if entry.percentage >= 90.0 {
        warnings.push("Excellent performance!".to_string());
    }

    ValidationReport::finish(errors, warnings)
}

/// Raw-field validation used before an entry record exists. The period is
/// required here; the batch-level submission check treats missing periods as
/// a warning instead, and that asymmetry is intentional.
pub fn validate_grade_input(
    score: f64,
    max_score: f64,
    grade_period: Option<GradePeriod>,
) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    check_score_bounds(score, max_score, &mut errors);

    if grade_period.is_none() {
        errors.push("Grade period is required".to_string());
    }

    let percentage = if max_score > 0.0 {
        (score / max_score) * 100.0
    } else {
        0.0
    };
    if percentage < 50.0 {
        warnings.push("Grade is below passing threshold".to_string());
    }
    if percentage >= 90.0 {
        warnings.push("Excellent performance!".to_string());
    }

    ValidationReport::finish(errors, warnings)
}

/// Batch validation. Per-entry findings are namespaced by 1-based row number
/// so the caller can map them back to input rows; duplicate identity tuples
/// within the batch are an error of their own and never suppress per-row
/// findings.
pub fn validate_batch_grades(entries: &[GradeEntry]) -> ValidationReport {
    if entries.is_empty() {
        return ValidationReport::finish(
            vec!["No grades provided for validation".to_string()],
            Vec::new(),
        );
    }

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        let row = index + 1;
        let report = validate_grade(entry);
        errors.extend(report.errors.into_iter().map(|e| format!("Grade {row}: {e}")));
        warnings.extend(report.warnings.into_iter().map(|w| format!("Grade {row}: {w}")));
    }

    let mut seen: HashSet<EntryKey> = HashSet::new();
    let mut duplicated = false;
    for entry in entries {
        if !seen.insert(entry.identity()) {
            duplicated = true;
        }
    }
    if duplicated {
        errors.push(
            "Duplicate grades found for the same student, subject, and period".to_string(),
        );
    }

    ValidationReport::finish(errors, warnings)
}

/// Update validation: the replacement entry is validated in full, and the
/// identity fields are frozen. Large score corrections are surfaced as a
/// warning, never blocked.
pub fn validate_grade_update(old: &GradeEntry, new: &GradeEntry) -> ValidationReport {
    let mut report = validate_grade(new);
    let mut errors = std::mem::take(&mut report.errors);
    let mut warnings = std::mem::take(&mut report.warnings);

    let score_difference = (new.score - old.score).abs();
    if score_difference > 20.0 {
        warnings.push(format!(
            "Significant score change detected ({score_difference} points)"
        ));
    }

    if old.grade_period != new.grade_period {
        errors.push("Grade period cannot be changed".to_string());
    }
    if old.student_id != new.student_id {
        errors.push("Student cannot be changed".to_string());
    }
    if old.subject_id != new.subject_id {
        errors.push("Subject cannot be changed".to_string());
    }

    ValidationReport::finish(errors, warnings)
}

/// Submission validation: partial submission across periods is allowed, but
/// the gap is surfaced as a warning listing the missing periods.
pub fn validate_grade_submission(entries: &[GradeEntry]) -> ValidationReport {
    if entries.is_empty() {
        return ValidationReport::finish(vec!["No grades to submit".to_string()], Vec::new());
    }

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let present: HashSet<GradePeriod> = entries.iter().map(|e| e.grade_period).collect();
    let missing: Vec<&str> = GradePeriod::ALL
        .iter()
        .filter(|p| !present.contains(p))
        .map(|p| p.as_str())
        .collect();
    if !missing.is_empty() {
        warnings.push(format!("Missing grade periods: {}", missing.join(", ")));
    }

    let batch = validate_batch_grades(entries);
    errors.extend(batch.errors);
    warnings.extend(batch.warnings);

    ValidationReport::finish(errors, warnings)
}
