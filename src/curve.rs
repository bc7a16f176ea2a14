//! Grade curving: descriptive statistics, side-effect-free preview, and a
//! single transactional apply.
//!
//! Preview is pure. It is always computed from the original (pre-curve)
//! scores passed in by the caller, so repeated previews with different
//! parameters never drift, and two teachers previewing concurrently cannot
//! interfere. `apply_curve` is the only operation that writes.

use chrono::Utc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::aggregate::AggregationPolicy;
use crate::model::{
    letter_for, CurveApplication, CurveStatistics, CurveType, GradeCurve, GradeEntry,
};
use crate::store::remote::CurveStore;
use crate::store::{ReconciledGradeStore, StoreError};

/// One student's pre-curve percentage. The caller is responsible for passing
/// original values; `original_scores` recovers them from curve history when
/// a curve has already been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentScore {
    pub student_id: String,
    pub student_name: String,
    pub score: f64,
}

/// Result of a preview pass: per-student before/after pairs plus cohort
/// statistics on both sides of the transform.
#[derive(Debug, Clone, PartialEq)]
pub struct CurvePreview {
    pub applications: Vec<CurveApplication>,
    pub statistics_before: CurveStatistics,
    pub statistics_after: CurveStatistics,
}

/// Result of a committed apply: the persisted curve configuration (with its
/// assigned id and applied date) and the application history written for it.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedCurve {
    pub curve: GradeCurve,
    pub applications: Vec<CurveApplication>,
}

/// Curve configuration errors block apply before any persistence occurs and
/// are never silently clamped away.
#[derive(Debug, Error)]
pub enum CurveError {
    #[error("no scores to curve")]
    EmptyCohort,

    #[error("maxGrade {max} is below minGrade {min}")]
    InvertedBounds { min: f64, max: f64 },

    #[error("curve collapses every score onto the {bound} clamp bound")]
    DegenerateClamp { bound: f64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Descriptive statistics over one cohort. Standard deviation uses the
/// population formula (divide by N): the cohort is the whole population, not
/// a sample.
pub fn statistics(
    scores: &[StudentScore],
    policy: &AggregationPolicy,
) -> Result<CurveStatistics, CurveError> {
    let values: Vec<f64> = scores.iter().map(|s| s.score).collect();
    statistics_of_values(&values, policy)
}

fn statistics_of_values(
    values: &[f64],
    policy: &AggregationPolicy,
) -> Result<CurveStatistics, CurveError> {
    if values.is_empty() {
        return Err(CurveError::EmptyCohort);
    }
    let n = values.len() as f64;
    let average = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - average) * (v - average)).sum::<f64>() / n;
    let passing = values
        .iter()
        .filter(|v| **v >= policy.passing_threshold)
        .count();
    Ok(CurveStatistics {
        average,
        std_dev: variance.sqrt(),
        passing_rate: (passing as f64 / n) * 100.0,
        total_students: values.len(),
        distribution: distribution_of(values),
    })
}

fn distribution_of(values: &[f64]) -> Vec<(String, usize)> {
    let bands: [(&str, f64, f64); 4] = [
        ("A (90-100)", 90.0, f64::INFINITY),
        ("B (80-89)", 80.0, 90.0),
        ("C (70-79)", 70.0, 80.0),
        ("D (60-69)", 60.0, 70.0),
    ];
    let mut out = Vec::with_capacity(5);
    let mut counted = 0;
    for (label, lower, upper) in bands {
        let count = values.iter().filter(|v| **v >= lower && **v < upper).count();
        counted += count;
        out.push((label.to_string(), count));
    }
    out.push(("F (0-59)".to_string(), values.len() - counted));
    out
}

fn raw_transform(score: f64, curve: &GradeCurve, cohort_average: f64) -> f64 {
    match curve.curve_type {
        CurveType::Linear => score + curve.adjustment_factor,
        CurveType::Percentage => score * (1.0 + curve.adjustment_factor / 100.0),
        CurveType::SquareRoot => (score * 10.0).sqrt(),
        // Uniform shift: every student moves by the same amount so the cohort
        // average lands on the target.
        CurveType::TargetAverage => score + (curve.target_average - cohort_average),
    }
}

/// Pure preview pass. Computes every application from the passed-in original
/// scores and validates the curve configuration before returning anything.
pub fn preview_curve(
    scores: &[StudentScore],
    curve: &GradeCurve,
    policy: &AggregationPolicy,
) -> Result<CurvePreview, CurveError> {
    if scores.is_empty() {
        return Err(CurveError::EmptyCohort);
    }
    if curve.max_grade < curve.min_grade {
        return Err(CurveError::InvertedBounds {
            min: curve.min_grade,
            max: curve.max_grade,
        });
    }

    let statistics_before = statistics(scores, policy)?;
    let cohort_average = statistics_before.average;

    let raw: Vec<f64> = scores
        .iter()
        .map(|s| raw_transform(s.score, curve, cohort_average))
        .collect();

    // A configuration that pushes the whole cohort past one clamp bound would
    // flatten the distribution; reject it instead.
    if raw.iter().all(|v| *v < curve.min_grade) {
        return Err(CurveError::DegenerateClamp {
            bound: curve.min_grade,
        });
    }
    if raw.iter().all(|v| *v > curve.max_grade) {
        return Err(CurveError::DegenerateClamp {
            bound: curve.max_grade,
        });
    }

    let applications: Vec<CurveApplication> = scores
        .iter()
        .zip(raw.iter())
        .map(|(s, r)| {
            let curved = r.clamp(curve.min_grade, curve.max_grade);
            CurveApplication {
                student_id: s.student_id.clone(),
                student_name: s.student_name.clone(),
                original_score: s.score,
                curved_score: curved,
                adjustment: curved - s.score,
            }
        })
        .collect();

    let curved_values: Vec<f64> = applications.iter().map(|a| a.curved_score).collect();
    let statistics_after = statistics_of_values(&curved_values, policy)?;

    Ok(CurvePreview {
        applications,
        statistics_before,
        statistics_after,
    })
}

/// Recovers pre-curve scores for a cohort. When an entry already carries a
/// curved value, the earliest persisted application for that student supplies
/// the original, so re-curving layers on the true originals and never
/// compounds.
pub fn original_scores(entries: &[GradeEntry], history: &[CurveApplication]) -> Vec<StudentScore> {
    entries
        .iter()
        .map(|entry| {
            let original = history
                .iter()
                .find(|a| a.student_id == entry.student_id)
                .map(|a| a.original_score)
                .unwrap_or(entry.percentage);
            StudentScore {
                student_id: entry.student_id.clone(),
                student_name: entry.student_name.clone(),
                score: original,
            }
        })
        .collect()
}

fn curved_entry(entry: &GradeEntry, application: &CurveApplication) -> GradeEntry {
    let mut updated = entry.clone();
    updated.percentage = application.curved_score;
    // Keep score/maxScore consistent with the curved percentage so the record
    // still validates.
    if updated.max_score > 0.0 {
        updated.score = application.curved_score * updated.max_score / 100.0;
    }
    updated.letter_grade = letter_for(application.curved_score).to_string();
    updated.date_recorded = Utc::now();
    updated
}

/// The commit half of the two-phase curve flow. Persists in a fixed order:
/// curve configuration first (it is the source of truth for regenerating
/// applications after a crash), then the curved grade updates, then the
/// application history.
pub async fn apply_curve(
    scores: &[StudentScore],
    curve: &GradeCurve,
    entries: &[GradeEntry],
    policy: &AggregationPolicy,
    grades: &ReconciledGradeStore,
    curves: &dyn CurveStore,
) -> Result<AppliedCurve, CurveError> {
    let preview = preview_curve(scores, curve, policy)?;

    let mut committed = curve.clone();
    committed.id = Uuid::new_v4().to_string();
    committed.applied_date = Utc::now();
    committed.is_active = true;
    curves.save_curve(&committed).await?;

    for application in &preview.applications {
        if let Some(entry) = entries
            .iter()
            .find(|e| e.student_id == application.student_id)
        {
            grades.write(&curved_entry(entry, application)).await?;
        }
    }

    curves
        .append_applications(&committed.id, &preview.applications)
        .await?;

    info!(
        curve_id = %committed.id,
        subject_id = %committed.subject_id,
        students = preview.applications.len(),
        "curve applied"
    );

    Ok(AppliedCurve {
        curve: committed,
        applications: preview.applications,
    })
}
