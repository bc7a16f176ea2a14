use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Grading periods in calendar order. Each period carries a default weight in
/// the final average; the authoritative weights are injected per subject (see
/// `aggregate::PeriodWeights`), these are only the fallback policy values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GradePeriod {
    Prelim,
    Midterm,
    Final,
}

impl GradePeriod {
    pub const ALL: [GradePeriod; 3] = [GradePeriod::Prelim, GradePeriod::Midterm, GradePeriod::Final];

    pub fn display_name(self) -> &'static str {
        match self {
            GradePeriod::Prelim => "Preliminary",
            GradePeriod::Midterm => "Midterm",
            GradePeriod::Final => "Final",
        }
    }

    pub fn default_weight(self) -> f64 {
        match self {
            GradePeriod::Prelim => 0.30,
            GradePeriod::Midterm => 0.30,
            GradePeriod::Final => 0.40,
        }
    }

    /// Wire name as stored in the remote document store.
    pub fn as_str(self) -> &'static str {
        match self {
            GradePeriod::Prelim => "PRELIM",
            GradePeriod::Midterm => "MIDTERM",
            GradePeriod::Final => "FINAL",
        }
    }
}

impl std::fmt::Display for GradePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one authoritative grade record. At most one entry may exist per
/// key; a re-submission for the same key is an update, not a new record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryKey {
    pub student_id: String,
    pub subject_id: String,
    pub grade_period: GradePeriod,
}

impl std::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.student_id, self.subject_id, self.grade_period
        )
    }
}

/// One scored assessment for one student, one subject, one grading period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    pub student_id: String,
    pub student_name: String,
    pub subject_id: String,
    pub subject_name: String,
    pub teacher_id: String,
    pub grade_period: GradePeriod,
    pub score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub letter_grade: String,
    #[serde(default)]
    pub description: String,
    pub date_recorded: DateTime<Utc>,
}

impl GradeEntry {
    pub fn identity(&self) -> EntryKey {
        EntryKey {
            student_id: self.student_id.clone(),
            subject_id: self.subject_id.clone(),
            grade_period: self.grade_period,
        }
    }

    /// Percentage derived from the raw score. Zero when `max_score` is not
    /// positive, matching the source system.
    pub fn computed_percentage(&self) -> f64 {
        if self.max_score > 0.0 {
            (self.score / self.max_score) * 100.0
        } else {
            0.0
        }
    }
}

/// The letter scale, highest band first. Ties resolve to the higher band
/// (`>=` comparison, first match wins). Defined once; both per-entry letter
/// grades and final-average letters read from this table.
pub const LETTER_SCALE: [(f64, &str); 11] = [
    (97.0, "A+"),
    (93.0, "A"),
    (90.0, "A-"),
    (87.0, "B+"),
    (83.0, "B"),
    (80.0, "B-"),
    (77.0, "C+"),
    (73.0, "C"),
    (70.0, "C-"),
    (67.0, "D+"),
    (65.0, "D"),
];

pub fn letter_for(percent: f64) -> &'static str {
    for (cutoff, letter) in LETTER_SCALE {
        if percent >= cutoff {
            return letter;
        }
    }
    "F"
}

/// Pass/fail standing derived from the final average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GradeStatus {
    Passing,
    AtRisk,
    Incomplete,
}

impl GradeStatus {
    pub fn display_name(self) -> &'static str {
        match self {
            GradeStatus::Passing => "Passing",
            GradeStatus::AtRisk => "At Risk",
            GradeStatus::Incomplete => "Incomplete",
        }
    }
}

/// Derived per (student, subject) view. A cache, not a ledger: always
/// rebuildable from the contributing `GradeEntry` records and never persisted
/// as a source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGradeAggregate {
    pub student_id: String,
    pub subject_id: String,
    pub prelim_grade: Option<f64>,
    pub midterm_grade: Option<f64>,
    pub final_grade: Option<f64>,
    pub final_average: Option<f64>,
    pub status: GradeStatus,
    pub letter_grade: String,
    pub last_updated: DateTime<Utc>,
}

/// Curve transform families. Every transform is clamped to the curve's
/// `[min_grade, max_grade]` after evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CurveType {
    Linear,
    Percentage,
    SquareRoot,
    TargetAverage,
}

impl CurveType {
    pub fn display_name(self) -> &'static str {
        match self {
            CurveType::Linear => "Linear Curve",
            CurveType::Percentage => "Percentage Curve",
            CurveType::SquareRoot => "Square Root Curve",
            CurveType::TargetAverage => "Target Average",
        }
    }
}

/// A named, subject-scoped curve configuration. Once applied it is immutable
/// history; re-curving layers a new record on the original pre-curve scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeCurve {
    #[serde(default)]
    pub id: String,
    pub subject_id: String,
    pub subject_name: String,
    pub teacher_id: String,
    pub grade_period: GradePeriod,
    pub curve_type: CurveType,
    pub adjustment_factor: f64,
    pub target_average: f64,
    pub max_grade: f64,
    pub min_grade: f64,
    pub applied_date: DateTime<Utc>,
    pub is_active: bool,
}

/// One student's before/after pair for one curve event. Transient during
/// preview; persisted only on apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveApplication {
    pub student_id: String,
    pub student_name: String,
    pub original_score: f64,
    pub curved_score: f64,
    pub adjustment: f64,
}

/// Descriptive statistics over one cohort's period scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveStatistics {
    pub average: f64,
    pub std_dev: f64,
    pub passing_rate: f64,
    pub total_students: usize,
    /// Letter-band histogram, highest band first: (label, count).
    pub distribution: Vec<(String, usize)>,
}


#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A structurally valid entry with the percentage derived from the score.
    pub fn entry(
        student_id: &str,
        subject_id: &str,
        period: GradePeriod,
        score: f64,
        max_score: f64,
    ) -> GradeEntry {
        let percentage = if max_score > 0.0 {
            (score / max_score) * 100.0
        } else {
            0.0
        };
        GradeEntry {
            student_id: student_id.to_string(),
            student_name: format!("Student {student_id}"),
            subject_id: subject_id.to_string(),
            subject_name: format!("Subject {subject_id}"),
            teacher_id: "T1".to_string(),
            grade_period: period,
            score,
            max_score,
            percentage,
            letter_grade: letter_for(percentage).to_string(),
            description: String::new(),
            date_recorded: Utc::now(),
        }
    }
}
