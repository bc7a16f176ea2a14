//! Weighted final-average computation.
//!
//! The critical property here: absence of data never reads as a score of
//! zero. The average is taken over the periods that are actually present,
//! normalized by the sum of their weights, and is `None` when nothing is
//! present.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::model::{letter_for, GradePeriod, GradeStatus, StudentGradeAggregate};

/// Per-period weight configuration, injected by the subject collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodWeights {
    pub prelim: f64,
    pub midterm: f64,
    pub final_period: f64,
}

impl PeriodWeights {
    pub fn weight_of(&self, period: GradePeriod) -> f64 {
        match period {
            GradePeriod::Prelim => self.prelim,
            GradePeriod::Midterm => self.midterm,
            GradePeriod::Final => self.final_period,
        }
    }
}

impl Default for PeriodWeights {
    fn default() -> Self {
        PeriodWeights {
            prelim: GradePeriod::Prelim.default_weight(),
            midterm: GradePeriod::Midterm.default_weight(),
            final_period: GradePeriod::Final.default_weight(),
        }
    }
}

/// Policy knobs for aggregation and pass/fail standing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationPolicy {
    pub weights: PeriodWeights,
    pub passing_threshold: f64,
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        AggregationPolicy {
            weights: PeriodWeights::default(),
            passing_threshold: 75.0,
        }
    }
}

/// The recorded period percentages for one (student, subject). `None` means
/// not yet recorded, which is different from a recorded zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodScores {
    pub prelim: Option<f64>,
    pub midterm: Option<f64>,
    pub final_period: Option<f64>,
}

impl PeriodScores {
    pub fn get(&self, period: GradePeriod) -> Option<f64> {
        match period {
            GradePeriod::Prelim => self.prelim,
            GradePeriod::Midterm => self.midterm,
            GradePeriod::Final => self.final_period,
        }
    }

    pub fn set(&mut self, period: GradePeriod, value: Option<f64>) {
        match period {
            GradePeriod::Prelim => self.prelim = value,
            GradePeriod::Midterm => self.midterm = value,
            GradePeriod::Final => self.final_period = value,
        }
    }

    pub fn recorded_count(&self) -> usize {
        GradePeriod::ALL
            .iter()
            .filter(|p| self.get(**p).is_some())
            .count()
    }

    /// How far along the record is, as a percentage of the three periods.
    pub fn completion_percentage(&self) -> f64 {
        (self.recorded_count() as f64 / GradePeriod::ALL.len() as f64) * 100.0
    }
}

/// Weighted average over present periods with non-zero weight, normalized by
/// the sum of those weights. `None` when no weighted period is present.
pub fn final_average(scores: &PeriodScores, weights: &PeriodWeights) -> Option<f64> {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for period in GradePeriod::ALL {
        let weight = weights.weight_of(period);
        if weight <= 0.0 {
            continue;
        }
        if let Some(pct) = scores.get(period) {
            weighted_sum += pct * weight;
            weight_total += weight;
        }
    }
    if weight_total > 0.0 {
        Some(weighted_sum / weight_total)
    } else {
        None
    }
}

pub fn status_for(final_average: Option<f64>, policy: &AggregationPolicy) -> GradeStatus {
    match final_average {
        None => GradeStatus::Incomplete,
        Some(avg) if avg >= policy.passing_threshold => GradeStatus::Passing,
        Some(_) => GradeStatus::AtRisk,
    }
}

/// Full aggregate view for one (student, subject). Recomputed on demand from
/// the contributing entries; callers must not treat the result as
/// authoritative storage.
pub fn aggregate(
    student_id: &str,
    subject_id: &str,
    scores: &PeriodScores,
    policy: &AggregationPolicy,
) -> StudentGradeAggregate {
    let avg = final_average(scores, &policy.weights);
    let status = status_for(avg, policy);
    let letter_grade = match avg {
        Some(v) => letter_for(v).to_string(),
        None => "INC".to_string(),
    };
    StudentGradeAggregate {
        student_id: student_id.to_string(),
        subject_id: subject_id.to_string(),
        prelim_grade: scores.prelim,
        midterm_grade: scores.midterm,
        final_grade: scores.final_period,
        final_average: avg,
        status,
        letter_grade,
        last_updated: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AggregationPolicy {
        AggregationPolicy::default()
    }

    #[test]
    fn full_record_uses_standard_weights() {
        let scores = PeriodScores {
            prelim: Some(80.0),
            midterm: Some(90.0),
            final_period: Some(70.0),
        };
        let avg = final_average(&scores, &policy().weights).unwrap();
        // 80*0.3 + 90*0.3 + 70*0.4 = 79
        assert!((avg - 79.0).abs() < 1e-9);
    }

    #[test]
    fn partial_record_normalizes_by_present_weights() {
        let scores = PeriodScores {
            prelim: Some(80.0),
            midterm: None,
            final_period: Some(60.0),
        };
        let avg = final_average(&scores, &policy().weights).unwrap();
        // (80*0.3 + 60*0.4) / 0.7
        assert!((avg - 48.0 / 0.7).abs() < 1e-9);
    }

    #[test]
    fn absence_is_not_zero() {
        let scores = PeriodScores {
            prelim: Some(100.0),
            midterm: None,
            final_period: None,
        };
        let avg = final_average(&scores, &policy().weights).unwrap();
        assert!((avg - 100.0).abs() < 1e-9);
    }

    #[test]
    fn empty_record_is_undefined_not_zero() {
        let scores = PeriodScores::default();
        assert_eq!(final_average(&scores, &policy().weights), None);
        let agg = aggregate("S1", "SUB1", &scores, &policy());
        assert_eq!(agg.status, GradeStatus::Incomplete);
        assert_eq!(agg.letter_grade, "INC");
    }

    #[test]
    fn zero_average_only_from_recorded_zeros() {
        let scores = PeriodScores {
            prelim: Some(0.0),
            midterm: Some(0.0),
            final_period: None,
        };
        let avg = final_average(&scores, &policy().weights).unwrap();
        assert_eq!(avg, 0.0);
    }

    #[test]
    fn zero_weight_periods_are_excluded() {
        let scores = PeriodScores {
            prelim: Some(10.0),
            midterm: Some(90.0),
            final_period: None,
        };
        let weights = PeriodWeights {
            prelim: 0.0,
            midterm: 0.3,
            final_period: 0.4,
        };
        let avg = final_average(&scores, &weights).unwrap();
        assert!((avg - 90.0).abs() < 1e-9);
    }

    #[test]
    fn status_thresholds() {
        let p = policy();
        assert_eq!(status_for(Some(75.0), &p), GradeStatus::Passing);
        assert_eq!(status_for(Some(74.999), &p), GradeStatus::AtRisk);
        assert_eq!(status_for(None, &p), GradeStatus::Incomplete);
    }

    #[test]
    fn completion_percentage_counts_recorded_periods() {
        let mut scores = PeriodScores::default();
        assert_eq!(scores.completion_percentage(), 0.0);
        scores.set(GradePeriod::Prelim, Some(80.0));
        scores.set(GradePeriod::Final, Some(70.0));
        assert!((scores.completion_percentage() - 200.0 / 3.0).abs() < 1e-9);
    }
}
