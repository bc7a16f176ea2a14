//! Grade computation and reconciliation engine for the academic-records app.
//!
//! The pure core (validation, aggregation, curving) is synchronous and
//! side-effect-free; persistence goes through [`store::ReconciledGradeStore`],
//! the single write path that hides connectivity behind a durable local queue
//! and an event-driven reconciliation loop.

pub mod aggregate;
pub mod curve;
pub mod model;
pub mod store;
pub mod validate;

pub use aggregate::{aggregate, final_average, AggregationPolicy, PeriodScores, PeriodWeights};
pub use curve::{
    apply_curve, original_scores, preview_curve, statistics, AppliedCurve, CurveError,
    CurvePreview, StudentScore,
};
pub use model::{
    letter_for, CurveApplication, CurveStatistics, CurveType, EntryKey, GradeCurve, GradeEntry,
    GradePeriod, GradeStatus, StudentGradeAggregate,
};
pub use store::{
    ReconciledGradeStore, RetryPolicy, StoreError, SyncStatus, WriteOutcome,
};
pub use validate::{
    validate_batch_grades, validate_grade, validate_grade_input, validate_grade_submission,
    validate_grade_update, ValidationReport,
};
