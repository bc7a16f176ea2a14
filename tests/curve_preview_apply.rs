//! Two-phase curve flow: preview stays side-effect-free, apply persists the
//! curve configuration, the curved grade updates, and the application
//! history, and re-curving layers on the original scores.

use std::sync::Arc;

use chrono::Utc;

use acadtrack_engine::aggregate::AggregationPolicy;
use acadtrack_engine::curve::{apply_curve, original_scores, preview_curve, StudentScore};
use acadtrack_engine::model::{
    letter_for, CurveType, EntryKey, GradeCurve, GradeEntry, GradePeriod,
};
use acadtrack_engine::store::mock::{MockConnectivity, MockCurveStore, MockRemoteStore};
use acadtrack_engine::store::{CurveStore, PendingQueue, ReconciledGradeStore, RetryPolicy};

fn entry(student_id: &str, score: f64) -> GradeEntry {
    GradeEntry {
        student_id: student_id.to_string(),
        student_name: format!("Student {student_id}"),
        subject_id: "SUB1".to_string(),
        subject_name: "Algebra".to_string(),
        teacher_id: "T1".to_string(),
        grade_period: GradePeriod::Midterm,
        score,
        max_score: 100.0,
        percentage: score,
        letter_grade: letter_for(score).to_string(),
        description: String::new(),
        date_recorded: Utc::now(),
    }
}

fn curve(curve_type: CurveType) -> GradeCurve {
    GradeCurve {
        id: String::new(),
        subject_id: "SUB1".to_string(),
        subject_name: "Algebra".to_string(),
        teacher_id: "T1".to_string(),
        grade_period: GradePeriod::Midterm,
        curve_type,
        adjustment_factor: 0.0,
        target_average: 0.0,
        max_grade: 100.0,
        min_grade: 0.0,
        applied_date: Utc::now(),
        is_active: false,
    }
}

fn scores_of(entries: &[GradeEntry]) -> Vec<StudentScore> {
    entries
        .iter()
        .map(|e| StudentScore {
            student_id: e.student_id.clone(),
            student_name: e.student_name.clone(),
            score: e.percentage,
        })
        .collect()
}

fn grade_store() -> (Arc<ReconciledGradeStore>, Arc<MockRemoteStore>) {
    let remote = Arc::new(MockRemoteStore::new());
    let connectivity = Arc::new(MockConnectivity::new(true));
    let queue = PendingQueue::open_in_memory().expect("open queue");
    let store = Arc::new(ReconciledGradeStore::new(
        remote.clone(),
        connectivity,
        queue,
        RetryPolicy::default(),
    ));
    (store, remote)
}

#[tokio::test]
async fn preview_touches_no_storage() {
    let entries = [entry("S1", 70.0), entry("S2", 80.0)];
    let (_store, remote) = grade_store();
    let mut c = curve(CurveType::Linear);
    c.adjustment_factor = 5.0;

    let preview = preview_curve(&scores_of(&entries), &c, &AggregationPolicy::default())
        .expect("preview");
    assert_eq!(preview.applications.len(), 2);
    assert_eq!(remote.upsert_count(), 0);
    assert_eq!(remote.record_count(), 0);
}

#[tokio::test]
async fn apply_persists_config_grades_and_history() {
    let entries = vec![entry("S1", 70.0), entry("S2", 75.0), entry("S3", 80.0)];
    let (store, remote) = grade_store();
    let curves = MockCurveStore::new();

    let mut c = curve(CurveType::TargetAverage);
    c.target_average = 80.0;

    let applied = apply_curve(
        &scores_of(&entries),
        &c,
        &entries,
        &AggregationPolicy::default(),
        &store,
        &curves,
    )
    .await
    .expect("apply");

    assert!(!applied.curve.id.is_empty());
    assert!(applied.curve.is_active);

    let saved = curves.curves_by_subject("SUB1").await.expect("curves");
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].id, applied.curve.id);

    // Uniform +5 shift lands on the target average.
    let s1 = remote
        .snapshot(&EntryKey {
            student_id: "S1".to_string(),
            subject_id: "SUB1".to_string(),
            grade_period: GradePeriod::Midterm,
        })
        .expect("curved record");
    assert!((s1.percentage - 75.0).abs() < 1e-9);
    assert!((s1.score - 75.0).abs() < 1e-9, "score rescaled with percentage");
    assert_eq!(s1.letter_grade, letter_for(75.0));

    let history = curves.applications_for(&applied.curve.id);
    assert_eq!(history.len(), 3);
    assert!((history[2].curved_score - 85.0).abs() < 1e-9);
    assert!((history[2].original_score - 80.0).abs() < 1e-9);
}

#[tokio::test]
async fn recurve_layers_on_originals_not_curved_values() {
    let entries = vec![entry("S1", 60.0), entry("S2", 70.0)];
    let (store, remote) = grade_store();
    let curves = MockCurveStore::new();
    let policy = AggregationPolicy::default();

    let mut first = curve(CurveType::Linear);
    first.adjustment_factor = 10.0;
    let applied = apply_curve(&scores_of(&entries), &first, &entries, &policy, &store, &curves)
        .await
        .expect("first apply");

    // Fetch the now-curved entries the way a caller would.
    let curved_entries = store.list_by_subject("SUB1").await.expect("list");
    assert!((curved_entries[0].percentage - 70.0).abs() < 1e-9);

    // Re-curving starts from the persisted originals, not the curved values.
    let history = curves.applications_for(&applied.curve.id);
    let originals = original_scores(&curved_entries, &history);
    assert_eq!(originals[0].score, 60.0);
    assert_eq!(originals[1].score, 70.0);

    let mut second = curve(CurveType::Linear);
    second.adjustment_factor = 5.0;
    let reapplied = apply_curve(&originals, &second, &curved_entries, &policy, &store, &curves)
        .await
        .expect("second apply");
    let s1 = reapplied
        .applications
        .iter()
        .find(|a| a.student_id == "S1")
        .unwrap();
    assert_eq!(s1.original_score, 60.0);
    assert_eq!(s1.curved_score, 65.0, "no compounding of the first curve");

    let s1_remote = remote
        .snapshot(&EntryKey {
            student_id: "S1".to_string(),
            subject_id: "SUB1".to_string(),
            grade_period: GradePeriod::Midterm,
        })
        .unwrap();
    assert!((s1_remote.percentage - 65.0).abs() < 1e-9);
}

#[tokio::test]
async fn degenerate_configuration_blocks_before_persistence() {
    let entries = vec![entry("S1", 70.0), entry("S2", 80.0)];
    let (store, remote) = grade_store();
    let curves = MockCurveStore::new();

    let mut c = curve(CurveType::Linear);
    c.adjustment_factor = 40.0; // every raw value beyond maxGrade

    let result = apply_curve(
        &scores_of(&entries),
        &c,
        &entries,
        &AggregationPolicy::default(),
        &store,
        &curves,
    )
    .await;
    assert!(result.is_err());
    assert_eq!(remote.record_count(), 0);
    assert!(curves.curves_by_subject("SUB1").await.unwrap().is_empty());
}
