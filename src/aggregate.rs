use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{GradeRecord, StudentAggregate, StudentId, SubjectAverage, Trend};

const TREND_WINDOW_MAX: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSubjectAverage {
    pub average: f64,
    pub record_count: usize,
    pub student_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassAggregate {
    pub students: BTreeMap<StudentId, StudentAggregate>,
    pub subjects: BTreeMap<String, ClassSubjectAverage>,
    pub overall_average: f64,
    pub skipped: usize,
}

/// Valid percentages in chronological order, plus the owners of dropped records.
fn chronological<'a, I>(records: I) -> (Vec<(&'a GradeRecord, f64)>, Vec<StudentId>)
where
    I: IntoIterator<Item = &'a GradeRecord>,
{
    let mut skipped = Vec::new();
    let mut valid = Vec::new();

    for record in records {
        match record.percentage() {
            Some(pct) => valid.push((record, pct)),
            None => {
                skipped.push(record.student_id);
                warn!(
                    student_id = record.student_id,
                    assignment_id = %record.assignment_id,
                    score = record.score,
                    max_points = record.max_points,
                    "skipping malformed grade record"
                );
            }
        }
    }

    valid.sort_by(|(a, _), (b, _)| {
        a.graded_at
            .cmp(&b.graded_at)
            .then_with(|| a.assignment_id.cmp(&b.assignment_id))
    });

    (valid, skipped)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Compares the latest window of a chronological sequence with the earliest one.
pub fn trend(percentages: &[f64]) -> Trend {
    let n = percentages.len();
    if n < 2 {
        return Trend::Stable;
    }

    let window = (n / 2).clamp(1, TREND_WINDOW_MAX);
    let earlier = mean(&percentages[..window]).unwrap_or_default();
    let later = mean(&percentages[n - window..]).unwrap_or_default();

    if later > earlier {
        Trend::Up
    } else if later < earlier {
        Trend::Down
    } else {
        Trend::Stable
    }
}

pub fn aggregate_student(
    student_id: StudentId,
    records: &[GradeRecord],
    empty_average: f64,
) -> StudentAggregate {
    let (valid, skipped) = chronological(records.iter().filter(|r| r.student_id == student_id));
    summarize(student_id, &valid, skipped.len(), empty_average)
}

/// Builds one student's aggregate from records already filtered and ordered.
fn summarize(
    student_id: StudentId,
    valid: &[(&GradeRecord, f64)],
    skipped: usize,
    empty_average: f64,
) -> StudentAggregate {
    let mut by_subject: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (record, pct) in valid {
        by_subject
            .entry(record.subject.name.clone())
            .or_default()
            .push(*pct);
    }

    let subject_averages = by_subject
        .into_iter()
        .map(|(subject, values)| {
            let average = SubjectAverage {
                average: mean(&values).unwrap_or(empty_average),
                record_count: values.len(),
                trend: trend(&values),
            };
            (subject, average)
        })
        .collect();

    let percentages: Vec<f64> = valid.iter().map(|(_, pct)| *pct).collect();
    let overall_average = match mean(&percentages) {
        Some(value) => value,
        None => {
            debug!(student_id, empty_average, "no usable grades, using empty average");
            empty_average
        }
    };

    StudentAggregate {
        student_id,
        subject_averages,
        overall_average,
        trend: trend(&percentages),
        record_count: percentages.len(),
        skipped,
    }
}

pub fn aggregate_class(records: &[GradeRecord], empty_average: f64) -> ClassAggregate {
    let (valid, skipped) = chronological(records);

    let mut per_student: BTreeMap<StudentId, (Vec<(&GradeRecord, f64)>, usize)> = records
        .iter()
        .map(|r| (r.student_id, (Vec::new(), 0)))
        .collect();
    for (record, pct) in &valid {
        if let Some(entry) = per_student.get_mut(&record.student_id) {
            entry.0.push((*record, *pct));
        }
    }
    for student_id in &skipped {
        if let Some(entry) = per_student.get_mut(student_id) {
            entry.1 += 1;
        }
    }

    let students: BTreeMap<StudentId, StudentAggregate> = per_student
        .into_iter()
        .map(|(id, (rows, dropped))| (id, summarize(id, &rows, dropped, empty_average)))
        .collect();

    let mut by_subject: BTreeMap<String, (Vec<f64>, BTreeSet<StudentId>)> = BTreeMap::new();
    for (record, pct) in &valid {
        let entry = by_subject.entry(record.subject.name.clone()).or_default();
        entry.0.push(*pct);
        entry.1.insert(record.student_id);
    }

    let subjects = by_subject
        .into_iter()
        .map(|(subject, (values, ids))| {
            let average = ClassSubjectAverage {
                average: mean(&values).unwrap_or(empty_average),
                record_count: values.len(),
                student_count: ids.len(),
            };
            (subject, average)
        })
        .collect();

    let student_averages: Vec<f64> = students
        .values()
        .filter(|s| s.has_data())
        .map(|s| s.overall_average)
        .collect();

    ClassAggregate {
        students,
        subjects,
        overall_average: mean(&student_averages).unwrap_or(empty_average),
        skipped: skipped.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Subject;
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn grade(student_id: StudentId, subject: &str, score: f64, max: f64, day: i64) -> GradeRecord {
        GradeRecord {
            id: Uuid::new_v4(),
            student_id,
            assignment_id: format!("a-{day}"),
            title: format!("{subject} assignment {day}"),
            subject: Subject::authoritative(subject),
            score,
            max_points: max,
            feedback: String::new(),
            graded_at: Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap() + Duration::days(day),
            graded_by: "kana".to_string(),
        }
    }

    #[test]
    fn overall_average_is_mean_of_percentages() {
        let records = vec![
            grade(1, "Mathematics", 40.0, 50.0, 1),
            grade(1, "English", 9.0, 10.0, 2),
            grade(1, "English", 70.0, 100.0, 3),
        ];
        let aggregate = aggregate_student(1, &records, 0.0);
        let expected = (80.0 + 90.0 + 70.0) / 3.0;
        assert!((aggregate.overall_average - expected).abs() < 1e-9);
        assert_eq!(aggregate.record_count, 3);
        assert_eq!(aggregate.skipped, 0);
        assert!((aggregate.subject_averages["English"].average - 80.0).abs() < 1e-9);
        assert_eq!(aggregate.subject_averages["Mathematics"].record_count, 1);
    }

    #[test]
    fn mathematics_scenario_averages_to_85() {
        let records = vec![
            grade(7, "Mathematics", 80.0, 100.0, 1),
            grade(7, "Mathematics", 90.0, 100.0, 2),
        ];
        let aggregate = aggregate_student(7, &records, 0.0);
        assert!((aggregate.subject_averages["Mathematics"].average - 85.0).abs() < 1e-9);
        assert_eq!(aggregate.trend, Trend::Up);
    }

    #[test]
    fn empty_input_uses_configured_default() {
        let aggregate = aggregate_student(3, &[], 62.5);
        assert_eq!(aggregate.overall_average, 62.5);
        assert_eq!(aggregate.trend, Trend::Stable);
        assert!(!aggregate.has_data());
        assert!(aggregate.subject_averages.is_empty());
    }

    #[test]
    fn malformed_records_are_skipped_and_counted() {
        let records = vec![
            grade(1, "Science", 50.0, 0.0, 1),
            grade(1, "Science", f64::NAN, 100.0, 2),
            grade(1, "Science", 75.0, 100.0, 3),
        ];
        let aggregate = aggregate_student(1, &records, 0.0);
        assert_eq!(aggregate.skipped, 2);
        assert_eq!(aggregate.record_count, 1);
        assert_eq!(aggregate.overall_average, 75.0);
        assert!(aggregate.overall_average.is_finite());
    }

    #[test]
    fn scores_outside_max_points_are_skipped() {
        let records = vec![
            grade(1, "Mathematics", 105.0, 100.0, 1),
            grade(1, "Mathematics", -5.0, 100.0, 2),
            grade(1, "Mathematics", 88.0, 100.0, 3),
        ];
        let aggregate = aggregate_student(1, &records, 0.0);
        assert_eq!(aggregate.skipped, 2);
        assert_eq!(aggregate.record_count, 1);
        assert!((aggregate.overall_average - 88.0).abs() < 1e-9);
        assert!((aggregate.subject_averages["Mathematics"].average - 88.0).abs() < 1e-9);

        let only_bad = aggregate_student(2, &[grade(2, "Mathematics", 105.0, 100.0, 1)], 0.0);
        assert_eq!(only_bad.overall_average, 0.0);
        assert_eq!(only_bad.skipped, 1);
    }

    #[test]
    fn only_malformed_records_fall_back_to_default() {
        let records = vec![grade(1, "Science", 10.0, 0.0, 1)];
        let aggregate = aggregate_student(1, &records, 0.0);
        assert_eq!(aggregate.overall_average, 0.0);
        assert_eq!(aggregate.skipped, 1);
    }

    #[test]
    fn aggregation_ignores_input_order_and_is_repeatable() {
        let mut records = vec![
            grade(1, "History", 60.0, 100.0, 1),
            grade(1, "History", 70.0, 100.0, 2),
            grade(1, "History", 95.0, 100.0, 3),
        ];
        let first = aggregate_student(1, &records, 0.0);
        records.reverse();
        let second = aggregate_student(1, &records, 0.0);
        assert_eq!(first, second);
        assert_eq!(first.trend, Trend::Up);
    }

    #[test]
    fn trend_compares_windows() {
        assert_eq!(trend(&[]), Trend::Stable);
        assert_eq!(trend(&[88.0]), Trend::Stable);
        assert_eq!(trend(&[90.0, 80.0]), Trend::Down);
        assert_eq!(trend(&[70.0, 70.0]), Trend::Stable);
        // window of 3: (50+60+70)/3 vs (70+80+90)/3
        assert_eq!(trend(&[50.0, 60.0, 70.0, 70.0, 80.0, 90.0]), Trend::Up);
        // window of 2 over four points: (90+50)/2 == (60+80)/2
        assert_eq!(trend(&[90.0, 50.0, 60.0, 80.0]), Trend::Stable);
    }

    #[test]
    fn class_aggregate_groups_by_student_and_subject() {
        let records = vec![
            grade(1, "Mathematics", 80.0, 100.0, 1),
            grade(1, "English", 60.0, 100.0, 2),
            grade(2, "Mathematics", 100.0, 100.0, 1),
            grade(2, "Mathematics", 5.0, 0.0, 2),
        ];
        let class = aggregate_class(&records, 0.0);
        assert_eq!(class.students.len(), 2);
        assert_eq!(class.skipped, 1);
        assert_eq!(class.students[&1].skipped, 0);
        assert_eq!(class.students[&2].skipped, 1);
        assert_eq!(class.students[&2], aggregate_student(2, &records, 0.0));

        let maths = &class.subjects["Mathematics"];
        assert!((maths.average - 90.0).abs() < 1e-9);
        assert_eq!(maths.student_count, 2);
        assert_eq!(maths.record_count, 2);

        // student 1 averages 70, student 2 averages 100
        assert!((class.overall_average - 85.0).abs() < 1e-9);
    }

    #[test]
    fn student_with_only_malformed_records_still_listed() {
        let records = vec![
            grade(1, "Science", 40.0, 50.0, 1),
            grade(3, "Science", 120.0, 100.0, 2),
        ];
        let class = aggregate_class(&records, 0.0);
        assert_eq!(class.skipped, 1);
        assert!(!class.students[&3].has_data());
        assert_eq!(class.students[&3].skipped, 1);
        assert!((class.overall_average - 80.0).abs() < 1e-9);
    }
}
