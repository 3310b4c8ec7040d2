use std::fmt::Write;

use crate::aggregate::ClassAggregate;
use crate::classify::ClassificationScheme;
use crate::models::GradeRecord;
use crate::roster::{filter_and_sort, ClassStats, RosterQuery, SortKey, StudentOverview};

/// Subjects ranked by class average, best first.
pub fn ranked_subjects(class: &ClassAggregate) -> Vec<(&str, f64)> {
    let mut ranked: Vec<(&str, f64)> = class
        .subjects
        .iter()
        .map(|(name, avg)| (name.as_str(), avg.average))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}

pub fn build_class_report(
    label: &str,
    class: &ClassAggregate,
    students: &[StudentOverview],
    scheme: &ClassificationScheme,
    grades: &[GradeRecord],
) -> String {
    let stats = ClassStats::from_overviews(students);
    let ranked = ranked_subjects(class);

    let mut output = String::new();

    let _ = writeln!(output, "# Classroom Insights Report");
    let _ = writeln!(output, "Generated for {label}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Students: {}", stats.total);
    let _ = writeln!(output, "- Average score: {}%", stats.average_score);
    let _ = writeln!(output, "- Needing support: {}", stats.needing_support());
    if class.skipped > 0 {
        let _ = writeln!(output, "- Malformed grade records skipped: {}", class.skipped);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Mix");
    let _ = writeln!(output, "- excellent: {}", stats.excellent);
    let _ = writeln!(output, "- good: {}", stats.good);
    let _ = writeln!(output, "- needs_attention: {}", stats.needs_attention);
    let _ = writeln!(output, "- struggling: {}", stats.struggling);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Grade Distribution");
    let distribution =
        scheme.letter_distribution(grades.iter().filter_map(GradeRecord::percentage));
    if grades.is_empty() {
        let _ = writeln!(output, "No grades recorded for this class.");
    } else {
        for (letter, count) in distribution {
            let _ = writeln!(output, "- {letter}: {count}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subject Averages");
    if ranked.is_empty() {
        let _ = writeln!(output, "No subject data for this class.");
    } else {
        for (name, average) in class.subjects.iter() {
            let _ = writeln!(
                output,
                "- {}: {:.1}% across {} grades from {} students",
                name, average.average, average.record_count, average.student_count
            );
        }
        let strengths: Vec<&str> = ranked.iter().take(2).map(|(name, _)| *name).collect();
        let weaknesses: Vec<&str> = ranked
            .iter()
            .rev()
            .take(2)
            .map(|(name, _)| *name)
            .collect();
        let _ = writeln!(output);
        let _ = writeln!(output, "Strengths: {}", strengths.join(", "));
        let _ = writeln!(output, "Focus areas: {}", weaknesses.join(", "));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students Needing Support");
    let by_status = filter_and_sort(
        students,
        &RosterQuery {
            sort: SortKey::Status,
            ..Default::default()
        },
    );
    let needing: Vec<&StudentOverview> = by_status
        .iter()
        .rev()
        .filter(|s| s.status.needs_support())
        .collect();
    if needing.is_empty() {
        let _ = writeln!(output, "Every student is on track.");
    } else {
        for student in needing {
            let _ = writeln!(
                output,
                "- {} ({}) {:.1}% {}, trend {}",
                student.name,
                student.email,
                student.overall_average,
                student.status,
                student.trend.as_str()
            );
        }
    }

    let mut recent: Vec<&GradeRecord> = grades.iter().collect();
    recent.sort_by(|a, b| b.graded_at.cmp(&a.graded_at));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Grades");
    if recent.is_empty() {
        let _ = writeln!(output, "No grades recorded for this class.");
    } else {
        for grade in recent.iter().take(5) {
            let pct = grade
                .percentage()
                .map(|p| format!("{p:.1}%"))
                .unwrap_or_else(|| "invalid".to_string());
            let _ = writeln!(
                output,
                "- {} ({}) on {}: {}",
                grade.title,
                grade.subject.name,
                grade.graded_at.date_naive(),
                pct
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate_class;
    use crate::classify::StatusTier;
    use crate::models::{Subject, Trend};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn grade(student_id: i64, subject: &str, score: f64, day: u32) -> GradeRecord {
        GradeRecord {
            id: Uuid::new_v4(),
            student_id,
            assignment_id: format!("asg-{student_id}-{day}"),
            title: format!("{subject} test {day}"),
            subject: Subject::authoritative(subject),
            score,
            max_points: 100.0,
            feedback: String::new(),
            graded_at: Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).unwrap(),
            graded_by: "kana".to_string(),
        }
    }

    fn overview(id: i64, name: &str, average: f64, status: StatusTier) -> StudentOverview {
        StudentOverview {
            student_id: id,
            name: name.to_string(),
            email: format!("{id}@school.test"),
            overall_average: average,
            status,
            trend: Trend::Down,
            record_count: 2,
        }
    }

    #[test]
    fn report_lists_strengths_support_and_recent_grades() {
        let grades = vec![
            grade(1, "Mathematics", 95.0, 1),
            grade(1, "English", 88.0, 2),
            grade(2, "Mathematics", 55.0, 3),
            grade(2, "History", 62.0, 4),
        ];
        let class = aggregate_class(&grades, 0.0);
        let students = vec![
            overview(1, "Avery Lee", 91.5, StatusTier::Excellent),
            overview(2, "Kiara Patel", 58.5, StatusTier::Struggling),
        ];
        let report = build_class_report(
            "classroom 7A",
            &class,
            &students,
            &ClassificationScheme::default(),
            &grades,
        );

        assert!(report.contains("Generated for classroom 7A"));
        assert!(report.contains("- Students: 2"));
        assert!(report.contains("- A: 1"));
        assert!(report.contains("- D: 1"));
        assert!(report.contains("- F: 1"));
        assert!(report.contains("Strengths: English, Mathematics"));
        assert!(report.contains("Focus areas: History, Mathematics"));
        assert!(report.contains("- Kiara Patel (2@school.test) 58.5% struggling, trend down"));
        assert!(!report.contains("Avery Lee (1@school.test)"));
        assert!(report.contains("- History test 4 (History) on 2026-03-04: 62.0%"));
    }

    #[test]
    fn empty_class_report_is_well_formed() {
        let class = aggregate_class(&[], 0.0);
        let scheme = ClassificationScheme::default();
        let report = build_class_report("empty", &class, &[], &scheme, &[]);
        assert!(report.contains("No subject data for this class."));
        assert!(report.contains("Every student is on track."));
    }
}
