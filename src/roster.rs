use serde::Serialize;

use crate::classify::{ClassificationScheme, StatusTier};
use crate::error::ClassifyError;
use crate::models::{Student, StudentAggregate, StudentId, Trend};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentOverview {
    pub student_id: StudentId,
    pub name: String,
    pub email: String,
    pub overall_average: f64,
    pub status: StatusTier,
    pub trend: Trend,
    pub record_count: usize,
}

impl StudentOverview {
    pub fn build(
        student: &Student,
        aggregate: &StudentAggregate,
        scheme: &ClassificationScheme,
    ) -> Result<Self, ClassifyError> {
        Ok(StudentOverview {
            student_id: student.id,
            name: student.full_name.clone(),
            email: student.email.clone(),
            overall_average: aggregate.overall_average,
            status: scheme.status(aggregate.overall_average)?,
            trend: aggregate.trend,
            record_count: aggregate.record_count,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortKey {
    #[default]
    Name,
    Score,
    Status,
}

#[derive(Debug, Clone, Default)]
pub struct RosterQuery {
    pub search: Option<String>,
    pub status: Option<StatusTier>,
    pub sort: SortKey,
}

pub fn filter_and_sort(students: &[StudentOverview], query: &RosterQuery) -> Vec<StudentOverview> {
    let needle = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let mut matches: Vec<StudentOverview> = students
        .iter()
        .filter(|s| match &needle {
            Some(needle) => s.name.to_lowercase().contains(needle),
            None => true,
        })
        .filter(|s| query.status.map_or(true, |status| s.status == status))
        .cloned()
        .collect();

    match query.sort {
        SortKey::Name => matches.sort_by_key(|s| s.name.to_lowercase()),
        SortKey::Score => matches.sort_by(|a, b| {
            b.overall_average
                .partial_cmp(&a.overall_average)
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
        SortKey::Status => matches.sort_by(|a, b| {
            a.status
                .rank()
                .cmp(&b.status.rank())
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        }),
    }

    matches
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassStats {
    pub total: usize,
    pub excellent: usize,
    pub good: usize,
    pub needs_attention: usize,
    pub struggling: usize,
    pub average_score: u32,
}

impl ClassStats {
    pub fn from_overviews(students: &[StudentOverview]) -> Self {
        let mut stats = ClassStats {
            total: students.len(),
            ..Default::default()
        };
        for student in students {
            match student.status {
                StatusTier::Excellent => stats.excellent += 1,
                StatusTier::Good => stats.good += 1,
                StatusTier::NeedsAttention => stats.needs_attention += 1,
                StatusTier::Struggling => stats.struggling += 1,
            }
        }
        if !students.is_empty() {
            let sum: f64 = students.iter().map(|s| s.overall_average).sum();
            stats.average_score = (sum / students.len() as f64).round() as u32;
        }
        stats
    }

    pub fn needing_support(&self) -> usize {
        self.needs_attention + self.struggling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overview(id: StudentId, name: &str, average: f64) -> StudentOverview {
        let scheme = ClassificationScheme::default();
        StudentOverview {
            student_id: id,
            name: name.to_string(),
            email: format!("{}@school.test", name.to_lowercase()),
            overall_average: average,
            status: scheme.status(average).unwrap(),
            trend: Trend::Stable,
            record_count: 1,
        }
    }

    fn class() -> Vec<StudentOverview> {
        vec![
            overview(1, "Zara Osei", 92.0),
            overview(2, "amir Haddad", 64.0),
            overview(3, "Lena Park", 81.0),
            overview(4, "Marta Lind", 73.0),
            overview(5, "Leo Park", 95.0),
        ]
    }

    #[test]
    fn name_sort_ignores_case() {
        let sorted = filter_and_sort(&class(), &RosterQuery::default());
        let names: Vec<_> = sorted.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["amir Haddad", "Lena Park", "Leo Park", "Marta Lind", "Zara Osei"]
        );
    }

    #[test]
    fn search_and_status_filters_combine() {
        let query = RosterQuery {
            search: Some("PARK".to_string()),
            status: Some(StatusTier::Excellent),
            sort: SortKey::Name,
        };
        let found = filter_and_sort(&class(), &query);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].student_id, 5);
    }

    #[test]
    fn score_sort_is_descending_and_status_sort_is_by_rank() {
        let by_score = filter_and_sort(
            &class(),
            &RosterQuery {
                sort: SortKey::Score,
                ..Default::default()
            },
        );
        assert_eq!(
            by_score.iter().map(|s| s.student_id).collect::<Vec<_>>(),
            vec![5, 1, 3, 4, 2]
        );

        let by_status = filter_and_sort(
            &class(),
            &RosterQuery {
                sort: SortKey::Status,
                ..Default::default()
            },
        );
        assert_eq!(
            by_status.iter().map(|s| s.student_id).collect::<Vec<_>>(),
            vec![5, 1, 3, 4, 2]
        );
    }

    #[test]
    fn stats_count_tiers_and_round_average() {
        let stats = ClassStats::from_overviews(&class());
        assert_eq!(stats.total, 5);
        assert_eq!(stats.excellent, 2);
        assert_eq!(stats.good, 1);
        assert_eq!(stats.needs_attention, 1);
        assert_eq!(stats.struggling, 1);
        assert_eq!(stats.needing_support(), 2);
        // (92 + 64 + 81 + 73 + 95) / 5 = 81
        assert_eq!(stats.average_score, 81);
        assert_eq!(ClassStats::from_overviews(&[]).average_score, 0);
    }
}
