use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type StudentId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectSource {
    Authoritative,
    Inferred,
}

impl SubjectSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectSource::Authoritative => "authoritative",
            SubjectSource::Inferred => "inferred",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "inferred" => SubjectSource::Inferred,
            _ => SubjectSource::Authoritative,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    pub source: SubjectSource,
}

impl Subject {
    pub fn authoritative(name: impl Into<String>) -> Self {
        Subject {
            name: name.into(),
            source: SubjectSource::Authoritative,
        }
    }

    pub fn inferred(name: impl Into<String>) -> Self {
        Subject {
            name: name.into(),
            source: SubjectSource::Inferred,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub id: Uuid,
    pub student_id: StudentId,
    pub assignment_id: String,
    pub title: String,
    pub subject: Subject,
    pub score: f64,
    pub max_points: f64,
    pub feedback: String,
    pub graded_at: DateTime<Utc>,
    pub graded_by: String,
}

impl GradeRecord {
    /// `None` for records that cannot produce a percentage within `0..=100`.
    pub fn percentage(&self) -> Option<f64> {
        if !self.score.is_finite() || !self.max_points.is_finite() || self.max_points <= 0.0 {
            return None;
        }
        let pct = self.score / self.max_points * 100.0;
        (0.0..=100.0).contains(&pct).then_some(pct)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectAverage {
    pub average: f64,
    pub record_count: usize,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAggregate {
    pub student_id: StudentId,
    pub subject_averages: BTreeMap<String, SubjectAverage>,
    pub overall_average: f64,
    pub trend: Trend,
    pub record_count: usize,
    pub skipped: usize,
}

impl StudentAggregate {
    pub fn has_data(&self) -> bool {
        self.record_count > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub full_name: String,
    pub email: String,
    pub classroom: String,
}
