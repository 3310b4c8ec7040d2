use std::collections::BTreeMap;

use serde::Serialize;

use crate::recommend::{Recommendation, RecommendationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl PathLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathLevel::Beginner => "beginner",
            PathLevel::Intermediate => "intermediate",
            PathLevel::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LearningPath {
    pub id: String,
    pub title: String,
    pub subject: String,
    pub progress: u32,
    pub completed: usize,
    pub total: usize,
    pub level: PathLevel,
    pub estimated_completion: String,
    pub skills: Vec<&'static str>,
    pub assignments: Vec<Recommendation>,
}

pub fn skills_for(subject: &str) -> Vec<&'static str> {
    let skills: &[&'static str] = match subject {
        "Mathematics" => &[
            "Problem solving",
            "Logical reasoning",
            "Pattern recognition",
            "Analytical thinking",
        ],
        "Science" => &[
            "Scientific method",
            "Data analysis",
            "Critical thinking",
            "Observation skills",
        ],
        "English" => &[
            "Reading comprehension",
            "Writing skills",
            "Grammar",
            "Communication",
        ],
        "History" => &[
            "Critical analysis",
            "Research skills",
            "Timeline understanding",
            "Cultural awareness",
        ],
        "Physics" => &[
            "Mathematical modeling",
            "Scientific reasoning",
            "Problem solving",
            "Experimental design",
        ],
        "Chemistry" => &[
            "Laboratory skills",
            "Chemical reasoning",
            "Safety protocols",
            "Data interpretation",
        ],
        "Biology" => &[
            "Scientific observation",
            "Classification skills",
            "Life processes",
            "Ecosystem understanding",
        ],
        _ => &[
            "Critical thinking",
            "Problem solving",
            "Knowledge application",
        ],
    };
    skills.to_vec()
}

pub fn format_minutes(total: u32) -> String {
    let hours = total / 60;
    let minutes = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

fn level_for(assignments: &[Recommendation]) -> PathLevel {
    if assignments.is_empty() {
        return PathLevel::Beginner;
    }
    let total: u32 = assignments.iter().map(|a| a.difficulty.value()).sum();
    let mean = total as f64 / assignments.len() as f64;
    if mean < 1.5 {
        PathLevel::Beginner
    } else if mean < 2.5 {
        PathLevel::Intermediate
    } else {
        PathLevel::Advanced
    }
}

fn path_id(subject: &str) -> String {
    let slug = subject
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase();
    format!("path_{slug}")
}

/// Groups recommendations into one path per subject, easiest work first.
pub fn build_learning_paths(recommendations: &[Recommendation]) -> Vec<LearningPath> {
    let mut by_subject: BTreeMap<&str, Vec<Recommendation>> = BTreeMap::new();
    for rec in recommendations {
        by_subject.entry(rec.subject.as_str()).or_default().push(rec.clone());
    }

    by_subject
        .into_iter()
        .map(|(subject, mut assignments)| {
            assignments.sort_by_key(|a| a.difficulty);
            let total = assignments.len();
            let completed = assignments
                .iter()
                .filter(|a| a.status == RecommendationStatus::Completed)
                .count();
            let progress = if total == 0 {
                0
            } else {
                (completed as f64 / total as f64 * 100.0).round() as u32
            };
            let minutes: u32 = assignments.iter().map(|a| a.estimated_minutes).sum();

            LearningPath {
                id: path_id(subject),
                title: format!("{subject} Mastery Path"),
                subject: subject.to_string(),
                progress,
                completed,
                total,
                level: level_for(&assignments),
                estimated_completion: format_minutes(minutes),
                skills: skills_for(subject),
                assignments,
            }
        })
        .collect()
}
