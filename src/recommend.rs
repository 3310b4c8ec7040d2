use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::classify::validate_average;
use crate::error::{LifecycleError, RecommendError};
use crate::models::StudentId;

const REMEDIAL_BELOW: f64 = 70.0;
const ADVANCED_FROM: f64 = 85.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    Practice,
    Review,
    Challenge,
    Remedial,
}

impl RecommendationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationType::Practice => "practice",
            RecommendationType::Review => "review",
            RecommendationType::Challenge => "challenge",
            RecommendationType::Remedial => "remedial",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "practice" => Some(RecommendationType::Practice),
            "review" => Some(RecommendationType::Review),
            "challenge" => Some(RecommendationType::Challenge),
            "remedial" => Some(RecommendationType::Remedial),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn value(&self) -> u32 {
        match self {
            Difficulty::Easy => 1,
            Difficulty::Medium => 2,
            Difficulty::Hard => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Available,
    InProgress,
    Completed,
}

impl RecommendationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationStatus::Available => "available",
            RecommendationStatus::InProgress => "in_progress",
            RecommendationStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "available" => Some(RecommendationStatus::Available),
            "in_progress" => Some(RecommendationStatus::InProgress),
            "completed" => Some(RecommendationStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for RecommendationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendationTier {
    Remedial,
    Reinforcement,
    Advanced,
}

impl RecommendationTier {
    /// The three tiers partition `0..=100`.
    pub fn for_average(average: f64) -> Self {
        if average < REMEDIAL_BELOW {
            RecommendationTier::Remedial
        } else if average < ADVANCED_FROM {
            RecommendationTier::Reinforcement
        } else {
            RecommendationTier::Advanced
        }
    }

    fn templates(&self) -> [Template; 2] {
        match self {
            RecommendationTier::Remedial => [
                Template {
                    title: "{s} Fundamentals Review",
                    description:
                        "Strengthen your foundation with basic concepts and practice problems.",
                    kind: RecommendationType::Remedial,
                    difficulty: Difficulty::Easy,
                    estimated_minutes: 45,
                    xp_reward: 100,
                },
                Template {
                    title: "{s} Step-by-Step Practice",
                    description: "Guided practice problems with detailed explanations.",
                    kind: RecommendationType::Practice,
                    difficulty: Difficulty::Easy,
                    estimated_minutes: 30,
                    xp_reward: 75,
                },
            ],
            RecommendationTier::Reinforcement => [
                Template {
                    title: "{s} Concept Reinforcement",
                    description: "Practice problems to solidify your understanding.",
                    kind: RecommendationType::Review,
                    difficulty: Difficulty::Medium,
                    estimated_minutes: 35,
                    xp_reward: 125,
                },
                Template {
                    title: "{s} Problem Solving",
                    description: "Challenge yourself with advanced problem-solving techniques.",
                    kind: RecommendationType::Challenge,
                    difficulty: Difficulty::Medium,
                    estimated_minutes: 40,
                    xp_reward: 150,
                },
            ],
            RecommendationTier::Advanced => [
                Template {
                    title: "Advanced {s} Challenges",
                    description: "Push your limits with complex, real-world applications.",
                    kind: RecommendationType::Challenge,
                    difficulty: Difficulty::Hard,
                    estimated_minutes: 50,
                    xp_reward: 200,
                },
                Template {
                    title: "{s} Extension Topics",
                    description: "Explore advanced topics and prepare for next-level concepts.",
                    kind: RecommendationType::Challenge,
                    difficulty: Difficulty::Hard,
                    estimated_minutes: 45,
                    xp_reward: 250,
                },
            ],
        }
    }
}

pub fn difficulty_for(percentage: f64) -> Difficulty {
    match RecommendationTier::for_average(percentage) {
        RecommendationTier::Remedial => Difficulty::Easy,
        RecommendationTier::Reinforcement => Difficulty::Medium,
        RecommendationTier::Advanced => Difficulty::Hard,
    }
}

struct Template {
    title: &'static str,
    description: &'static str,
    kind: RecommendationType,
    difficulty: Difficulty,
    estimated_minutes: u32,
    xp_reward: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub student_id: StudentId,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub subject: String,
    pub difficulty: Difficulty,
    pub estimated_minutes: u32,
    pub xp_reward: u32,
    pub status: RecommendationStatus,
    pub source_average: f64,
    pub final_score: Option<f64>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Recommendation {
    fn transition(
        &mut self,
        from: RecommendationStatus,
        to: RecommendationStatus,
    ) -> Result<(), LifecycleError> {
        if self.status != from {
            return Err(LifecycleError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), LifecycleError> {
        self.transition(RecommendationStatus::Available, RecommendationStatus::InProgress)?;
        info!(id = %self.id, student_id = self.student_id, "recommendation started");
        Ok(())
    }

    /// Finishes an in-progress recommendation and returns the XP it earns.
    ///
    /// Without a final score the full reward is granted; with one, the reward
    /// is scaled by `score / 100`.
    pub fn complete(
        &mut self,
        final_score: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<u32, LifecycleError> {
        if let Some(score) = final_score {
            if validate_average(score).is_err() {
                return Err(LifecycleError::InvalidScore(score));
            }
        }
        self.transition(RecommendationStatus::InProgress, RecommendationStatus::Completed)?;
        self.final_score = final_score;
        self.completed_at = Some(now);

        let awarded = match final_score {
            Some(score) => (self.xp_reward as f64 * score / 100.0).round() as u32,
            None => self.xp_reward,
        };
        info!(id = %self.id, student_id = self.student_id, awarded, "recommendation completed");
        Ok(awarded)
    }
}

/// Running XP total for one student, credited once per completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpLedger {
    pub student_id: StudentId,
    pub total_xp: u64,
    pub completions: u32,
}

impl XpLedger {
    pub fn new(student_id: StudentId) -> Self {
        XpLedger {
            student_id,
            total_xp: 0,
            completions: 0,
        }
    }

    pub fn credit(&mut self, awarded: u32) {
        self.total_xp = self.total_xp.saturating_add(u64::from(awarded));
        self.completions = self.completions.saturating_add(1);
    }
}

pub trait IdSource {
    fn next_id(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdSource for UuidIds {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn starting_at(start: u64) -> Self {
        SequentialIds {
            next: AtomicU64::new(start),
        }
    }
}

impl IdSource for SequentialIds {
    fn next_id(&self) -> String {
        format!("rec-{}", self.next.fetch_add(1, Ordering::Relaxed))
    }
}

pub struct RecommendationGenerator<I = UuidIds> {
    ids: I,
}

impl Default for RecommendationGenerator<UuidIds> {
    fn default() -> Self {
        RecommendationGenerator { ids: UuidIds }
    }
}

impl<I: IdSource> RecommendationGenerator<I> {
    pub fn with_ids(ids: I) -> Self {
        RecommendationGenerator { ids }
    }

    /// Produces a fresh pair on every call. Callers that want one list per
    /// student must check their store first.
    pub fn generate(
        &self,
        student_id: StudentId,
        subject: &str,
        average: f64,
    ) -> Result<[Recommendation; 2], RecommendError> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(RecommendError::BlankSubject);
        }
        let average = validate_average(average)?;
        let tier = RecommendationTier::for_average(average);
        debug!(student_id, subject, average, ?tier, "generating recommendations");

        Ok(tier.templates().map(|template| Recommendation {
            id: self.ids.next_id(),
            student_id,
            title: template.title.replace("{s}", subject),
            description: template.description.to_string(),
            kind: template.kind,
            subject: subject.to_string(),
            difficulty: template.difficulty,
            estimated_minutes: template.estimated_minutes,
            xp_reward: template.xp_reward,
            status: RecommendationStatus::Available,
            source_average: average,
            final_score: None,
            completed_at: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassifyError;
    use chrono::TimeZone;

    fn generator() -> RecommendationGenerator<SequentialIds> {
        RecommendationGenerator::with_ids(SequentialIds::starting_at(1))
    }

    #[test]
    fn tiers_partition_on_inclusive_boundaries() {
        let gen = generator();
        let easy = gen.generate(1, "Mathematics", 69.9).unwrap();
        assert!(easy.iter().all(|r| r.difficulty == Difficulty::Easy));
        assert_eq!(easy[0].kind, RecommendationType::Remedial);
        assert_eq!(easy[1].kind, RecommendationType::Practice);

        let medium = gen.generate(1, "Mathematics", 70.0).unwrap();
        assert!(medium.iter().all(|r| r.difficulty == Difficulty::Medium));

        let medium_high = gen.generate(1, "Mathematics", 84.99).unwrap();
        assert!(medium_high.iter().all(|r| r.difficulty == Difficulty::Medium));

        let hard = gen.generate(1, "Mathematics", 85.0).unwrap();
        assert!(hard.iter().all(|r| r.difficulty == Difficulty::Hard));
        assert!(hard.iter().all(|r| r.kind == RecommendationType::Challenge));
    }

    #[test]
    fn reinforcement_pair_matches_templates() {
        let pair = generator().generate(42, "Mathematics", 85.0 - 0.5).unwrap();
        assert_eq!(pair[0].title, "Mathematics Concept Reinforcement");
        assert_eq!(pair[0].kind, RecommendationType::Review);
        assert_eq!(pair[0].xp_reward, 125);
        assert_eq!(pair[0].estimated_minutes, 35);
        assert_eq!(pair[1].title, "Mathematics Problem Solving");
        assert_eq!(pair[1].xp_reward, 150);
        assert!(pair
            .iter()
            .all(|r| r.student_id == 42 && r.status == RecommendationStatus::Available));
    }

    #[test]
    fn ids_are_unique_across_rapid_calls() {
        let gen = RecommendationGenerator::default();
        let mut ids = std::collections::HashSet::new();
        for _ in 0..50 {
            for rec in gen.generate(1, "Physics", 90.0).unwrap() {
                assert!(ids.insert(rec.id));
            }
        }
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn rejects_invalid_input() {
        let gen = generator();
        assert_eq!(
            gen.generate(1, "  ", 80.0).unwrap_err(),
            RecommendError::BlankSubject
        );
        assert_eq!(
            gen.generate(1, "Biology", 101.0).unwrap_err(),
            RecommendError::Average(ClassifyError::OutOfRange(101.0))
        );
        assert!(gen.generate(1, "Biology", f64::NAN).is_err());
    }

    #[test]
    fn difficulty_for_shares_the_partition() {
        assert_eq!(difficulty_for(0.0), Difficulty::Easy);
        assert_eq!(difficulty_for(70.0), Difficulty::Medium);
        assert_eq!(difficulty_for(100.0), Difficulty::Hard);
    }

    #[test]
    fn lifecycle_moves_forward_only() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let [mut rec, _] = generator().generate(5, "English", 60.0).unwrap();

        assert!(matches!(
            rec.complete(None, now),
            Err(LifecycleError::InvalidTransition { .. })
        ));

        rec.start().unwrap();
        assert_eq!(rec.status, RecommendationStatus::InProgress);
        assert!(rec.start().is_err());

        assert_eq!(rec.complete(Some(120.0), now), Err(LifecycleError::InvalidScore(120.0)));
        assert_eq!(rec.status, RecommendationStatus::InProgress);

        let awarded = rec.complete(Some(80.0), now).unwrap();
        assert_eq!(awarded, 80);
        assert_eq!(rec.status, RecommendationStatus::Completed);
        assert_eq!(rec.final_score, Some(80.0));
        assert_eq!(rec.completed_at, Some(now));
        assert!(rec.complete(None, now).is_err());
    }

    #[test]
    fn completion_without_score_awards_full_xp() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let [_, mut rec] = generator().generate(5, "English", 95.0).unwrap();
        rec.start().unwrap();
        assert_eq!(rec.complete(None, now).unwrap(), 250);
    }

    #[test]
    fn ledger_accumulates_awarded_xp() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let [mut first, mut second] = generator().generate(6, "Science", 60.0).unwrap();
        let mut ledger = XpLedger::new(6);

        first.start().unwrap();
        ledger.credit(first.complete(None, now).unwrap());
        second.start().unwrap();
        ledger.credit(second.complete(Some(50.0), now).unwrap());

        let expected = u64::from(first.xp_reward) + (second.xp_reward as f64 * 0.5).round() as u64;
        assert_eq!(ledger.total_xp, expected);
        assert_eq!(ledger.completions, 2);
        assert!(second.complete(None, now).is_err());
        assert_eq!(ledger.completions, 2);
    }

    #[test]
    fn ledger_saturates_instead_of_wrapping() {
        let mut ledger = XpLedger {
            student_id: 1,
            total_xp: u64::MAX - 5,
            completions: u32::MAX,
        };
        ledger.credit(100);
        assert_eq!(ledger.total_xp, u64::MAX);
        assert_eq!(ledger.completions, u32::MAX);
    }
}
