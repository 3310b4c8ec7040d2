use tracing::{debug, info};

use crate::aggregate::{aggregate_class, aggregate_student, ClassAggregate};
use crate::cache::{AggregateRepository, CachePolicy};
use crate::classify::ClassificationScheme;
use crate::config::Config;
use crate::error::{ClassifyError, ConfigError, RecommendError};
use crate::models::{GradeRecord, Student, StudentAggregate, StudentId, SubjectAverage};
use crate::recommend::{IdSource, Recommendation, RecommendationGenerator};
use crate::roster::StudentOverview;

/// What `recommend` should do with the recommendations already stored for a
/// student and subject.
#[derive(Debug, Clone, PartialEq)]
pub enum RecommendationPlan {
    Reuse(Vec<Recommendation>),
    Generate,
}

impl RecommendationPlan {
    pub fn decide(stored: Vec<Recommendation>, refresh: bool) -> Self {
        if refresh || stored.is_empty() {
            RecommendationPlan::Generate
        } else {
            RecommendationPlan::Reuse(stored)
        }
    }
}

/// Aggregation, classification and recommendation behind one cache.
pub struct Analytics<R, I> {
    scheme: ClassificationScheme,
    policy: CachePolicy,
    empty_average: f64,
    cache: R,
    generator: RecommendationGenerator<I>,
}

impl<R: AggregateRepository, I: IdSource> Analytics<R, I> {
    pub fn new(
        config: &Config,
        cache: R,
        generator: RecommendationGenerator<I>,
    ) -> Result<Self, ConfigError> {
        Ok(Analytics {
            scheme: config.scheme()?,
            policy: config.cache_policy()?,
            empty_average: config.empty_average,
            cache,
            generator,
        })
    }

    pub fn scheme(&self) -> &ClassificationScheme {
        &self.scheme
    }

    pub fn student_aggregate(
        &mut self,
        student_id: StudentId,
        records: &[GradeRecord],
    ) -> StudentAggregate {
        if let Some(cached) = self.cache.get(student_id) {
            return cached.aggregate;
        }
        let aggregate = aggregate_student(student_id, records, self.empty_average);
        self.cache.put(student_id, aggregate.clone(), self.policy);
        aggregate
    }

    /// Drops the cached aggregate so the next read recomputes.
    pub fn refresh(&mut self, student_id: StudentId) {
        debug!(student_id, "refreshing aggregate");
        self.cache.invalidate(student_id);
    }

    pub fn class_aggregate(&self, records: &[GradeRecord]) -> ClassAggregate {
        aggregate_class(records, self.empty_average)
    }

    pub fn overviews(
        &mut self,
        students: &[Student],
        records: &[GradeRecord],
    ) -> Result<Vec<StudentOverview>, ClassifyError> {
        students
            .iter()
            .map(|student| {
                let aggregate = self.student_aggregate(student.id, records);
                StudentOverview::build(student, &aggregate, &self.scheme)
            })
            .collect()
    }

    /// The student's own spelling of `subject`, matched without regard to
    /// case. Falls back to the trimmed input when no grades carry it.
    pub fn resolve_subject(
        &mut self,
        student_id: StudentId,
        subject: &str,
        records: &[GradeRecord],
    ) -> String {
        let aggregate = self.student_aggregate(student_id, records);
        match_subject(&aggregate, subject)
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| subject.trim().to_string())
    }

    /// Generates against the subject average when the student has grades in
    /// that subject, otherwise against the overall average.
    pub fn recommend(
        &mut self,
        student_id: StudentId,
        subject: &str,
        records: &[GradeRecord],
    ) -> Result<[Recommendation; 2], RecommendError> {
        let aggregate = self.student_aggregate(student_id, records);
        let (subject, average) = match match_subject(&aggregate, subject) {
            Some((name, subject_average)) => (name.to_string(), subject_average.average),
            None => {
                info!(
                    student_id,
                    subject,
                    "no grades in subject, using overall average"
                );
                (subject.trim().to_string(), aggregate.overall_average)
            }
        };
        self.generator.generate(student_id, &subject, average)
    }
}

fn match_subject<'a>(
    aggregate: &'a StudentAggregate,
    subject: &str,
) -> Option<(&'a str, &'a SubjectAverage)> {
    let wanted = subject.trim();
    aggregate
        .subject_averages
        .get_key_value(wanted)
        .or_else(|| {
            aggregate
                .subject_averages
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
        })
        .map(|(name, average)| (name.as_str(), average))
}
