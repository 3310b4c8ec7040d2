use thiserror::Error;

use crate::models::StudentId;
use crate::recommend::RecommendationStatus;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClassifyError {
    #[error("average {0} is not a finite number")]
    NonFinite(f64),
    #[error("average {0} is outside 0..=100")]
    OutOfRange(f64),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemeError {
    #[error("cut points must be finite and within 0..=100, got {0}")]
    CutOutOfRange(f64),
    #[error("cut points must be strictly descending: {0:?}")]
    NotDescending(Vec<f64>),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecommendError {
    #[error("subject must not be blank")]
    BlankSubject,
    #[error(transparent)]
    Average(#[from] ClassifyError),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LifecycleError {
    #[error("cannot move recommendation {id} from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: RecommendationStatus,
        to: RecommendationStatus,
    },
    #[error("final score {0} is outside 0..=100")]
    InvalidScore(f64),
    #[error("recommendation {id} not found for student {student_id}")]
    NotFound { id: String, student_id: StudentId },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {key}: {value}")]
    Env { key: String, value: String },
    #[error("cache ttl must be greater than zero")]
    ZeroTtl,
    #[error("cache ttl of {secs}s exceeds the {max}s limit")]
    TtlTooLarge { secs: u64, max: u64 },
    #[error("empty_average must be within 0..=100, got {0}")]
    EmptyAverage(f64),
    #[error(transparent)]
    Scheme(#[from] SchemeError),
}
