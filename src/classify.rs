use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ClassifyError, SchemeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StatusTier {
    Excellent,
    Good,
    NeedsAttention,
    Struggling,
}

impl StatusTier {
    pub const ALL: [StatusTier; 4] = [
        StatusTier::Excellent,
        StatusTier::Good,
        StatusTier::NeedsAttention,
        StatusTier::Struggling,
    ];

    /// 0 is the best tier.
    pub fn rank(&self) -> usize {
        match self {
            StatusTier::Excellent => 0,
            StatusTier::Good => 1,
            StatusTier::NeedsAttention => 2,
            StatusTier::Struggling => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusTier::Excellent => "excellent",
            StatusTier::Good => "good",
            StatusTier::NeedsAttention => "needs_attention",
            StatusTier::Struggling => "struggling",
        }
    }

    pub fn needs_support(&self) -> bool {
        matches!(self, StatusTier::NeedsAttention | StatusTier::Struggling)
    }
}

impl fmt::Display for StatusTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    F,
}

impl LetterGrade {
    pub const ALL: [LetterGrade; 5] = [
        LetterGrade::A,
        LetterGrade::B,
        LetterGrade::C,
        LetterGrade::D,
        LetterGrade::F,
    ];

    pub fn rank(&self) -> usize {
        match self {
            LetterGrade::A => 0,
            LetterGrade::B => 1,
            LetterGrade::C => 2,
            LetterGrade::D => 3,
            LetterGrade::F => 4,
        }
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            LetterGrade::A => "A",
            LetterGrade::B => "B",
            LetterGrade::C => "C",
            LetterGrade::D => "D",
            LetterGrade::F => "F",
        };
        f.write_str(letter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Status,
    Letter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Status(StatusTier),
    Letter(LetterGrade),
}

impl Tier {
    pub fn rank(&self) -> usize {
        match self {
            Tier::Status(tier) => tier.rank(),
            Tier::Letter(grade) => grade.rank(),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Status(tier) => fmt::Display::fmt(tier, f),
            Tier::Letter(grade) => fmt::Display::fmt(grade, f),
        }
    }
}

/// The one threshold table every caller classifies against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationScheme {
    status_cuts: [f64; 3],
    letter_cuts: [f64; 4],
}

impl Default for ClassificationScheme {
    fn default() -> Self {
        ClassificationScheme {
            status_cuts: [90.0, 80.0, 70.0],
            letter_cuts: [90.0, 80.0, 70.0, 60.0],
        }
    }
}

fn validate_cuts(cuts: &[f64]) -> Result<(), SchemeError> {
    if let Some(&bad) = cuts
        .iter()
        .find(|c| !c.is_finite() || **c < 0.0 || **c > 100.0)
    {
        return Err(SchemeError::CutOutOfRange(bad));
    }
    if cuts.windows(2).any(|pair| pair[0] <= pair[1]) {
        return Err(SchemeError::NotDescending(cuts.to_vec()));
    }
    Ok(())
}

pub fn validate_average(average: f64) -> Result<f64, ClassifyError> {
    if !average.is_finite() {
        return Err(ClassifyError::NonFinite(average));
    }
    if !(0.0..=100.0).contains(&average) {
        return Err(ClassifyError::OutOfRange(average));
    }
    Ok(average)
}

/// Walks `cuts` from the highest down; the first `average >= cut` wins and
/// anything below every cut lands on the last tier.
fn pick<T: Copy>(average: f64, cuts: &[f64], tiers: &[T]) -> T {
    cuts.iter()
        .position(|cut| average >= *cut)
        .map(|idx| tiers[idx])
        .unwrap_or(tiers[tiers.len() - 1])
}

impl ClassificationScheme {
    pub fn new(status_cuts: [f64; 3], letter_cuts: [f64; 4]) -> Result<Self, SchemeError> {
        validate_cuts(&status_cuts)?;
        validate_cuts(&letter_cuts)?;
        Ok(ClassificationScheme {
            status_cuts,
            letter_cuts,
        })
    }

    pub fn status_cuts(&self) -> [f64; 3] {
        self.status_cuts
    }

    pub fn letter_cuts(&self) -> [f64; 4] {
        self.letter_cuts
    }

    pub fn classify(&self, average: f64, scheme: Scheme) -> Result<Tier, ClassifyError> {
        Ok(match scheme {
            Scheme::Status => Tier::Status(self.status(average)?),
            Scheme::Letter => Tier::Letter(self.letter(average)?),
        })
    }

    pub fn status(&self, average: f64) -> Result<StatusTier, ClassifyError> {
        let average = validate_average(average)?;
        Ok(pick(average, &self.status_cuts, &StatusTier::ALL))
    }

    pub fn letter(&self, average: f64) -> Result<LetterGrade, ClassifyError> {
        let average = validate_average(average)?;
        Ok(pick(average, &self.letter_cuts, &LetterGrade::ALL))
    }

    /// Counts per letter grade, best first. Invalid percentages are left out.
    pub fn letter_distribution<I>(&self, percentages: I) -> Vec<(LetterGrade, usize)>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut counts = [0usize; 5];
        for pct in percentages {
            if let Ok(grade) = self.letter(pct) {
                counts[grade.rank()] += 1;
            }
        }
        LetterGrade::ALL.iter().copied().zip(counts).collect()
    }
}
