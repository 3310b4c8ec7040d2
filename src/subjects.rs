use tracing::{debug, warn};

use crate::models::Subject;

pub const FALLBACK_SUBJECT: &str = "General";

pub fn default_keywords() -> Vec<String> {
    [
        "Mathematics",
        "Science",
        "English",
        "History",
        "Physics",
        "Chemistry",
        "Biology",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Resolves the subject of an incoming grade once, at ingestion.
///
/// An explicit subject wins. Otherwise the title prefix is matched against
/// `keywords`, then the feedback text; a miss falls back to
/// [`FALLBACK_SUBJECT`] and is logged.
pub fn infer_subject(
    explicit: Option<&str>,
    title: &str,
    feedback: &str,
    keywords: &[String],
) -> Subject {
    if let Some(name) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        return Subject::authoritative(name);
    }

    let title_lower = title.trim().to_lowercase();
    if let Some(keyword) = keywords
        .iter()
        .find(|k| !k.is_empty() && title_lower.starts_with(&k.to_lowercase()))
    {
        debug!(title, subject = %keyword, "subject inferred from title");
        return Subject::inferred(keyword.clone());
    }

    let feedback_lower = feedback.to_lowercase();
    if let Some(keyword) = keywords
        .iter()
        .find(|k| !k.is_empty() && feedback_lower.contains(&k.to_lowercase()))
    {
        debug!(title, subject = %keyword, "subject inferred from feedback");
        return Subject::inferred(keyword.clone());
    }

    warn!(title, "no subject could be inferred, filing under {FALLBACK_SUBJECT}");
    Subject::inferred(FALLBACK_SUBJECT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubjectSource;

    #[test]
    fn explicit_subject_is_authoritative() {
        let subject = infer_subject(Some(" Physics "), "Lab 3", "", &default_keywords());
        assert_eq!(subject.name, "Physics");
        assert_eq!(subject.source, SubjectSource::Authoritative);
    }

    #[test]
    fn title_prefix_beats_feedback() {
        let subject = infer_subject(
            None,
            "history essay on trade routes",
            "good use of Biology examples",
            &default_keywords(),
        );
        assert_eq!(subject, Subject::inferred("History"));
    }

    #[test]
    fn feedback_is_searched_when_title_misses() {
        let subject = infer_subject(
            Some("   "),
            "Quiz 4",
            "Review your chemistry notation",
            &default_keywords(),
        );
        assert_eq!(subject, Subject::inferred("Chemistry"));
    }

    #[test]
    fn unmatched_records_fall_back_to_general() {
        let subject = infer_subject(None, "Quiz 4", "well done", &default_keywords());
        assert_eq!(subject, Subject::inferred(FALLBACK_SUBJECT));
    }
}
