//! Heuristic filter deciding which questions are worth caching
//!
//! Only general, on-topic questions are cached: those are the ones other
//! users are likely to repeat. One-off questions (an order number, a street
//! address) would occupy capacity without ever producing a hit.

use tracing::debug;

/// Keywords that mark a question as on-topic for the cache
pub const CACHEABLE_KEYWORDS: [&str; 6] = [
    "pizza",
    "restaurant",
    "food",
    "delivery",
    "crust",
    "topping",
];

/// Tokens that mark a question as too specific to repeat
pub const SPECIFIC_INDICATORS: [&str; 6] = [
    "#",
    "order",
    "tracking",
    "address",
    "phone",
    "reservation",
];

/// Why a question was rejected from caching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Fewer words than the configured minimum
    TooFewWords { words: usize },

    /// No on-topic keyword present
    NoCacheableKeyword,

    /// A specificity indicator was present
    SpecificIndicator(&'static str),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::TooFewWords { words } => {
                write!(f, "too short to cache ({} words)", words)
            }
            RejectReason::NoCacheableKeyword => write!(f, "no pizza-related keyword"),
            RejectReason::SpecificIndicator(token) => {
                write!(f, "too specific to cache (token {:?})", token)
            }
        }
    }
}

/// Evaluate a question against the caching heuristics
///
/// Tokens are the lowercased whitespace-separated words of the question,
/// compared by equality. Punctuation is not stripped, so "pizza," does not
/// count as the keyword "pizza" and "#1234" does not match the "#" indicator.
pub fn evaluate(question: &str, min_words: usize) -> Option<RejectReason> {
    let lowered = question.to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();

    if words.len() < min_words {
        return Some(RejectReason::TooFewWords { words: words.len() });
    }

    if !CACHEABLE_KEYWORDS.iter().any(|kw| words.contains(kw)) {
        return Some(RejectReason::NoCacheableKeyword);
    }

    for indicator in SPECIFIC_INDICATORS {
        if words.contains(&indicator) {
            return Some(RejectReason::SpecificIndicator(indicator));
        }
    }

    None
}

/// Plain verdict wrapper around [`evaluate`], logging any rejection
pub fn should_cache(question: &str, min_words: usize) -> bool {
    match evaluate(question, min_words) {
        Some(reason) => {
            debug!(question, %reason, "skipping cache for question");
            false
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN_WORDS: usize = 4;

    #[test]
    fn test_general_question_is_cacheable() {
        assert_eq!(evaluate("best pizza in tel aviv", MIN_WORDS), None);
        assert!(should_cache("best pizza in tel aviv", MIN_WORDS));
    }

    #[test]
    fn test_short_question_rejected() {
        assert_eq!(
            evaluate("pizza near me", MIN_WORDS),
            Some(RejectReason::TooFewWords { words: 3 })
        );
    }

    #[test]
    fn test_off_topic_question_rejected() {
        assert_eq!(
            evaluate("what is the capital of france", MIN_WORDS),
            Some(RejectReason::NoCacheableKeyword)
        );
    }

    #[test]
    fn test_specific_question_rejected_by_token() {
        // "order" is a standalone token here; "#1234" never equals "#"
        assert_eq!(
            evaluate("track order #1234 for my pizza", MIN_WORDS),
            Some(RejectReason::SpecificIndicator("order"))
        );
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert_eq!(evaluate("Best PIZZA in Tel Aviv", MIN_WORDS), None);
    }

    #[test]
    fn test_punctuation_is_not_stripped() {
        // "pizza," is a different token than "pizza"
        assert_eq!(
            evaluate("where to eat pizza, downtown branch", MIN_WORDS),
            Some(RejectReason::NoCacheableKeyword)
        );
    }

    #[test]
    fn test_reject_reason_display() {
        assert_eq!(
            RejectReason::TooFewWords { words: 2 }.to_string(),
            "too short to cache (2 words)"
        );
        assert_eq!(
            RejectReason::SpecificIndicator("order").to_string(),
            "too specific to cache (token \"order\")"
        );
    }
}
