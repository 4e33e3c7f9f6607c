//! Scanned-vs-text-based document classification.
//!
//! The heuristic is an ordered rule list; the first matching rule wins, which
//! makes the outcome deterministic for any (text, page count) pair. Documents
//! that report zero pages have both density metrics forced to 0 and therefore
//! always classify as scanned.

use crate::config::ClassifierConfig;
use serde::Serialize;

/// Outcome of the classification heuristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub is_scanned: bool,
    pub reason: &'static str,
}

pub const REASON_NO_TEXT: &str = "no extractable text";
pub const REASON_FEW_WORDS: &str = "too few total words";
pub const REASON_LOW_WORD_DENSITY: &str = "low word density";
pub const REASON_LOW_CHAR_DENSITY: &str = "low character density";
pub const REASON_SUFFICIENT_TEXT: &str = "sufficient text content";

/// Classify a document from its extracted text layer and page count.
pub fn classify(text: &str, page_count: usize, thresholds: &ClassifierConfig) -> Classification {
    let trimmed = text.trim();
    let text_length = trimmed.chars().count();
    let word_count = trimmed.split_whitespace().count();

    let (words_per_page, chars_per_page) = if page_count == 0 {
        (0.0, 0.0)
    } else {
        (
            word_count as f64 / page_count as f64,
            text_length as f64 / page_count as f64,
        )
    };

    if text_length == 0 {
        return Classification {
            is_scanned: true,
            reason: REASON_NO_TEXT,
        };
    }
    if word_count < thresholds.min_word_count {
        return Classification {
            is_scanned: true,
            reason: REASON_FEW_WORDS,
        };
    }
    if words_per_page < thresholds.min_words_per_page {
        return Classification {
            is_scanned: true,
            reason: REASON_LOW_WORD_DENSITY,
        };
    }
    if chars_per_page < thresholds.min_chars_per_page {
        return Classification {
            is_scanned: true,
            reason: REASON_LOW_CHAR_DENSITY,
        };
    }

    Classification {
        is_scanned: false,
        reason: REASON_SUFFICIENT_TEXT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> ClassifierConfig {
        ClassifierConfig::default()
    }

    fn passage(words: usize) -> String {
        (0..words).map(|i| format!("word{:03}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_empty_text_is_scanned() {
        let c = classify("", 1, &thresholds());
        assert!(c.is_scanned);
        assert_eq!(c.reason, REASON_NO_TEXT);
    }

    #[test]
    fn test_whitespace_only_is_scanned() {
        let c = classify("   \n\t  ", 3, &thresholds());
        assert!(c.is_scanned);
        assert_eq!(c.reason, REASON_NO_TEXT);
    }

    #[test]
    fn test_too_few_words() {
        let c = classify("Page 1 only", 1, &thresholds());
        assert!(c.is_scanned);
        assert_eq!(c.reason, REASON_FEW_WORDS);
    }

    #[test]
    fn test_low_word_density() {
        // 30 words over 2 pages: past the total-word floor, under 50 words/page.
        let c = classify(&passage(30), 2, &thresholds());
        assert!(c.is_scanned);
        assert_eq!(c.reason, REASON_LOW_WORD_DENSITY);
    }

    #[test]
    fn test_low_char_density() {
        // 60 short words on one page: 60 words/page but under 200 chars/page.
        let text = (0..60).map(|_| "ab").collect::<Vec<_>>().join(" ");
        let c = classify(&text, 1, &thresholds());
        assert!(c.is_scanned);
        assert_eq!(c.reason, REASON_LOW_CHAR_DENSITY);
    }

    #[test]
    fn test_dense_single_page_is_text_based() {
        // ~120 words, each 7 chars, well over 200 chars on one page.
        let c = classify(&passage(120), 1, &thresholds());
        assert!(!c.is_scanned);
        assert_eq!(c.reason, REASON_SUFFICIENT_TEXT);
    }

    #[test]
    fn test_zero_pages_always_scanned() {
        let c = classify(&passage(500), 0, &thresholds());
        assert!(c.is_scanned);
        assert_eq!(c.reason, REASON_LOW_WORD_DENSITY);
    }

    #[test]
    fn test_rule_order_word_count_before_density() {
        // 5 words on 0 pages: rule 2 fires before the density rules.
        let c = classify("one two three four five", 0, &thresholds());
        assert_eq!(c.reason, REASON_FEW_WORDS);
    }

    #[test]
    fn test_deterministic() {
        let text = passage(80);
        let a = classify(&text, 2, &thresholds());
        let b = classify(&text, 2, &thresholds());
        assert_eq!(a, b);
    }
}
