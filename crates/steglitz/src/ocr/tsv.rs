//! Parsing of tesseract's TSV output.
//!
//! TSV rows carry `level page_num block_num par_num line_num word_num left
//! top width height conf text`; words are level-5 rows. Text is rebuilt in
//! block/paragraph/line order and the page confidence is the mean word
//! confidence.

use crate::types::Recognition;

const TSV_MIN_FIELDS: usize = 12;
const TSV_WORD_LEVEL: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TsvWord {
    pub text: String,
    pub confidence: f64,
    pub block: u32,
    pub par: u32,
    pub line: u32,
}

pub(crate) fn parse_words(tsv_data: &str) -> Vec<TsvWord> {
    let mut words = Vec::new();

    for (line_num, line) in tsv_data.lines().enumerate() {
        if line_num == 0 {
            continue;
        }

        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < TSV_MIN_FIELDS {
            continue;
        }

        let level = fields[0].parse::<u32>().unwrap_or(0);
        if level != TSV_WORD_LEVEL {
            continue;
        }

        let text = fields[11].trim();
        if text.is_empty() {
            continue;
        }

        words.push(TsvWord {
            text: text.to_string(),
            confidence: fields[10].parse::<f64>().unwrap_or(-1.0).max(0.0),
            block: fields[2].parse().unwrap_or(0),
            par: fields[3].parse().unwrap_or(0),
            line: fields[4].parse().unwrap_or(0),
        });
    }

    words
}

/// Rebuild a [`Recognition`] from raw TSV output.
pub(crate) fn recognition_from_tsv(tsv_data: &str) -> Recognition {
    let words = parse_words(tsv_data);
    if words.is_empty() {
        return Recognition::empty();
    }

    let mut text = String::new();
    let mut previous: Option<(u32, u32, u32)> = None;
    for word in &words {
        let key = (word.block, word.par, word.line);
        match previous {
            None => {}
            Some(prev) if prev == key => text.push(' '),
            Some((prev_block, _, _)) if prev_block != key.0 => text.push_str("\n\n"),
            Some(_) => text.push('\n'),
        }
        text.push_str(&word.text);
        previous = Some(key);
    }

    let confidence = words.iter().map(|w| w.confidence).sum::<f64>() / words.len() as f64;

    Recognition {
        text,
        confidence,
        word_count: words.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word_row(block: u32, par: u32, line: u32, conf: f64, text: &str) -> String {
        format!("5\t1\t{}\t{}\t{}\t0\t10\t10\t40\t12\t{}\t{}", block, par, line, conf, text)
    }

    #[test]
    fn test_parse_words_basic() {
        let tsv = format!("{}\n{}\n{}", HEADER, word_row(1, 1, 1, 95.5, "Hello"), word_row(1, 1, 1, 92.3, "World"));
        let words = parse_words(&tsv);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "Hello");
        assert_eq!(words[0].confidence, 95.5);
    }

    #[test]
    fn test_parse_skips_non_word_levels() {
        let tsv = format!(
            "{}\n4\t1\t1\t1\t1\t0\t10\t10\t40\t12\t-1\t\n{}",
            HEADER,
            word_row(1, 1, 1, 90.0, "only")
        );
        let words = parse_words(&tsv);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].text, "only");
    }

    #[test]
    fn test_parse_skips_malformed_rows() {
        let tsv = format!("{}\nnot\ttabbed\tenough\n{}", HEADER, word_row(1, 1, 1, 90.0, "kept"));
        assert_eq!(parse_words(&tsv).len(), 1);
    }

    #[test]
    fn test_negative_confidence_clamped() {
        let tsv = format!("{}\n{}", HEADER, word_row(1, 1, 1, -1.0, "word"));
        let words = parse_words(&tsv);
        assert_eq!(words[0].confidence, 0.0);
    }

    #[test]
    fn test_recognition_joins_lines() {
        let tsv = format!(
            "{}\n{}\n{}\n{}",
            HEADER,
            word_row(1, 1, 1, 90.0, "first"),
            word_row(1, 1, 1, 92.0, "line"),
            word_row(1, 1, 2, 94.0, "second")
        );
        let r = recognition_from_tsv(&tsv);
        assert_eq!(r.text, "first line\nsecond");
        assert_eq!(r.word_count, 3);
        assert!((r.confidence - 92.0).abs() < 1e-9);
    }

    #[test]
    fn test_recognition_block_break() {
        let tsv = format!(
            "{}\n{}\n{}",
            HEADER,
            word_row(1, 1, 1, 90.0, "alpha"),
            word_row(2, 1, 1, 90.0, "beta")
        );
        let r = recognition_from_tsv(&tsv);
        assert_eq!(r.text, "alpha\n\nbeta");
    }

    #[test]
    fn test_recognition_empty_input() {
        let r = recognition_from_tsv(HEADER);
        assert_eq!(r, Recognition::empty());
    }
}
