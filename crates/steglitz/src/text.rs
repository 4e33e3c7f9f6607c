//! Page merging/splitting and text cleanup helpers.
//!
//! Recognized pages are merged in page-number order with explicit
//! `--- Page N ---` separators; [`split_pages`] is the inverse for text that
//! already carries those markers.

use crate::types::PageSummary;

/// Merge page texts into one document, sorted by page number, with explicit
/// page separators.
pub fn merge_pages(pages: &[PageSummary]) -> String {
    let mut ordered: Vec<&PageSummary> = pages.iter().collect();
    ordered.sort_by_key(|p| p.page_number);

    let mut out = String::new();
    for (i, page) in ordered.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        out.push_str(&format!("--- Page {} ---\n", page.page_number));
        out.push_str(page.text.trim());
    }
    out
}

/// Split text on `--- Page N ---` markers. Returns `None` when the text
/// carries no markers at all.
pub fn split_pages(text: &str) -> Option<Vec<PageSummary>> {
    let mut pages: Vec<PageSummary> = Vec::new();
    let mut current: Option<(usize, String)> = None;

    for line in text.lines() {
        if let Some(number) = parse_page_marker(line) {
            if let Some((page_number, body)) = current.take() {
                pages.push(PageSummary {
                    page_number,
                    text: body.trim().to_string(),
                });
            }
            current = Some((number, String::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }

    if let Some((page_number, body)) = current.take() {
        pages.push(PageSummary {
            page_number,
            text: body.trim().to_string(),
        });
    }

    if pages.is_empty() { None } else { Some(pages) }
}

/// Parse a `--- Page N ---` marker line.
fn parse_page_marker(line: &str) -> Option<usize> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix("--- Page ")?;
    let digits = rest.strip_suffix(" ---")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Drop control characters OCR engines occasionally emit, preserving
/// newlines, carriage returns, and tabs.
pub fn strip_control_characters(text: &str) -> String {
    if text
        .chars()
        .any(|c| matches!(c, '\u{0000}'..='\u{001F}' | '\u{007F}') && c != '\n' && c != '\r' && c != '\t')
    {
        text.chars()
            .filter(|c| !matches!(c, '\u{0000}'..='\u{001F}' | '\u{007F}') || matches!(c, '\n' | '\r' | '\t'))
            .collect()
    } else {
        text.to_string()
    }
}
