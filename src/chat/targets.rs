//! Which sections a chat instruction is about.

use crate::sections::is_reference_section;
use crate::textutil::contains_any_word;

pub const ALL_SYNONYMS: &[&str] = &["all", "everything", "entire", "whole"];

/// Words of a section name shorter than this never identify it on their own.
const SIGNIFICANT_WORD_CHARS: usize = 4;

/// True when `lower` (a lowercased instruction) names `section` by its full name
/// or by one of its significant words.
pub fn mentions_section(lower: &str, section: &str) -> bool {
    let name = section.to_lowercase();
    if lower.contains(name.as_str()) {
        return true;
    }
    name.split_whitespace()
        .filter(|w| w.chars().count() >= SIGNIFICANT_WORD_CHARS)
        .any(|w| lower.contains(w))
}

/// Sections explicitly named in the instruction, in section order.
pub fn named_sections(lower: &str, sections: &[String]) -> Vec<String> {
    sections
        .iter()
        .filter(|s| mentions_section(lower, s))
        .cloned()
        .collect()
}

/// Target sections for a content edit. "All" synonyms select every section;
/// otherwise named sections; otherwise the first prose section so the instruction
/// still does something.
pub fn resolve_targets(lower: &str, sections: &[String]) -> Vec<String> {
    if contains_any_word(lower, ALL_SYNONYMS) {
        return sections.to_vec();
    }
    let named = named_sections(lower, sections);
    if !named.is_empty() {
        return named;
    }
    sections
        .iter()
        .find(|s| !is_reference_section(s))
        .cloned()
        .into_iter()
        .collect()
}

pub fn is_reference_request(lower: &str, targets: &[String]) -> bool {
    lower.contains("reference") || targets.iter().any(|t| is_reference_section(t))
}
