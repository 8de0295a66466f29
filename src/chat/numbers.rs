//! Numeric targets in chat instructions ("40 words", "to only 7").
//!
//! Patterns are tried in a fixed order and the first match wins. Word-count
//! phrasing is only considered for prose requests and reference-count phrasing
//! only for reference requests; the generic forms apply to both.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetUnit {
    Words,
    References,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct NumericTarget {
    pub value: usize,
    pub unit: TargetUnit,
}

static WORDS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*words?\b").expect("words"));
static REF_TO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bto\s+(?:only\s+)?(\d+)").expect("to n"));
static REF_COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:keep\s+)?(\d+)\s*references?").expect("n references"));
static IN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bin\s+(\d+)").expect("in n"));
static VERB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:to|make|change|rewrite|expand|write|keep)\s+(?:only\s+)?(\d+)")
        .expect("verb n")
});

fn first_capture(re: &Regex, text: &str) -> Option<usize> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// `lower` must already be lowercased.
pub fn extract_numeric_target(lower: &str, reference_request: bool) -> Option<NumericTarget> {
    let (unit, mut patterns): (TargetUnit, Vec<&Regex>) = if reference_request {
        (TargetUnit::References, vec![&*REF_TO_RE, &*REF_COUNT_RE])
    } else {
        (TargetUnit::Words, vec![&*WORDS_RE])
    };
    patterns.extend([&*IN_RE, &*VERB_RE]);
    patterns
        .into_iter()
        .find_map(|re| first_capture(re, lower))
        .map(|value| NumericTarget { value, unit })
}
