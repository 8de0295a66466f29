//! Turns a free-form chat instruction into a [`ChatCommand`].
//!
//! Routing is keyword based: add, then delete, then content edits, then a plain
//! question. Delete and edit keywords are plain substrings. Add and style
//! keywords are matched as words with their inflections, since "add" and
//! "format" sit inside "address" and "information". Content edits carry an
//! [`EditRequest`] with the target sections and what to do with them.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::textutil::title_case;

use super::numbers::{extract_numeric_target, NumericTarget};
use super::targets::{is_reference_request, named_sections, resolve_targets};

const DELETE_KEYWORDS: &[&str] = &["remove", "delete", "drop"];
const MODIFY_KEYWORDS: &[&str] = &[
    "change", "modify", "rewrite", "expand", "shorten", "improve", "make", "keep", "reduce",
    "increase", "words", "references", "add more",
];
const EXPAND_KEYWORDS: &[&str] = &[
    "expand", "longer", "more details", "add more", "elaborate", "increase",
];
const REDUCE_KEYWORDS: &[&str] = &[
    "shorten", "reduce", "shorter", "decrease", "concise", "brief", "less",
];

const FILLER_WORDS: &[&str] = &["a", "an", "the", "new", "another", "one", "more"];

static ADD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:add(?:s|ed|ing)?|insert(?:s|ed|ing)?|includ(?:e|es|ed|ing)|create new)\b")
        .expect("add keywords")
});
static ADD_MORE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\badd(?:s|ed|ing)? more\b").expect("add more"));
static STYLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:bullet|point|list|numbered|paragraph|style|format|arrow|star)(?:s|ed|ing)?\b",
    )
    .expect("style keywords")
});

static NAMED_SECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bsection\s+(?:called|named|titled|on|about|for)\s+(.+)$").expect("named section")
});
static VERB_SECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:add(?:s|ed|ing)?|insert(?:s|ed|ing)?|includ(?:e|es|ed|ing)|create new)\s+(?:(?:a|an|the|new|another)\s+)*(.+?)\s+section\b",
    )
    .expect("verb section")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListStyle {
    Paragraph,
    Bullet,
    Arrow,
    Star,
    Numbered,
}

impl ListStyle {
    /// Arrow, then star, then numbered, then paragraph; plain bullets otherwise.
    pub fn detect(lower: &str) -> Self {
        if lower.contains("arrow") {
            Self::Arrow
        } else if lower.contains("star") {
            Self::Star
        } else if lower.contains("number") {
            Self::Numbered
        } else if lower.contains("paragraph") {
            Self::Paragraph
        } else {
            Self::Bullet
        }
    }

    pub fn bullet(self) -> Option<char> {
        match self {
            Self::Bullet => Some('•'),
            Self::Arrow => Some('→'),
            Self::Star => Some('★'),
            Self::Paragraph | Self::Numbered => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Paragraph => "paragraph",
            Self::Bullet => "bullet points",
            Self::Arrow => "arrow bullets",
            Self::Star => "star bullets",
            Self::Numbered => "numbered list",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EditIntent {
    StyleChange { style: ListStyle },
    SpecificTarget { target: NumericTarget },
    Expand,
    Reduce,
    Maintain,
    Modify,
}

/// One parsed content-edit instruction. Built per chat turn, never stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EditRequest {
    pub instruction: String,
    pub targets: Vec<String>,
    pub intent: EditIntent,
    pub reference_request: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ChatCommand {
    AddSection { name: Option<String> },
    DeleteSection { names: Vec<String> },
    Modify(EditRequest),
    Question { instruction: String },
}

fn contains_any(lower: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| lower.contains(kw))
}

/// "add more" asks for a longer section, not a new one.
fn is_add_instruction(lower: &str) -> bool {
    ADD_RE.is_match(lower) && !ADD_MORE_RE.is_match(lower)
}

/// Routes an instruction against the current section names.
pub fn classify(instruction: &str, sections: &[String]) -> ChatCommand {
    let lower = instruction.trim().to_lowercase();
    if is_add_instruction(&lower) {
        return ChatCommand::AddSection {
            name: requested_section_name(&lower),
        };
    }
    if contains_any(&lower, DELETE_KEYWORDS) {
        return ChatCommand::DeleteSection {
            names: named_sections(&lower, sections),
        };
    }
    if contains_any(&lower, MODIFY_KEYWORDS) || STYLE_RE.is_match(&lower) {
        return ChatCommand::Modify(interpret(instruction, sections));
    }
    ChatCommand::Question {
        instruction: instruction.trim().to_string(),
    }
}

/// Targets, reference flavour, numeric target and intent for a content edit.
pub fn interpret(instruction: &str, sections: &[String]) -> EditRequest {
    let lower = instruction.trim().to_lowercase();
    let targets = resolve_targets(&lower, sections);
    let reference_request = is_reference_request(&lower, &targets);
    let intent = match extract_numeric_target(&lower, reference_request) {
        Some(target) => EditIntent::SpecificTarget { target },
        None if STYLE_RE.is_match(&lower) => EditIntent::StyleChange {
            style: ListStyle::detect(&lower),
        },
        None if contains_any(&lower, EXPAND_KEYWORDS) => EditIntent::Expand,
        None if contains_any(&lower, REDUCE_KEYWORDS) => EditIntent::Reduce,
        None if lower.contains("keep") => EditIntent::Maintain,
        None => EditIntent::Modify,
    };
    EditRequest {
        instruction: instruction.trim().to_string(),
        targets,
        intent,
        reference_request,
    }
}

/// Name of the section an add instruction asks for, title-cased.
pub fn requested_section_name(lower: &str) -> Option<String> {
    let raw = NAMED_SECTION_RE
        .captures(lower)
        .or_else(|| VERB_SECTION_RE.captures(lower))
        .and_then(|c| c.get(1))?
        .as_str();
    let cleaned = raw
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .trim_matches(['"', '\'']);
    if cleaned.split_whitespace().all(|w| FILLER_WORDS.contains(&w)) {
        return None;
    }
    Some(title_case(cleaned))
}
