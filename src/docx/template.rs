//! Section names from a template's marks table.
//!
//! The marks table is the first body table that either carries a "(N marks)"
//! annotation or mentions one of a few assessment keywords. Its first row holds
//! one heading per cell, decorated with score annotations that are stripped here.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::sections::{default_sections, is_reference_section, REFERENCES_SECTION};
use crate::textutil::collapse_whitespace;

use super::body::{BodyBlock, DocumentBody, TableGrid};
use super::package::DocxPackage;

static MARKS_ANNOTATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([0-9]+\s*[Mm]arks?\)").expect("marks annotation"));
static PARENS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").expect("parens"));
static BRACKETS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").expect("brackets"));
static MARKS_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[Mm]arks?\b").expect("marks"));
static CONJUNCTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+and\s+|\s+&\s+").expect("conjunction"));

const MARKS_KEYWORDS: &[&str] = &["marks awarded", "marks", "objective", "analysis", "solution"];
const RESERVED_WORDS: &[&str] = &[
    "total",
    "marks",
    "awarded",
    "marks awarded",
    "co",
    "po",
    "btl",
    "grand total",
];

/// A marks-table signal over a table's concatenated cell text.
type TableSignal = fn(&str) -> bool;

const TABLE_SIGNALS: &[(&str, TableSignal)] = &[
    ("marks annotation", has_marks_annotation),
    ("marks keyword", has_marks_keyword),
];

pub fn has_marks_annotation(table_text: &str) -> bool {
    MARKS_ANNOTATION_RE.is_match(table_text)
}

pub fn has_marks_keyword(table_text: &str) -> bool {
    let lower = table_text.to_lowercase();
    MARKS_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Ordered section names for the template at `path`. Never fails: any read error
/// or missing marks table yields the default section list.
pub fn extract_sections(path: &Path) -> Vec<String> {
    match try_extract_sections(path) {
        Ok(Some(sections)) => {
            info!(template = %path.display(), ?sections, "extracted template sections");
            sections
        }
        Ok(None) => {
            info!(template = %path.display(), "no marks table sections; using defaults");
            default_sections()
        }
        Err(err) => {
            warn!(template = %path.display(), error = %format!("{err:#}"), "template analysis failed; using defaults");
            default_sections()
        }
    }
}

fn try_extract_sections(path: &Path) -> anyhow::Result<Option<Vec<String>>> {
    let pkg = DocxPackage::read(path)?;
    let part = pkg.main_document()?;
    let body = DocumentBody::from_part(&part)?;
    let tables: Vec<&BodyBlock> = body
        .table_indices()
        .into_iter()
        .map(|i| &body.blocks[i])
        .collect();
    Ok(sections_from_tables(tables.iter().map(|b| TableGrid::parse(&b.events))))
}

/// Picks the marks table and derives the section list from it. `None` when no
/// table matches or its first row yields nothing.
pub fn sections_from_tables(tables: impl IntoIterator<Item = TableGrid>) -> Option<Vec<String>> {
    let marks_table = tables.into_iter().enumerate().find_map(|(idx, grid)| {
        let text = table_text(&grid);
        TABLE_SIGNALS
            .iter()
            .find(|(_, signal)| signal(&text))
            .map(|(label, _)| {
                debug!(table = idx + 1, signal = *label, "selected marks table");
                grid
            })
    })?;

    let candidates = first_row_candidates(&marks_table);
    if candidates.is_empty() {
        return None;
    }
    Some(split_reference_candidates(candidates))
}

fn table_text(grid: &TableGrid) -> String {
    grid.rows
        .iter()
        .flat_map(|r| r.cells.iter())
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_row_candidates(grid: &TableGrid) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let Some(row) = grid.rows.first() else {
        return out;
    };
    for cell in &row.cells {
        let Some(name) = clean_heading_cell(&cell.text) else {
            continue;
        };
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// Cleans one heading cell. `None` when the cell is not a section heading.
pub fn clean_heading_cell(raw: &str) -> Option<String> {
    let flat = collapse_whitespace(&raw.replace(['\n', '\r'], " "));
    if flat.is_empty() {
        return None;
    }
    let cleaned = PARENS_RE.replace_all(&flat, "");
    let cleaned = BRACKETS_RE.replace_all(&cleaned, "");
    let cleaned = cleaned.replace('*', "");
    let cleaned = MARKS_WORD_RE.replace_all(&cleaned, "");
    let cleaned = collapse_whitespace(&cleaned);

    if cleaned.chars().count() < 3 {
        return None;
    }
    let lower = cleaned.to_lowercase();
    if RESERVED_WORDS.contains(&lower.as_str()) {
        return None;
    }
    if !cleaned.chars().next().is_some_and(char::is_uppercase) {
        return None;
    }
    Some(cleaned)
}

/// Splits compound headings that mention references ("Conclusion and References"),
/// keeping the other fragments, then guarantees a single trailing references entry.
pub fn split_reference_candidates(candidates: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for candidate in candidates {
        if is_reference_section(&candidate) {
            for part in CONJUNCTION_RE.split(&candidate) {
                let part = part.trim();
                if part.is_empty() || is_reference_section(part) {
                    continue;
                }
                if !out.iter().any(|s| s == part) {
                    out.push(part.to_string());
                }
            }
        } else if !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    if !out.iter().any(|s| is_reference_section(s)) {
        out.push(REFERENCES_SECTION.to_string());
    }
    out
}
