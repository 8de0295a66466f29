//! Rebuilds a finished assignment from its template.
//!
//! The template's first page (cover table, signature block) and every header and
//! footer part are kept. Placeholder content after the cover is removed, a page
//! break is added and the generated sections are appended in order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::sections::{is_reference_section, SectionSet};

use super::body::{matching_end, BlockKind, DocumentBody, TableCell, TableGrid};
use super::package::DocxPackage;
use super::paragraph::{
    page_break_run, set_justification, text_run, Justification, ParagraphSpec, RunFormat,
    BODY_FONT,
};
use super::xml::{part_fingerprint, write_events, XmlEvent};

const TOPIC_MARKERS: &[&str] = &["Assignment Topic", "Title of Journal Paper", "Journal Paper"];
const LONG_TOPIC_CHARS: usize = 60;
const HONORIFICS: &[&str] = &["Mrs.", "Mr.", "Dr."];
const HONORIFIC_LOOKAHEAD: usize = 3;
/// Numbered paragraphs before this index belong to the cover page.
const NUMBERED_LIST_MIN_INDEX: usize = 10;
const MIN_SECTION_CHARS: usize = 10;

static NUMBERED_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\s+\w+").expect("numbered line"));
static REF_BULLET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[•→★▸➤◆■\-●○]\s*").expect("reference bullet"));
static REF_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+[\.\)\\]\s*").expect("reference number"));

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildStatus {
    Success,
    Error,
}

#[derive(Clone, Debug, Serialize)]
pub struct RebuildReport {
    pub status: RebuildStatus,
    pub output_path: Option<PathBuf>,
    pub message: Option<String>,
    pub topic_injected: bool,
    pub deleted_paragraphs: usize,
    pub sections_written: usize,
}

impl RebuildReport {
    fn failed(message: String) -> Self {
        Self {
            status: RebuildStatus::Error,
            output_path: None,
            message: Some(message),
            topic_injected: false,
            deleted_paragraphs: 0,
            sections_written: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RebuildStatus::Success
    }
}

/// `Assignment_<name>_<YYYYmmdd_HHMMSS>_<tag>.docx`, where `<name>` keeps only the
/// first 15 alphanumeric characters of the student name (`Student` when none
/// remain).
pub fn output_file_name(student_name: Option<&str>, at: NaiveDateTime, tag: &str) -> String {
    let safe: String = student_name
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .take(15)
        .collect();
    let safe = if safe.is_empty() { "Student".to_string() } else { safe };
    format!("Assignment_{safe}_{}_{tag}.docx", at.format("%Y%m%d_%H%M%S"))
}

/// [`output_file_name`] with a random 8-hex-digit tag, so two documents finished
/// in the same second never share a path.
pub fn unique_output_file_name(student_name: Option<&str>, at: NaiveDateTime) -> String {
    let id = Uuid::new_v4().simple().to_string();
    output_file_name(student_name, at, &id[..8])
}

/// Writes the rebuilt document to `output_path`. Structural heuristics that find
/// nothing are skipped; only I/O or malformed-package failures produce an error
/// report.
pub fn rebuild(
    template: &Path,
    topic: &str,
    sections: &SectionSet,
    output_path: &Path,
) -> RebuildReport {
    match try_rebuild(template, topic, sections, output_path) {
        Ok(report) => {
            info!(
                output = %output_path.display(),
                topic_injected = report.topic_injected,
                deleted = report.deleted_paragraphs,
                sections = report.sections_written,
                "rebuilt document"
            );
            report
        }
        Err(err) => {
            let message = format!("{err:#}");
            error!(template = %template.display(), error = %message, "rebuild failed");
            RebuildReport::failed(message)
        }
    }
}

fn try_rebuild(
    template: &Path,
    topic: &str,
    sections: &SectionSet,
    output_path: &Path,
) -> anyhow::Result<RebuildReport> {
    let pkg = DocxPackage::read(template)?;
    let part = pkg.main_document()?;
    let mut body = DocumentBody::from_part(&part)?;

    let topic_injected = inject_topic(&mut body, topic);
    if !topic_injected {
        debug!("no topic marker found; topic cell left as is");
    }
    let deleted_paragraphs = delete_placeholder_content(&mut body);
    add_page_break(&mut body);
    let sections_written = append_content(&mut body, topic, sections);

    let xml = write_events(&body.into_events()).context("serialize document body")?;
    let mut replacements = HashMap::new();
    replacements.insert(part.name.clone(), xml);
    pkg.write_with_replacements(output_path, &replacements)?;
    verify_headers_footers(&pkg, output_path)?;

    Ok(RebuildReport {
        status: RebuildStatus::Success,
        output_path: Some(output_path.to_path_buf()),
        message: None,
        topic_injected,
        deleted_paragraphs,
        sections_written,
    })
}

fn verify_headers_footers(template: &DocxPackage, output_path: &Path) -> anyhow::Result<()> {
    let out = DocxPackage::read(output_path).context("re-read rebuilt document")?;
    for name in template.header_footer_names() {
        let before = part_fingerprint(&template.xml_part(name)?.events);
        let after = part_fingerprint(&out.xml_part(name)?.events);
        if before != after {
            bail!("{name} changed during rebuild");
        }
    }
    Ok(())
}

/// Writes `topic` into the first cell of the row after the first topic label.
pub fn inject_topic(body: &mut DocumentBody, topic: &str) -> bool {
    for block in body.blocks.iter_mut().filter(|b| b.kind == BlockKind::Table) {
        let grid = TableGrid::parse(&block.events);
        for (row_idx, row) in grid.rows.iter().enumerate() {
            let Some(marker) = row.cells.iter().find_map(|cell| {
                let text = cell.text.trim();
                TOPIC_MARKERS.iter().find(|m| text.contains(**m))
            }) else {
                continue;
            };
            let Some(cell) = grid.rows.get(row_idx + 1).and_then(|r| r.cells.first()) else {
                continue;
            };
            debug!(marker = *marker, row = row_idx, "found topic label");
            fill_topic_cell(&mut block.events, cell, topic);
            return true;
        }
    }
    false
}

fn fill_topic_cell(events: &mut Vec<XmlEvent>, cell: &TableCell, topic: &str) {
    let size = if topic.chars().count() > LONG_TOPIC_CHARS { 9.0 } else { 10.0 };
    let format = RunFormat {
        font: Some(BODY_FONT),
        size_pt: Some(size),
        bold: false,
    };
    let Some(&(p_start, p_end)) = cell.paragraphs.first() else {
        let para = ParagraphSpec::new()
            .justified(Justification::Center)
            .run(topic, format)
            .to_events();
        events.splice(cell.end..cell.end, para);
        return;
    };

    for &(start, end) in cell.paragraphs.iter().skip(1) {
        clear_text(&mut events[start..=end]);
    }

    let mut ppr = paragraph_properties(&events[p_start..=p_end]);
    set_justification(&mut ppr, Justification::Center);
    let mut replacement = vec![events[p_start].clone()];
    replacement.extend(ppr);
    replacement.extend(text_run(topic, &format));
    replacement.push(XmlEvent::end("w:p"));
    events.splice(p_start..=p_end, replacement);
}

/// The paragraph's `w:pPr` as a Start..End run of events, empty if it has none.
fn paragraph_properties(paragraph: &[XmlEvent]) -> Vec<XmlEvent> {
    match paragraph.get(1) {
        Some(XmlEvent::Start { name, .. }) if name == "w:pPr" => {
            if let Some(end) = matching_end(paragraph, 1) {
                return paragraph[1..=end].to_vec();
            }
        }
        Some(XmlEvent::Empty { name, attrs }) if name == "w:pPr" => {
            return vec![
                XmlEvent::Start {
                    name: name.clone(),
                    attrs: attrs.clone(),
                },
                XmlEvent::end("w:pPr"),
            ];
        }
        _ => {}
    }
    vec![XmlEvent::start("w:pPr", &[]), XmlEvent::end("w:pPr")]
}

fn clear_text(events: &mut [XmlEvent]) {
    let mut in_text = false;
    for ev in events.iter_mut() {
        match ev {
            XmlEvent::Start { name, .. } if name == "w:t" => in_text = true,
            XmlEvent::End { name } if name == "w:t" => in_text = false,
            XmlEvent::Text { text } if in_text => text.clear(),
            _ => {}
        }
    }
}

/// Where placeholder content starts, and which rule found it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeletionBoundary {
    /// Index into the top-level paragraph list.
    pub start: usize,
    pub rule: &'static str,
}

/// Looks at paragraph `idx` of `texts` (trimmed paragraph texts) and returns the
/// first paragraph to delete.
type BoundaryDetector = fn(&[String], usize) -> Option<usize>;

const DELETION_RULES: &[(&str, BoundaryDetector)] = &[
    ("after course teacher signature", after_signature_block),
    ("heading placeholder", at_heading_placeholder),
    ("numbered list", at_numbered_list),
];

fn after_signature_block(texts: &[String], idx: usize) -> Option<usize> {
    let upper = texts[idx].to_uppercase();
    if !upper.contains("COURSE TEACHER") && !upper.contains("SIGNATURE") {
        return None;
    }
    let last = (idx + HONORIFIC_LOOKAHEAD).min(texts.len() - 1);
    (idx + 1..=last)
        .find(|&j| HONORIFICS.iter().any(|h| texts[j].contains(h)))
        .map(|j| j + 1)
}

fn at_heading_placeholder(texts: &[String], idx: usize) -> Option<usize> {
    texts[idx]
        .to_lowercase()
        .contains("type your heading")
        .then_some(idx)
}

fn at_numbered_list(texts: &[String], idx: usize) -> Option<usize> {
    (idx > NUMBERED_LIST_MIN_INDEX && NUMBERED_LINE_RE.is_match(&texts[idx])).then_some(idx)
}

/// Rules are tried per paragraph in document order; the first one that fires wins.
pub fn find_deletion_boundary(texts: &[String]) -> Option<DeletionBoundary> {
    (0..texts.len()).find_map(|idx| {
        DELETION_RULES.iter().find_map(|(rule, detect)| {
            detect(texts, idx).map(|start| DeletionBoundary { start, rule: *rule })
        })
    })
}

/// Removes every top-level paragraph from the boundary onwards. Tables and the
/// section properties stay.
pub fn delete_placeholder_content(body: &mut DocumentBody) -> usize {
    let paragraphs = body.paragraph_indices();
    let texts: Vec<String> = paragraphs
        .iter()
        .map(|&i| body.blocks[i].text().trim().to_string())
        .collect();
    let Some(boundary) = find_deletion_boundary(&texts) else {
        info!("no placeholder content found");
        return 0;
    };
    let doomed: Vec<usize> = paragraphs.get(boundary.start..).unwrap_or_default().to_vec();
    let removed = body.remove_blocks(&doomed);
    info!(rule = boundary.rule, from = boundary.start, removed, "deleted placeholder content");
    removed
}

/// Appends a page break to the last non-empty paragraph, else the last paragraph,
/// else a new paragraph.
pub fn add_page_break(body: &mut DocumentBody) {
    let paragraphs = body.paragraph_indices();
    let target = paragraphs
        .iter()
        .rev()
        .copied()
        .find(|&i| !body.blocks[i].text().trim().is_empty())
        .or_else(|| paragraphs.last().copied());
    match target {
        Some(i) => {
            let events = &mut body.blocks[i].events;
            if let Some(XmlEvent::Empty { name, attrs }) = events.last().cloned() {
                // `<w:p/>`
                *events = vec![XmlEvent::Start { name, attrs }, XmlEvent::end("w:p")];
            }
            let at = events.len().saturating_sub(1);
            events.splice(at..at, page_break_run());
        }
        None => {
            warn!("template has no paragraphs; page break added as a new paragraph");
            body.append_block(ParagraphSpec::new().page_break().to_block());
        }
    }
}

/// Numbered reference lines: existing bullets and numbers are replaced with a
/// fresh `k. ` prefix.
pub fn reference_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            let line = REF_BULLET_RE.replace(line, "");
            REF_NUMBER_RE.replace(&line, "").into_owned()
        })
        .enumerate()
        .map(|(k, line)| format!("{}. {line}", k + 1))
        .collect()
}

/// Topic heading plus numbered sections; returns the number of sections written.
pub fn append_content(body: &mut DocumentBody, topic: &str, sections: &SectionSet) -> usize {
    body.append_block(
        ParagraphSpec::new()
            .justified(Justification::Center)
            .spacing(Some(0.0), Some(12.0))
            .run(topic, RunFormat::bold(14.0))
            .to_block(),
    );

    let mut written = 0usize;
    for (name, content) in sections.iter() {
        let content = content.trim();
        if content.chars().count() <= MIN_SECTION_CHARS {
            debug!(section = %name, "skipping near-empty section");
            continue;
        }
        if written > 0 {
            body.append_block(ParagraphSpec::new().to_block());
        }
        written += 1;

        body.append_block(
            ParagraphSpec::new()
                .spacing(Some(0.0), Some(6.0))
                .run(format!("{written}. {name}"), RunFormat::bold(12.0))
                .to_block(),
        );
        if is_reference_section(name) {
            for line in reference_lines(content) {
                body.append_block(
                    ParagraphSpec::new()
                        .spacing(None, Some(4.0))
                        .run(line, RunFormat::body(12.0))
                        .to_block(),
                );
            }
        } else {
            body.append_block(
                ParagraphSpec::new()
                    .justified(Justification::Both)
                    .line_spacing(1.15)
                    .run(content, RunFormat::body(12.0))
                    .to_block(),
            );
        }
    }
    written
}
