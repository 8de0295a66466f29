//! The main document body as an arena of top-level blocks.
//!
//! Each direct child of `w:body` owns its own slice of XML events, so blocks can be
//! removed or appended by position without re-scanning the whole part. The trailing
//! `w:sectPr` (page setup plus header/footer references) is always kept last.

use anyhow::{anyhow, Context};

use super::xml::{XmlEvent, XmlPart};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Table,
    SectionProperties,
    Other,
}

#[derive(Clone, Debug)]
pub struct BodyBlock {
    pub kind: BlockKind,
    pub events: Vec<XmlEvent>,
}

impl BodyBlock {
    pub fn new(kind: BlockKind, events: Vec<XmlEvent>) -> Self {
        Self { kind, events }
    }

    pub fn text(&self) -> String {
        match self.kind {
            BlockKind::Paragraph => paragraph_text(&self.events),
            _ => String::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DocumentBody {
    head: Vec<XmlEvent>,
    pub blocks: Vec<BodyBlock>,
    tail: Vec<XmlEvent>,
}

impl DocumentBody {
    pub fn from_part(part: &XmlPart) -> anyhow::Result<Self> {
        let events = &part.events;
        let body_idx = events
            .iter()
            .position(|e| e.name() == Some("w:body"))
            .with_context(|| format!("{}: no w:body element", part.name))?;

        // `<w:body/>` has no children; normalise it so blocks can be appended.
        if let XmlEvent::Empty { attrs, .. } = &events[body_idx] {
            let mut head = events[..body_idx].to_vec();
            head.push(XmlEvent::Start {
                name: "w:body".to_string(),
                attrs: attrs.clone(),
            });
            let mut tail = vec![XmlEvent::end("w:body")];
            tail.extend_from_slice(&events[body_idx + 1..]);
            return Ok(Self {
                head,
                blocks: Vec::new(),
                tail,
            });
        }

        let head = events[..=body_idx].to_vec();
        let mut blocks = Vec::new();
        let mut i = body_idx + 1;
        while i < events.len() {
            let ev = &events[i];
            match ev {
                XmlEvent::End { name } if name == "w:body" => {
                    return Ok(Self {
                        head,
                        blocks,
                        tail: events[i..].to_vec(),
                    });
                }
                XmlEvent::Start { name, .. } => {
                    let end = matching_end(events, i)
                        .with_context(|| format!("{}: unclosed {name}", part.name))?;
                    blocks.push(BodyBlock::new(
                        block_kind(name),
                        events[i..=end].to_vec(),
                    ));
                    i = end + 1;
                }
                XmlEvent::Empty { name, .. } => {
                    blocks.push(BodyBlock::new(block_kind(name), vec![ev.clone()]));
                    i += 1;
                }
                _ => {
                    blocks.push(BodyBlock::new(BlockKind::Other, vec![ev.clone()]));
                    i += 1;
                }
            }
        }
        Err(anyhow!("{}: w:body is not closed", part.name))
    }

    pub fn into_events(self) -> Vec<XmlEvent> {
        let mut out = self.head;
        for block in self.blocks {
            out.extend(block.events);
        }
        out.extend(self.tail);
        out
    }

    /// Block indices of top-level paragraphs, in document order.
    pub fn paragraph_indices(&self) -> Vec<usize> {
        self.indices_of(BlockKind::Paragraph)
    }

    pub fn table_indices(&self) -> Vec<usize> {
        self.indices_of(BlockKind::Table)
    }

    fn indices_of(&self, kind: BlockKind) -> Vec<usize> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.kind == kind)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn paragraph_texts(&self) -> Vec<String> {
        self.paragraph_indices()
            .into_iter()
            .map(|i| self.blocks[i].text())
            .collect()
    }

    /// Removes the given block indices. Indices are collected up front and removed
    /// back to front so earlier positions stay valid.
    pub fn remove_blocks(&mut self, indices: &[usize]) -> usize {
        let mut sorted: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| i < self.blocks.len())
            .collect();
        sorted.sort_unstable();
        sorted.dedup();
        for &i in sorted.iter().rev() {
            self.blocks.remove(i);
        }
        sorted.len()
    }

    /// Appends before the trailing section properties, if any.
    pub fn append_block(&mut self, block: BodyBlock) {
        let at = self
            .blocks
            .iter()
            .rposition(|b| b.kind == BlockKind::SectionProperties)
            .filter(|&i| {
                self.blocks[i + 1..]
                    .iter()
                    .all(|b| b.kind == BlockKind::Other)
            })
            .unwrap_or(self.blocks.len());
        self.blocks.insert(at, block);
    }
}

fn block_kind(name: &str) -> BlockKind {
    match name {
        "w:p" => BlockKind::Paragraph,
        "w:tbl" => BlockKind::Table,
        "w:sectPr" => BlockKind::SectionProperties,
        _ => BlockKind::Other,
    }
}

/// Index of the End event closing the Start at `start`.
pub fn matching_end(events: &[XmlEvent], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, ev) in events.iter().enumerate().skip(start) {
        match ev {
            XmlEvent::Start { .. } => depth += 1,
            XmlEvent::End { .. } => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Visible text of one paragraph's events. Only `w:t` of the outermost paragraph
/// counts, so text boxes anchored inside the paragraph are skipped.
pub fn paragraph_text(events: &[XmlEvent]) -> String {
    let mut out = String::new();
    let mut p_depth = 0usize;
    let mut in_text = false;
    for ev in events {
        match ev {
            XmlEvent::Start { name, .. } => match name.as_str() {
                "w:p" => p_depth += 1,
                "w:t" if p_depth == 1 => in_text = true,
                _ => {}
            },
            XmlEvent::End { name } => match name.as_str() {
                "w:p" => p_depth = p_depth.saturating_sub(1),
                "w:t" => in_text = false,
                _ => {}
            },
            XmlEvent::Empty { name, attrs } if p_depth == 1 => match name.as_str() {
                "w:tab" | "w:ptab" => out.push('\t'),
                "w:cr" => out.push('\n'),
                "w:br" => {
                    let kind = super::xml::find_attr(attrs, "w:type").unwrap_or("textWrapping");
                    if kind == "textWrapping" {
                        out.push('\n');
                    }
                }
                "w:noBreakHyphen" => out.push('-'),
                _ => {}
            },
            XmlEvent::Text { text } if in_text => out.push_str(text),
            _ => {}
        }
    }
    out
}

/// Event-index view of one top-level table: rows of cells of paragraphs.
/// Nested tables are not descended into.
#[derive(Clone, Debug, Default)]
pub struct TableGrid {
    pub rows: Vec<TableRow>,
}

#[derive(Clone, Debug, Default)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

#[derive(Clone, Debug, Default)]
pub struct TableCell {
    /// Index of the `w:tc` Start event.
    pub start: usize,
    /// Index of the matching `w:tc` End event.
    pub end: usize,
    /// (start, end) event indices of each direct child paragraph.
    pub paragraphs: Vec<(usize, usize)>,
    /// Paragraph texts joined by newlines.
    pub text: String,
}

impl TableGrid {
    pub fn parse(events: &[XmlEvent]) -> Self {
        let mut grid = TableGrid::default();
        let mut stack: Vec<&str> = Vec::new();
        let mut i = 0usize;
        while i < events.len() {
            match &events[i] {
                XmlEvent::Start { name, .. } => {
                    let parent = stack.last().copied().unwrap_or("");
                    let tbl_depth = stack.iter().filter(|n| **n == "w:tbl").count();
                    if name == "w:tr" && parent == "w:tbl" && tbl_depth == 1 {
                        grid.rows.push(TableRow::default());
                    } else if name == "w:tc" && parent == "w:tr" && tbl_depth == 1 {
                        let end = matching_end(events, i).unwrap_or(events.len() - 1);
                        if let Some(row) = grid.rows.last_mut() {
                            row.cells.push(TableCell {
                                start: i,
                                end,
                                ..Default::default()
                            });
                        }
                    } else if name == "w:p" && parent == "w:tc" && tbl_depth == 1 {
                        let end = matching_end(events, i).unwrap_or(events.len() - 1);
                        if let Some(cell) = grid.rows.last_mut().and_then(|r| r.cells.last_mut()) {
                            if !cell.paragraphs.is_empty() {
                                cell.text.push('\n');
                            }
                            cell.paragraphs.push((i, end));
                            cell.text.push_str(&paragraph_text(&events[i..=end]));
                        }
                        i = end + 1;
                        continue;
                    }
                    stack.push(name.as_str());
                }
                XmlEvent::End { .. } => {
                    stack.pop();
                }
                _ => {}
            }
            i += 1;
        }
        grid
    }
}

#[cfg(test)]
mod tests {
    use crate::docx::testutil::{body_paragraphs, document_xml, table};
    use crate::docx::xml::{parse_xml_part, write_events, XmlEvent};

    use super::{BlockKind, BodyBlock, DocumentBody, TableGrid};

    fn body(inner: &str) -> DocumentBody {
        let xml = document_xml(inner);
        let part = parse_xml_part("word/document.xml", xml.as_bytes()).expect("parse");
        DocumentBody::from_part(&part).expect("body")
    }

    #[test]
    fn splits_body_into_blocks_and_round_trips() {
        let inner = format!("{}{}", body_paragraphs(&["One", "Two"]), table(&[&["A", "B"]]));
        let xml = document_xml(&inner);
        let part = parse_xml_part("word/document.xml", xml.as_bytes()).expect("parse");
        let b = DocumentBody::from_part(&part).expect("body");
        let kinds: Vec<BlockKind> = b.blocks.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Paragraph,
                BlockKind::Paragraph,
                BlockKind::Table,
                BlockKind::SectionProperties
            ]
        );
        assert_eq!(b.paragraph_texts(), vec!["One", "Two"]);
        let out = write_events(&b.into_events()).expect("write");
        assert_eq!(String::from_utf8(out).expect("utf8"), xml);
    }

    #[test]
    fn append_goes_before_section_properties() {
        let mut b = body(&body_paragraphs(&["One"]));
        b.append_block(BodyBlock::new(
            BlockKind::Paragraph,
            vec![XmlEvent::start("w:p", &[]), XmlEvent::end("w:p")],
        ));
        assert_eq!(b.blocks.last().map(|b| b.kind), Some(BlockKind::SectionProperties));
        assert_eq!(b.paragraph_indices(), vec![0, 1]);
    }

    #[test]
    fn remove_blocks_is_index_safe() {
        let mut b = body(&body_paragraphs(&["a", "b", "c", "d"]));
        let removed = b.remove_blocks(&[3, 1, 1, 99]);
        assert_eq!(removed, 2);
        assert_eq!(b.paragraph_texts(), vec!["a", "c"]);
    }

    #[test]
    fn cell_text_joins_paragraphs_with_newlines() {
        let xml = table(&[&["Objective\n(5 Marks)", "Total"], &["x", "y"]]);
        let part = parse_xml_part("t", xml.as_bytes()).expect("parse");
        let grid = TableGrid::parse(&part.events);
        assert_eq!(grid.rows.len(), 2);
        assert_eq!(grid.rows[0].cells[0].text, "Objective\n(5 Marks)");
        assert_eq!(grid.rows[0].cells[0].paragraphs.len(), 2);
        assert_eq!(grid.rows[1].cells[1].text, "y");
    }

    #[test]
    fn paragraph_text_reads_tabs_and_breaks() {
        let xml = r#"<w:p><w:r><w:t>A</w:t><w:tab/><w:t>B</w:t><w:br/><w:t>C</w:t><w:br w:type="page"/></w:r></w:p>"#;
        let part = parse_xml_part("p", xml.as_bytes()).expect("parse");
        assert_eq!(super::paragraph_text(&part.events), "A\tB\nC");
    }
}
