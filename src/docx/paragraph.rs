//! Builders for WordprocessingML paragraphs emitted into a rebuilt document.

use super::body::{BlockKind, BodyBlock};
use super::xml::XmlEvent;

pub const BODY_FONT: &str = "Times New Roman";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Justification {
    Left,
    Center,
    Both,
}

impl Justification {
    pub fn as_val(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Both => "both",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunFormat {
    pub font: Option<&'static str>,
    /// Font size in points; written as half-points.
    pub size_pt: Option<f32>,
    pub bold: bool,
}

impl RunFormat {
    pub fn body(size_pt: f32) -> Self {
        Self {
            font: Some(BODY_FONT),
            size_pt: Some(size_pt),
            bold: false,
        }
    }

    pub fn bold(size_pt: f32) -> Self {
        Self {
            bold: true,
            ..Self::body(size_pt)
        }
    }

    pub fn to_events(&self) -> Vec<XmlEvent> {
        let mut out = vec![XmlEvent::start("w:rPr", &[])];
        if let Some(font) = self.font {
            out.push(XmlEvent::empty(
                "w:rFonts",
                &[("w:ascii", font), ("w:hAnsi", font), ("w:cs", font)],
            ));
        }
        if self.bold {
            out.push(XmlEvent::empty("w:b", &[]));
            out.push(XmlEvent::empty("w:bCs", &[]));
        }
        if let Some(size) = self.size_pt {
            let half_points = ((size * 2.0).round() as u32).to_string();
            out.push(XmlEvent::empty("w:sz", &[("w:val", half_points.as_str())]));
            out.push(XmlEvent::empty("w:szCs", &[("w:val", half_points.as_str())]));
        }
        out.push(XmlEvent::end("w:rPr"));
        out
    }
}

#[derive(Clone, Debug, PartialEq)]
enum RunContent {
    Text(String, RunFormat),
    PageBreak,
}

/// A new paragraph. Spacing values are in points; line spacing is a multiple.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParagraphSpec {
    pub justification: Option<Justification>,
    pub space_before_pt: Option<f32>,
    pub space_after_pt: Option<f32>,
    pub line_spacing: Option<f32>,
    runs: Vec<RunContent>,
}

impl ParagraphSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn justified(mut self, j: Justification) -> Self {
        self.justification = Some(j);
        self
    }

    pub fn spacing(mut self, before_pt: Option<f32>, after_pt: Option<f32>) -> Self {
        self.space_before_pt = before_pt;
        self.space_after_pt = after_pt;
        self
    }

    pub fn line_spacing(mut self, multiple: f32) -> Self {
        self.line_spacing = Some(multiple);
        self
    }

    pub fn run(mut self, text: impl Into<String>, format: RunFormat) -> Self {
        self.runs.push(RunContent::Text(text.into(), format));
        self
    }

    pub fn page_break(mut self) -> Self {
        self.runs.push(RunContent::PageBreak);
        self
    }

    pub fn to_block(&self) -> BodyBlock {
        BodyBlock::new(BlockKind::Paragraph, self.to_events())
    }

    pub fn to_events(&self) -> Vec<XmlEvent> {
        let mut out = vec![XmlEvent::start("w:p", &[])];
        let ppr = self.properties();
        if !ppr.is_empty() {
            out.push(XmlEvent::start("w:pPr", &[]));
            out.extend(ppr);
            out.push(XmlEvent::end("w:pPr"));
        }
        for run in &self.runs {
            match run {
                RunContent::Text(text, format) => out.extend(text_run(text, format)),
                RunContent::PageBreak => out.extend(page_break_run()),
            }
        }
        out.push(XmlEvent::end("w:p"));
        out
    }

    fn properties(&self) -> Vec<XmlEvent> {
        let mut out = Vec::new();
        if self.space_before_pt.is_some()
            || self.space_after_pt.is_some()
            || self.line_spacing.is_some()
        {
            let mut attrs: Vec<(String, String)> = Vec::new();
            if let Some(before) = self.space_before_pt {
                attrs.push(("w:before".to_string(), points_to_twips(before)));
            }
            if let Some(after) = self.space_after_pt {
                attrs.push(("w:after".to_string(), points_to_twips(after)));
            }
            if let Some(multiple) = self.line_spacing {
                attrs.push((
                    "w:line".to_string(),
                    ((multiple * 240.0).round() as u32).to_string(),
                ));
                attrs.push(("w:lineRule".to_string(), "auto".to_string()));
            }
            out.push(XmlEvent::Empty {
                name: "w:spacing".to_string(),
                attrs,
            });
        }
        if let Some(j) = self.justification {
            out.push(XmlEvent::empty("w:jc", &[("w:val", j.as_val())]));
        }
        out
    }
}

fn points_to_twips(pt: f32) -> String {
    ((pt * 20.0).round() as u32).to_string()
}

/// One run; embedded newlines become `w:br` line breaks.
pub fn text_run(text: &str, format: &RunFormat) -> Vec<XmlEvent> {
    let mut out = vec![XmlEvent::start("w:r", &[])];
    out.extend(format.to_events());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push(XmlEvent::empty("w:br", &[]));
        }
        if line.is_empty() {
            continue;
        }
        if line.starts_with(char::is_whitespace) || line.ends_with(char::is_whitespace) {
            out.push(XmlEvent::start("w:t", &[("xml:space", "preserve")]));
        } else {
            out.push(XmlEvent::start("w:t", &[]));
        }
        out.push(XmlEvent::text(line));
        out.push(XmlEvent::end("w:t"));
    }
    out.push(XmlEvent::end("w:r"));
    out
}

pub fn page_break_run() -> Vec<XmlEvent> {
    vec![
        XmlEvent::start("w:r", &[]),
        XmlEvent::empty("w:br", &[("w:type", "page")]),
        XmlEvent::end("w:r"),
    ]
}

/// `w:pPr` children that must follow `w:jc` in schema order.
const AFTER_JC: &[&str] = &[
    "w:textDirection",
    "w:textAlignment",
    "w:textboxTightWrap",
    "w:outlineLvl",
    "w:divId",
    "w:cnfStyle",
    "w:rPr",
    "w:sectPr",
    "w:pPrChange",
];

/// Sets the justification inside existing `w:pPr` events (Start..=End), keeping
/// schema order when `w:jc` has to be inserted.
pub fn set_justification(ppr: &mut Vec<XmlEvent>, j: Justification) {
    let mut depth = 0usize;
    let mut insert_at = None;
    for i in 0..ppr.len() {
        match &ppr[i] {
            XmlEvent::Start { name, .. } => {
                if depth == 1 && insert_at.is_none() && AFTER_JC.contains(&name.as_str()) {
                    insert_at = Some(i);
                }
                depth += 1;
            }
            XmlEvent::Empty { name, .. } if depth == 1 => {
                if name == "w:jc" {
                    ppr[i].set_attr("w:val", j.as_val());
                    return;
                }
                if insert_at.is_none() && AFTER_JC.contains(&name.as_str()) {
                    insert_at = Some(i);
                }
            }
            XmlEvent::End { .. } => {
                depth = depth.saturating_sub(1);
                if depth == 0 && insert_at.is_none() {
                    insert_at = Some(i);
                }
            }
            _ => {}
        }
    }
    let at = insert_at.unwrap_or(ppr.len());
    ppr.insert(at, XmlEvent::empty("w:jc", &[("w:val", j.as_val())]));
}

#[cfg(test)]
mod tests {
    use crate::docx::body::paragraph_text;
    use crate::docx::xml::{parse_xml_part, write_events};

    use super::{set_justification, Justification, ParagraphSpec, RunFormat};

    fn render(events: &[crate::docx::xml::XmlEvent]) -> String {
        String::from_utf8(write_events(events).expect("write")).expect("utf8")
    }

    #[test]
    fn heading_paragraph_markup() {
        let p = ParagraphSpec::new()
            .justified(Justification::Center)
            .spacing(Some(0.0), Some(12.0))
            .run("Smart Grids", RunFormat::bold(14.0));
        assert_eq!(
            render(&p.to_events()),
            concat!(
                r#"<w:p><w:pPr><w:spacing w:before="0" w:after="240"/><w:jc w:val="center"/></w:pPr>"#,
                r#"<w:r><w:rPr><w:rFonts w:ascii="Times New Roman" w:hAnsi="Times New Roman" w:cs="Times New Roman"/>"#,
                r#"<w:b/><w:bCs/><w:sz w:val="28"/><w:szCs w:val="28"/></w:rPr><w:t>Smart Grids</w:t></w:r></w:p>"#
            )
        );
    }

    #[test]
    fn line_spacing_and_line_breaks() {
        let p = ParagraphSpec::new()
            .justified(Justification::Both)
            .line_spacing(1.15)
            .run("• first\n• second", RunFormat::body(12.0));
        let xml = render(&p.to_events());
        assert!(xml.contains(r#"<w:spacing w:line="276" w:lineRule="auto"/><w:jc w:val="both"/>"#));
        assert_eq!(paragraph_text(&p.to_events()), "• first\n• second");
    }

    #[test]
    fn justification_is_inserted_before_run_properties() {
        let part = parse_xml_part(
            "p",
            br#"<w:pPr><w:spacing w:after="0"/><w:rPr><w:b/></w:rPr></w:pPr>"#,
        )
        .expect("parse");
        let mut ppr = part.events;
        set_justification(&mut ppr, Justification::Center);
        assert_eq!(
            render(&ppr),
            r#"<w:pPr><w:spacing w:after="0"/><w:jc w:val="center"/><w:rPr><w:b/></w:rPr></w:pPr>"#
        );
    }

    #[test]
    fn existing_justification_is_overwritten() {
        let part = parse_xml_part("p", br#"<w:pPr><w:jc w:val="left"/></w:pPr>"#).expect("parse");
        let mut ppr = part.events;
        set_justification(&mut ppr, Justification::Center);
        assert_eq!(render(&ppr), r#"<w:pPr><w:jc w:val="center"/></w:pPr>"#);
    }
}
