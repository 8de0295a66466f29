//! Content strategies: prose sections, reference lists, style changes and
//! free-form questions.
//!
//! Every strategy catches generation errors itself and returns a fallback
//! text, tagged so callers can tell the user which sections actually changed.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::chat::ListStyle;
use crate::config::GenerationSettings;
use crate::sections::{is_reference_section, SectionSet};
use crate::textutil::{strip_boilerplate, truncate_words, word_count};

use super::client::TextGenerator;
use super::prompts::{render_template, section_focus, PromptSet};
use super::trace::TraceWriter;

const SECTION_MAX_TOKENS: u32 = 500;
const UNCAPPED_REWRITE_MAX_TOKENS: u32 = 1500;
const TOKENS_PER_WORD: u32 = 5;
const TOKENS_PER_REFERENCE: u32 = 120;
const STYLE_MAX_TOKENS: u32 = 500;
const QUESTION_MAX_TOKENS: u32 = 500;
const QUESTION_CONTEXT_CHARS: usize = 100;

static NUMBERED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.").expect("numbered"));
static BRACKET_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(\d+)\]\s*").expect("bracket number"));
static LEAD_IN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:here is|here's|here are|this is|sure)\b.*:\s*$").expect("lead in")
});

/// Lowercased prefixes of reference-list chatter lines.
const REFERENCE_PREAMBLE: &[&str] = &[
    "here are",
    "here is",
    "here's",
    "sure",
    "references:",
    "references",
    "reference list",
    "bibliography",
    "note:",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Generated,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Written {
    pub text: String,
    pub outcome: Outcome,
}

impl Written {
    fn generated(text: String) -> Self {
        Self {
            text,
            outcome: Outcome::Generated,
        }
    }

    fn fallback(text: String) -> Self {
        Self {
            text,
            outcome: Outcome::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.outcome == Outcome::Fallback
    }
}

/// Topic and subject of the document being written.
#[derive(Clone, Copy, Debug)]
pub struct DocumentContext<'a> {
    pub topic: &'a str,
    pub subject: &'a str,
}

pub struct ContentWriter {
    llm: Arc<dyn TextGenerator>,
    prompts: PromptSet,
    settings: GenerationSettings,
    trace: TraceWriter,
}

impl ContentWriter {
    pub fn new(
        llm: Arc<dyn TextGenerator>,
        prompts: PromptSet,
        settings: GenerationSettings,
        trace: TraceWriter,
    ) -> Self {
        Self {
            llm,
            prompts,
            settings,
            trace,
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    fn call(
        &self,
        strategy: &str,
        section: &str,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> anyhow::Result<String> {
        let seq = self.trace.next_seq();
        if let Err(err) = self
            .trace
            .write_exchange_text(seq, strategy, section, "prompt", prompt)
        {
            warn!(error = %err, "trace write failed");
        }
        let text = self.llm.complete(prompt, temperature, max_tokens)?;
        if let Err(err) = self
            .trace
            .write_exchange_text(seq, strategy, section, "response", &text)
        {
            warn!(error = %err, "trace write failed");
        }
        Ok(text)
    }

    /// Writes every section of a fresh document in order. One section failing
    /// falls back without stopping the others.
    pub fn write_document(
        &self,
        ctx: DocumentContext<'_>,
        names: &[String],
        temperature: f32,
    ) -> (SectionSet, Vec<String>) {
        let mut sections = SectionSet::new();
        let mut fallbacks = Vec::new();
        for (idx, name) in names.iter().enumerate() {
            let written = if is_reference_section(name) {
                self.write_references(ctx, self.settings.reference_count)
            } else {
                self.write_section(ctx, name, self.settings.section_words, temperature)
            };
            info!(
                section = %name,
                n = idx + 1,
                of = names.len(),
                words = word_count(&written.text),
                outcome = ?written.outcome,
                "section written"
            );
            if written.is_fallback() {
                fallbacks.push(name.clone());
            }
            sections.insert(name.clone(), written.text);
        }
        (sections, fallbacks)
    }

    /// A new prose section capped at `max_words`. Falls back to a one-line stub.
    pub fn write_section(
        &self,
        ctx: DocumentContext<'_>,
        section: &str,
        max_words: usize,
        temperature: f32,
    ) -> Written {
        let words = max_words.to_string();
        let prompt = render_template(
            &self.prompts.section_generate,
            &[
                ("section", section),
                ("topic", ctx.topic),
                ("subject", ctx.subject),
                ("words", &words),
                ("focus", section_focus(section)),
            ],
        );
        match self.call("section", section, &prompt, temperature, SECTION_MAX_TOKENS) {
            Ok(raw) => {
                let text = truncate_words(&strip_boilerplate(&raw, section), max_words);
                if text.is_empty() {
                    warn!(section = %section, "empty completion; using fallback text");
                    return Written::fallback(fallback_prose(ctx, section));
                }
                Written::generated(text)
            }
            Err(err) => {
                warn!(section = %section, error = %format!("{err:#}"), "section generation failed");
                Written::fallback(fallback_prose(ctx, section))
            }
        }
    }

    /// Rewrites `current` following `instruction`. With `max_words` the result is
    /// hard-capped; without it the length is left to the model. Falls back to
    /// `current` unchanged.
    pub fn rewrite_section(
        &self,
        ctx: DocumentContext<'_>,
        section: &str,
        current: &str,
        instruction: &str,
        max_words: Option<usize>,
    ) -> Written {
        let length = match max_words {
            Some(n) => format!("Write exactly {n} words."),
            None => "No word limit: write as much as needed to fully address the instruction."
                .to_string(),
        };
        let prompt = render_template(
            &self.prompts.section_rewrite,
            &[
                ("section", section),
                ("topic", ctx.topic),
                ("subject", ctx.subject),
                ("current", current),
                ("instruction", instruction),
                ("length", &length),
            ],
        );
        let max_tokens = max_words
            .map(|n| (n as u32).saturating_mul(TOKENS_PER_WORD))
            .unwrap_or(UNCAPPED_REWRITE_MAX_TOKENS);
        match self.call(
            "rewrite",
            section,
            &prompt,
            self.settings.temperature,
            max_tokens,
        ) {
            Ok(raw) => {
                let cleaned = strip_boilerplate(&raw, section);
                let text = match max_words {
                    Some(n) => truncate_words(&cleaned, n),
                    None => cleaned,
                };
                if text.is_empty() {
                    return Written::fallback(current.to_string());
                }
                Written::generated(text)
            }
            Err(err) => {
                warn!(section = %section, error = %format!("{err:#}"), "rewrite failed; keeping content");
                Written::fallback(current.to_string())
            }
        }
    }

    /// Exactly `count` numbered references at most. On failure, `count`
    /// synthesized entries. `count` is clamped to the configured maximum.
    pub fn write_references(&self, ctx: DocumentContext<'_>, count: usize) -> Written {
        let count = count.clamp(1, self.settings.max_reference_count.max(1));
        let n = count.to_string();
        let prompt = render_template(
            &self.prompts.references,
            &[("count", &n), ("topic", ctx.topic), ("subject", ctx.subject)],
        );
        let max_tokens = (count as u32).saturating_mul(TOKENS_PER_REFERENCE);
        let raw = match self.call(
            "references",
            "references",
            &prompt,
            self.settings.reference_temperature,
            max_tokens,
        ) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(count, error = %format!("{err:#}"), "reference generation failed; synthesizing");
                return Written::fallback(synthesize_references(ctx, count));
            }
        };
        let text = clean_reference_list(&raw, count);
        if text.is_empty() {
            warn!(count, "no usable references in completion; synthesizing");
            return Written::fallback(synthesize_references(ctx, count));
        }
        let got = numbered_lines(&text);
        if got < count {
            warn!(requested = count, got, "fewer references than requested");
        }
        Written::generated(text)
    }

    /// Converts prose between paragraph and list styles. Reference sections must
    /// not be passed here. Falls back to `current` unchanged.
    pub fn restyle_section(
        &self,
        ctx: DocumentContext<'_>,
        section: &str,
        current: &str,
        style: ListStyle,
    ) -> Written {
        let style_instruction = match (style, style.bullet()) {
            (ListStyle::Paragraph, _) => {
                "Convert to flowing paragraphs (110-150 words).".to_string()
            }
            (ListStyle::Numbered, _) => {
                "Convert to 5-7 numbered points of 15-20 words each, formatted as '1. ', '2. ', and so on."
                    .to_string()
            }
            (_, Some(bullet)) => format!(
                "Convert to 5-7 bullet points of 15-20 words each. Start each with '{bullet} '. No numbering."
            ),
            (_, None) => "Convert to 5-7 bullet points of 15-20 words each.".to_string(),
        };
        let prompt = render_template(
            &self.prompts.style_transform,
            &[
                ("section", section),
                ("topic", ctx.topic),
                ("subject", ctx.subject),
                ("current", current),
                ("style_instruction", &style_instruction),
            ],
        );
        match self.call(
            "style",
            section,
            &prompt,
            self.settings.temperature,
            STYLE_MAX_TOKENS,
        ) {
            Ok(raw) => {
                let text = match style {
                    ListStyle::Paragraph => strip_boilerplate(&raw, section),
                    _ => clean_list_text(&raw),
                };
                if text.is_empty() {
                    return Written::fallback(current.to_string());
                }
                Written::generated(text)
            }
            Err(err) => {
                warn!(section = %section, error = %format!("{err:#}"), "style change failed; keeping content");
                Written::fallback(current.to_string())
            }
        }
    }

    /// Answers a question about the document without changing it.
    pub fn answer_question(
        &self,
        ctx: DocumentContext<'_>,
        sections: &SectionSet,
        question: &str,
    ) -> Written {
        let mut context = format!(
            "Topic: {}\nSubject: {}\n\nCurrent sections:\n",
            ctx.topic, ctx.subject
        );
        for (name, content) in sections.iter() {
            let head: String = content.chars().take(QUESTION_CONTEXT_CHARS).collect();
            context.push_str(&format!("\n{name}: {head}...\n"));
        }
        let prompt = render_template(
            &self.prompts.question,
            &[("context", &context), ("question", question)],
        );
        match self.call(
            "question",
            "document",
            &prompt,
            self.settings.temperature,
            QUESTION_MAX_TOKENS,
        ) {
            Ok(raw) => Written::generated(raw.trim().to_string()),
            Err(err) => Written::fallback(format!("Error: {err:#}")),
        }
    }
}

pub fn fallback_prose(ctx: DocumentContext<'_>, section: &str) -> String {
    format!(
        "The {} examines {} in {}.",
        section.to_lowercase(),
        ctx.topic,
        ctx.subject
    )
}

/// Lines that start with `<digits>.`.
pub fn numbered_lines(text: &str) -> usize {
    text.lines().filter(|l| NUMBERED_RE.is_match(l)).count()
}

/// Drops chatter lines, turns `[n]` numbering into `n.` and keeps at most
/// `count` numbered entries.
pub fn clean_reference_list(raw: &str, count: usize) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut numbered = 0usize;
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || is_reference_preamble(line) {
            continue;
        }
        let line = BRACKET_NUMBER_RE.replace(line, "$1. ").into_owned();
        if NUMBERED_RE.is_match(&line) {
            if numbered == count {
                break;
            }
            numbered += 1;
        }
        out.push(line);
    }
    out.join("\n")
}

fn is_reference_preamble(line: &str) -> bool {
    let lower = line.to_lowercase();
    let lower = lower.trim_matches(['*', '#', ' ']);
    lower.contains("in ieee style")
        || REFERENCE_PREAMBLE.iter().any(|p| {
            lower == p.trim_end_matches(':')
                || (lower.starts_with(p) && (p.ends_with(':') || lower.ends_with(':')))
        })
}

/// Keeps the list's line structure, dropping "Here is ...:" lead-ins and blank lines.
pub fn clean_list_text(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !LEAD_IN_RE.is_match(l))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Deterministic placeholder references, numbered `1.` to `count`.
pub fn synthesize_references(ctx: DocumentContext<'_>, count: usize) -> String {
    const AUTHORS: &[&str] = &[
        "J. Smith and A. Kumar",
        "L. Chen, R. Patel and M. Garcia",
        "S. Müller and K. Tanaka",
        "P. Johnson and E. Rossi",
        "N. Ahmed and D. Brown",
    ];
    const ANGLES: &[&str] = &[
        "A Review",
        "Recent Advances",
        "Challenges and Opportunities",
        "Methods and Applications",
        "A Case Study",
    ];
    (1..=count)
        .map(|k| {
            let i = k - 1;
            format!(
                "{k}. {}, \"{}: {},\" International Journal of {}, vol. {}, no. {}, pp. {}-{}, {}.",
                AUTHORS[i % AUTHORS.len()],
                ctx.topic,
                ANGLES[i % ANGLES.len()],
                ctx.subject,
                10 + k,
                1 + i % 4,
                100 + 12 * k,
                111 + 12 * k,
                2024 - i % 6,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::chat::ListStyle;
    use crate::config::GenerationSettings;
    use crate::generate::fake::ScriptedGenerator;
    use crate::generate::prompts::PromptSet;
    use crate::generate::trace::TraceWriter;
    use crate::sections::SectionSet;
    use crate::textutil::word_count;

    use super::{
        clean_reference_list, numbered_lines, synthesize_references, ContentWriter,
        DocumentContext, Outcome,
    };

    const CTX: DocumentContext<'static> = DocumentContext {
        topic: "Smart Grids",
        subject: "Electrical Engineering",
    };

    fn writer(fake: ScriptedGenerator) -> (ContentWriter, Arc<ScriptedGenerator>) {
        let fake = Arc::new(fake);
        let w = ContentWriter::new(
            fake.clone(),
            PromptSet::default(),
            GenerationSettings::default(),
            TraceWriter::disabled(),
        );
        (w, fake)
    }

    #[test]
    fn rewrite_never_exceeds_word_cap() {
        let long = (0..200).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let (w, fake) = writer(ScriptedGenerator::new().reply(format!("Here is the rewrite:\n{long}")));
        let out = w.rewrite_section(CTX, "Objective", "old", "make it 50 words", Some(50));
        assert_eq!(out.outcome, Outcome::Generated);
        assert_eq!(word_count(&out.text), 50);
        assert!(out.text.starts_with("word0 "));
        assert_eq!(fake.max_tokens(), vec![250]);
    }

    #[test]
    fn uncapped_rewrite_keeps_length() {
        let long = (0..200).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let (w, fake) = writer(ScriptedGenerator::new().reply(long));
        let out = w.rewrite_section(CTX, "Objective", "old", "expand", None);
        assert_eq!(word_count(&out.text), 200);
        assert_eq!(fake.max_tokens(), vec![1500]);
        assert!(fake.prompts()[0].contains("No word limit"));
    }

    #[test]
    fn failed_rewrite_keeps_prior_content() {
        let (w, _) = writer(ScriptedGenerator::new().fail("quota"));
        let out = w.rewrite_section(CTX, "Objective", "prior text", "rewrite", Some(150));
        assert_eq!(out.outcome, Outcome::Fallback);
        assert_eq!(out.text, "prior text");
    }

    #[test]
    fn reference_count_is_capped() {
        let raw = "Here are 9 references in IEEE style:\n\n[1] A\n[2] B\n3. C\n4. D\n5. E\n6. F\n7. G\n8. H\n9. I";
        let (w, fake) = writer(ScriptedGenerator::new().reply(raw));
        let out = w.write_references(CTX, 7);
        assert_eq!(out.outcome, Outcome::Generated);
        assert_eq!(numbered_lines(&out.text), 7);
        assert!(out.text.starts_with("1. A\n2. B\n3. C"));
        assert!(!out.text.contains("9. I"));
        assert_eq!(fake.max_tokens(), vec![840]);
    }

    #[test]
    fn undershoot_is_kept_as_is() {
        let (w, _) = writer(ScriptedGenerator::new().reply("1. A\n2. B"));
        let out = w.write_references(CTX, 7);
        assert_eq!(out.outcome, Outcome::Generated);
        assert_eq!(numbered_lines(&out.text), 2);
    }

    #[test]
    fn failed_references_are_synthesized() {
        let (w, _) = writer(ScriptedGenerator::new().fail("timeout"));
        let out = w.write_references(CTX, 7);
        assert_eq!(out.outcome, Outcome::Fallback);
        assert_eq!(out.text.lines().count(), 7);
        assert_eq!(numbered_lines(&out.text), 7);
        assert!(out.text.lines().all(|l| l.contains("Smart Grids")));
        assert_eq!(out.text, synthesize_references(CTX, 7));
    }

    #[test]
    fn huge_reference_counts_are_clamped() {
        let (w, fake) = writer(ScriptedGenerator::new().fail("context too long"));
        let out = w.write_references(CTX, 2_000_000);
        assert_eq!(out.outcome, Outcome::Fallback);
        assert_eq!(out.text.lines().count(), 30);
        assert_eq!(fake.max_tokens(), vec![30 * 120]);
        assert!(fake.prompts()[0].contains("exactly 30 "));
    }

    #[test]
    fn preamble_lines_are_dropped() {
        assert_eq!(
            clean_reference_list("**References:**\nSure, here you go:\n1. A\n\n2. B", 5),
            "1. A\n2. B"
        );
    }

    #[test]
    fn document_generation_continues_past_failures() {
        let fake = ScriptedGenerator::new()
            .reply("The objective is clear and measurable.")
            .fail("rate limited")
            .reply("1. Ref one\n2. Ref two");
        let (w, _) = writer(fake);
        let names: Vec<String> = ["Objective", "Solution", "References"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (sections, fallbacks) = w.write_document(CTX, &names, 0.7);
        assert_eq!(sections.names(), names);
        assert_eq!(sections.get("Objective"), Some("The objective is clear and measurable."));
        assert_eq!(
            sections.get("Solution"),
            Some("The solution examines Smart Grids in Electrical Engineering.")
        );
        assert_eq!(sections.get("References"), Some("1. Ref one\n2. Ref two"));
        assert_eq!(fallbacks, vec!["Solution"]);
    }

    #[test]
    fn section_prompt_carries_focus_and_cap() {
        let long = (0..300).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let (w, fake) = writer(ScriptedGenerator::new().reply(long));
        let out = w.write_section(CTX, "Problem Analysis", 110, 0.7);
        assert_eq!(word_count(&out.text), 110);
        let prompt = &fake.prompts()[0];
        assert!(prompt.contains("about 110 words"));
        assert!(prompt.contains("root causes"));
    }

    #[test]
    fn list_style_keeps_lines() {
        let (w, fake) = writer(
            ScriptedGenerator::new().reply("Here is the converted content:\n\n→ First point\n→ Second point\n"),
        );
        let out = w.restyle_section(CTX, "Conclusion", "prose", ListStyle::Arrow);
        assert_eq!(out.text, "→ First point\n→ Second point");
        assert!(fake.prompts()[0].contains("Start each with '→ '"));
    }

    #[test]
    fn question_uses_section_heads_and_reports_errors() {
        let sections: SectionSet = [("Objective", "x".repeat(300))].into_iter().collect();
        let (w, fake) = writer(ScriptedGenerator::new().reply("  It is fine. ").fail("down"));
        let out = w.answer_question(CTX, &sections, "Is it good?");
        assert_eq!(out.text, "It is fine.");
        let prompt = &fake.prompts()[0];
        assert!(prompt.contains(&format!("Objective: {}...", "x".repeat(100))));
        assert!(!prompt.contains(&"x".repeat(101)));

        let out = w.answer_question(CTX, &sections, "Again?");
        assert_eq!(out.outcome, Outcome::Fallback);
        assert!(out.text.starts_with("Error: down"));
    }
}
