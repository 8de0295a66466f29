//! Applies one chat instruction to a document's sections.

use tracing::info;

use crate::chat::{classify, ChatCommand, EditIntent, EditRequest, TargetUnit};
use crate::sections::{is_reference_section, SectionSet};
use crate::textutil::word_count;

use super::strategies::{numbered_lines, ContentWriter, DocumentContext, Written};

/// What a chat turn did. Section contents are changed in place on the set passed
/// to [`refine`]; this records the names involved and the reply for the user.
#[derive(Clone, Debug)]
pub struct ChatOutcome {
    pub command: ChatCommand,
    pub reply: String,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    /// Sections whose generation failed and kept or received fallback text.
    pub failed: Vec<String>,
}

impl ChatOutcome {
    fn new(command: ChatCommand) -> Self {
        Self {
            command,
            reply: String::new(),
            updated: Vec::new(),
            removed: Vec::new(),
            failed: Vec::new(),
        }
    }

    fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = reply.into();
        self
    }

    pub fn changed(&self) -> bool {
        !self.updated.is_empty() || !self.removed.is_empty()
    }
}

pub fn refine(
    writer: &ContentWriter,
    ctx: DocumentContext<'_>,
    sections: &mut SectionSet,
    instruction: &str,
) -> ChatOutcome {
    let names = sections.names();
    let command = classify(instruction, &names);
    info!(command = ?command, "chat instruction classified");
    match command.clone() {
        ChatCommand::AddSection { name } => add_section(writer, ctx, sections, command, name),
        ChatCommand::DeleteSection { names } => delete_sections(sections, command, names),
        ChatCommand::Modify(request) => modify(writer, ctx, sections, command, &request),
        ChatCommand::Question { instruction } => {
            let answer = writer.answer_question(ctx, sections, &instruction);
            ChatOutcome::new(command).with_reply(answer.text)
        }
    }
}

fn add_section(
    writer: &ContentWriter,
    ctx: DocumentContext<'_>,
    sections: &mut SectionSet,
    command: ChatCommand,
    name: Option<String>,
) -> ChatOutcome {
    let outcome = ChatOutcome::new(command);
    let Some(name) = name else {
        return outcome.with_reply(
            "Which section should I add? For example: add a section called Literature Review.",
        );
    };
    if sections.contains(&name) {
        return outcome.with_reply(format!("A section named \"{name}\" already exists."));
    }
    let settings = writer.settings();
    let written = writer.write_section(ctx, &name, settings.section_words, settings.temperature);
    let before = sections.first_reference_section().map(str::to_string);
    let words = word_count(&written.text);
    let fallback = written.is_fallback();
    sections.insert_before(name.clone(), written.text, before.as_deref());

    let mut outcome = outcome;
    outcome.updated.push(name.clone());
    if fallback {
        outcome.failed.push(name.clone());
        outcome.with_reply(format!(
            "Added section \"{name}\", but generation failed so it holds placeholder text."
        ))
    } else {
        outcome.with_reply(format!("Added section \"{name}\" ({words} words)."))
    }
}

fn delete_sections(sections: &mut SectionSet, command: ChatCommand, names: Vec<String>) -> ChatOutcome {
    let mut outcome = ChatOutcome::new(command);
    if names.is_empty() {
        return outcome.with_reply(format!(
            "Which section should I remove? Current sections: {}.",
            sections.names().join(", ")
        ));
    }
    for name in names {
        if sections.remove(&name).is_some() {
            outcome.removed.push(name);
        }
    }
    let reply = format!("Removed: {}.", outcome.removed.join(", "));
    outcome.with_reply(reply)
}

/// Word cap for a prose rewrite. `None` means unlimited.
fn prose_cap(intent: &EditIntent, writer: &ContentWriter) -> Option<usize> {
    let settings = writer.settings();
    match intent {
        EditIntent::SpecificTarget { target } => Some(target.value.max(1)),
        EditIntent::Expand => None,
        EditIntent::Reduce => Some(settings.reduce_words),
        EditIntent::StyleChange { .. } | EditIntent::Maintain | EditIntent::Modify => {
            Some(settings.rewrite_words)
        }
    }
}

fn modify(
    writer: &ContentWriter,
    ctx: DocumentContext<'_>,
    sections: &mut SectionSet,
    command: ChatCommand,
    request: &EditRequest,
) -> ChatOutcome {
    let mut outcome = ChatOutcome::new(command);
    let mut notes: Vec<String> = Vec::new();

    if let EditIntent::SpecificTarget { target } = request.intent {
        let max = writer.settings().max_reference_count;
        if target.unit == TargetUnit::References && target.value > max {
            notes.push(format!(
                "Reference lists are capped at {max}; {} were requested.",
                target.value
            ));
        }
    }

    let targets: Vec<String> = match request.intent {
        EditIntent::SpecificTarget { target } if target.unit == TargetUnit::References => {
            let named: Vec<String> = request
                .targets
                .iter()
                .filter(|t| is_reference_section(t))
                .cloned()
                .collect();
            if named.is_empty() {
                sections
                    .names()
                    .into_iter()
                    .filter(|n| is_reference_section(n))
                    .collect()
            } else {
                named
            }
        }
        _ => request.targets.clone(),
    };

    for name in &targets {
        let Some(current) = sections.get(name).map(str::to_string) else {
            continue;
        };
        let written = match dispatch(writer, ctx, name, &current, request) {
            Dispatch::Write(w) => w,
            Dispatch::Skip(reason) => {
                notes.push(format!("{name}: {reason}."));
                continue;
            }
        };
        if written.is_fallback() {
            outcome.failed.push(name.clone());
            if written.text == current {
                notes.push(format!("{name}: generation failed, content kept as before."));
            } else {
                notes.push(format!("{name}: generation failed, placeholder entries written."));
                sections.insert(name.clone(), written.text);
                outcome.updated.push(name.clone());
            }
            continue;
        }
        notes.push(describe_update(name, &written.text, request));
        sections.insert(name.clone(), written.text);
        outcome.updated.push(name.clone());
    }

    if targets.is_empty() {
        notes.push("No matching section found to update.".to_string());
    }
    let reply = if outcome.updated.is_empty() && outcome.failed.is_empty() {
        format!("No sections were changed. {}", notes.join(" "))
    } else {
        format!("Updated {} section(s). {}", outcome.updated.len(), notes.join(" "))
    };
    outcome.with_reply(reply.trim().to_string())
}

enum Dispatch {
    Write(Written),
    Skip(&'static str),
}

fn dispatch(
    writer: &ContentWriter,
    ctx: DocumentContext<'_>,
    name: &str,
    current: &str,
    request: &EditRequest,
) -> Dispatch {
    let reference = is_reference_section(name);
    match request.intent {
        EditIntent::SpecificTarget { target } if target.unit == TargetUnit::References => {
            if reference {
                Dispatch::Write(writer.write_references(ctx, target.value))
            } else {
                Dispatch::Skip("reference counts only apply to reference sections")
            }
        }
        EditIntent::StyleChange { style } => {
            if reference {
                Dispatch::Skip("reference lists keep their numbered format")
            } else {
                Dispatch::Write(writer.restyle_section(ctx, name, current, style))
            }
        }
        _ if reference => {
            if request.instruction.to_lowercase().contains("reference") {
                let count = writer.settings().reference_count;
                Dispatch::Write(writer.write_references(ctx, count))
            } else {
                Dispatch::Skip("reference list left unchanged")
            }
        }
        ref intent => {
            let cap = prose_cap(intent, writer);
            Dispatch::Write(writer.rewrite_section(ctx, name, current, &request.instruction, cap))
        }
    }
}

fn describe_update(name: &str, text: &str, request: &EditRequest) -> String {
    match request.intent {
        EditIntent::SpecificTarget { target } if target.unit == TargetUnit::References => {
            format!("{name}: {} references.", numbered_lines(text))
        }
        EditIntent::StyleChange { style } => format!("{name}: converted to {}.", style.label()),
        _ if is_reference_section(name) => format!("{name}: references regenerated."),
        _ => format!("{name}: {} words.", word_count(text)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::config::GenerationSettings;
    use crate::generate::fake::ScriptedGenerator;
    use crate::generate::prompts::PromptSet;
    use crate::generate::strategies::{ContentWriter, DocumentContext};
    use crate::generate::trace::TraceWriter;
    use crate::sections::SectionSet;
    use crate::textutil::word_count;

    use super::refine;

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

    fn document() -> SectionSet {
        [
            ("Objective", "Old objective text that is long enough."),
            ("Conclusion", "Old conclusion text that is long enough."),
            ("References", "1. A\n2. B\n3. C"),
        ]
        .into_iter()
        .collect()
    }

    fn many_words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn word_target_rewrites_only_the_named_section() {
        let (w, fake) = writer(ScriptedGenerator::new().reply(many_words(90)));
        let mut doc = document();
        let out = refine(&w, CTX, &mut doc, "make the objective 40 words");
        assert_eq!(out.updated, vec!["Objective"]);
        assert_eq!(word_count(doc.get("Objective").unwrap_or_default()), 40);
        assert_eq!(doc.get("Conclusion"), Some("Old conclusion text that is long enough."));
        assert_eq!(fake.max_tokens(), vec![200]);
        assert!(out.reply.contains("Objective: 40 words."));
    }

    #[test]
    fn reference_target_regenerates_the_list() {
        let raw = (1..=9).map(|i| format!("{i}. Ref {i}")).collect::<Vec<_>>().join("\n");
        let (w, _) = writer(ScriptedGenerator::new().reply(raw));
        let mut doc = document();
        let out = refine(&w, CTX, &mut doc, "change references to only 7");
        assert_eq!(out.updated, vec!["References"]);
        assert_eq!(doc.get("References").unwrap_or_default().lines().count(), 7);
        assert!(out.reply.contains("References: 7 references."));
    }

    #[test]
    fn oversized_reference_request_is_capped() {
        let (w, _) = writer(ScriptedGenerator::new().fail("request too large"));
        let mut doc = document();
        let out = refine(&w, CTX, &mut doc, "change references to only 2000000");
        let refs = doc.get("References").unwrap_or_default();
        assert_eq!(refs.lines().count(), 30);
        assert_eq!(out.failed, vec!["References"]);
        assert!(out.reply.contains("capped at 30; 2000000 were requested"), "{}", out.reply);
    }

    #[test]
    fn generic_edits_use_the_default_cap() {
        let (w, fake) = writer(
            ScriptedGenerator::new()
                .reply(many_words(300))
                .reply(many_words(300)),
        );
        let mut doc = document();
        let out = refine(&w, CTX, &mut doc, "improve the conclusion");
        assert_eq!(out.updated, vec!["Conclusion"]);
        assert_eq!(word_count(doc.get("Conclusion").unwrap_or_default()), 150);

        let out = refine(&w, CTX, &mut doc, "keep the objective");
        assert_eq!(out.updated, vec!["Objective"]);
        assert_eq!(word_count(doc.get("Objective").unwrap_or_default()), 150);
        assert_eq!(fake.max_tokens(), vec![750, 750]);
        assert!(fake.prompts().iter().all(|p| p.contains("Write exactly 150 words.")));
    }

    #[test]
    fn reduce_uses_short_cap_and_skips_references() {
        let (w, fake) = writer(
            ScriptedGenerator::new()
                .reply(many_words(200))
                .reply(many_words(200)),
        );
        let mut doc = document();
        let out = refine(&w, CTX, &mut doc, "make everything more concise");
        assert_eq!(out.updated, vec!["Objective", "Conclusion"]);
        assert_eq!(fake.max_tokens(), vec![375, 375]);
        assert_eq!(doc.get("References"), Some("1. A\n2. B\n3. C"));
        assert!(out.reply.contains("reference list left unchanged"));
    }

    #[test]
    fn expand_has_no_cap() {
        let (w, fake) = writer(ScriptedGenerator::new().reply(many_words(400)));
        let mut doc = document();
        refine(&w, CTX, &mut doc, "expand the conclusion");
        assert_eq!(word_count(doc.get("Conclusion").unwrap_or_default()), 400);
        assert_eq!(fake.max_tokens(), vec![1500]);
    }

    #[test]
    fn failed_rewrite_keeps_content_and_reports_it() {
        let (w, _) = writer(ScriptedGenerator::new().fail("quota exceeded"));
        let mut doc = document();
        let before = doc.clone();
        let out = refine(&w, CTX, &mut doc, "improve the conclusion");
        assert_eq!(doc, before);
        assert_eq!(out.failed, vec!["Conclusion"]);
        assert!(out.updated.is_empty());
        assert!(out.reply.contains("generation failed"));
    }

    #[test]
    fn style_change_never_touches_references() {
        let (w, fake) = writer(ScriptedGenerator::new().reply("• one\n• two").reply("• x"));
        let mut doc = document();
        let out = refine(&w, CTX, &mut doc, "convert everything into bullet points");
        assert_eq!(out.updated, vec!["Objective", "Conclusion"]);
        assert_eq!(doc.get("Objective"), Some("• one\n• two"));
        assert_eq!(doc.get("References"), Some("1. A\n2. B\n3. C"));
        assert_eq!(fake.prompts().len(), 2);
    }

    #[test]
    fn add_inserts_before_references() {
        let (w, _) = writer(ScriptedGenerator::new().reply("Prior work on grids is broad."));
        let mut doc = document();
        let out = refine(&w, CTX, &mut doc, "add a section called literature review");
        assert_eq!(out.updated, vec!["Literature Review"]);
        assert_eq!(
            doc.names(),
            vec!["Objective", "Conclusion", "Literature Review", "References"]
        );

        let (w, fake) = writer(ScriptedGenerator::new());
        let out = refine(&w, CTX, &mut doc, "add a section called literature review");
        assert!(out.reply.contains("already exists"));
        assert!(fake.prompts().is_empty());
    }

    #[test]
    fn add_without_a_name_asks_back() {
        let (w, fake) = writer(ScriptedGenerator::new());
        let mut doc = document();
        let out = refine(&w, CTX, &mut doc, "add a section");
        assert!(!out.changed());
        assert!(out.reply.starts_with("Which section should I add?"));
        assert!(fake.prompts().is_empty());
    }

    #[test]
    fn delete_removes_named_sections_only() {
        let (w, _) = writer(ScriptedGenerator::new());
        let mut doc = document();
        let out = refine(&w, CTX, &mut doc, "remove the conclusion");
        assert_eq!(out.removed, vec!["Conclusion"]);
        assert_eq!(doc.names(), vec!["Objective", "References"]);

        let out = refine(&w, CTX, &mut doc, "delete that part");
        assert!(!out.changed());
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn questions_do_not_change_sections() {
        let (w, _) = writer(ScriptedGenerator::new().reply("It reads well."));
        let mut doc = document();
        let before = doc.clone();
        let out = refine(&w, CTX, &mut doc, "what do you think of it?");
        assert_eq!(out.reply, "It reads well.");
        assert_eq!(doc, before);
        assert!(!out.changed());
    }
}
