use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use tracing::debug;

use crate::config::PromptsSection;

pub const DEFAULT_PROMPTS_DIR: &str = "prompts";

pub const DEFAULT_SECTION_GENERATE: &str = "section_generate.txt";
pub const DEFAULT_SECTION_REWRITE: &str = "section_rewrite.txt";
pub const DEFAULT_REFERENCES: &str = "references.txt";
pub const DEFAULT_STYLE_TRANSFORM: &str = "style_transform.txt";
pub const DEFAULT_QUESTION: &str = "question.txt";

/// Prompt templates with `{{name}}` placeholders.
#[derive(Clone, Debug)]
pub struct PromptSet {
    pub section_generate: String,
    pub section_rewrite: String,
    pub references: String,
    pub style_transform: String,
    pub question: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            section_generate: DEFAULT_SECTION_GENERATE_TEXT.to_string(),
            section_rewrite: DEFAULT_SECTION_REWRITE_TEXT.to_string(),
            references: DEFAULT_REFERENCES_TEXT.to_string(),
            style_transform: DEFAULT_STYLE_TRANSFORM_TEXT.to_string(),
            question: DEFAULT_QUESTION_TEXT.to_string(),
        }
    }
}

impl PromptSet {
    /// Configured files must exist. Unconfigured prompts are read from
    /// `prompts/<default name>` next to the config when present, else built in.
    pub fn load(config_dir: &Path, p: &PromptsSection) -> anyhow::Result<Self> {
        Ok(Self {
            section_generate: read_prompt(
                config_dir,
                "section_generate",
                p.section_generate.as_deref(),
                DEFAULT_SECTION_GENERATE,
                DEFAULT_SECTION_GENERATE_TEXT,
            )?,
            section_rewrite: read_prompt(
                config_dir,
                "section_rewrite",
                p.section_rewrite.as_deref(),
                DEFAULT_SECTION_REWRITE,
                DEFAULT_SECTION_REWRITE_TEXT,
            )?,
            references: read_prompt(
                config_dir,
                "references",
                p.references.as_deref(),
                DEFAULT_REFERENCES,
                DEFAULT_REFERENCES_TEXT,
            )?,
            style_transform: read_prompt(
                config_dir,
                "style_transform",
                p.style_transform.as_deref(),
                DEFAULT_STYLE_TRANSFORM,
                DEFAULT_STYLE_TRANSFORM_TEXT,
            )?,
            question: read_prompt(
                config_dir,
                "question",
                p.question.as_deref(),
                DEFAULT_QUESTION,
                DEFAULT_QUESTION_TEXT,
            )?,
        })
    }
}

fn read_prompt(
    config_dir: &Path,
    key: &str,
    configured: Option<&str>,
    default_filename: &str,
    builtin: &str,
) -> anyhow::Result<String> {
    let (path, required) = match configured.map(str::trim).filter(|s| !s.is_empty()) {
        Some(p) => (PathBuf::from(p), true),
        None => (
            PathBuf::from(format!("{DEFAULT_PROMPTS_DIR}/{default_filename}")),
            false,
        ),
    };
    let path = if path.is_relative() {
        config_dir.join(path)
    } else {
        path
    };
    if !path.exists() {
        if required {
            return Err(anyhow!(
                "prompt file not found for {key}: {} (run: assignment-builder --init-config)",
                path.display()
            ));
        }
        return Ok(builtin.to_string());
    }
    debug!(prompt = key, path = %path.display(), "using prompt file");
    std::fs::read_to_string(&path).with_context(|| format!("read prompt: {}", path.display()))
}

pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (k, v) in vars {
        let pat = format!("{{{{{k}}}}}");
        out = out.replace(&pat, v);
    }
    out
}

pub fn default_prompt_files() -> Vec<(&'static str, &'static str)> {
    vec![
        (DEFAULT_SECTION_GENERATE, DEFAULT_SECTION_GENERATE_TEXT),
        (DEFAULT_SECTION_REWRITE, DEFAULT_SECTION_REWRITE_TEXT),
        (DEFAULT_REFERENCES, DEFAULT_REFERENCES_TEXT),
        (DEFAULT_STYLE_TRANSFORM, DEFAULT_STYLE_TRANSFORM_TEXT),
        (DEFAULT_QUESTION, DEFAULT_QUESTION_TEXT),
    ]
}

/// Extra guidance for a section, picked by keywords in its name.
pub fn section_focus(section_name: &str) -> &'static str {
    const FOCUS: &[(&[&str], &str)] = &[
        (
            &["descriptive", "headline", "introduction", "overview"],
            "- Introduce the topic comprehensively\n- Explain its importance and relevance\n- Provide context and background",
        ),
        (
            &["objective", "aim", "purpose", "goal"],
            "- State 3-5 clear objectives\n- Explain what the work aims to achieve\n- Be specific and measurable",
        ),
        (
            &["problem", "analysis", "challenge", "issue"],
            "- Identify the key problems and challenges\n- Explain root causes\n- Analyze impacts",
        ),
        (
            &["solution", "methodology", "approach", "implementation"],
            "- Present solutions or methodologies\n- Explain implementation steps\n- Discuss advantages",
        ),
        (
            &["technology", "statistics", "data", "technical"],
            "- Discuss relevant technologies and tools\n- Provide technical details\n- Explain applications",
        ),
        (
            &["result", "finding", "outcome"],
            "- Present key results and findings\n- Analyze their significance\n- Discuss implications",
        ),
        (
            &["conclusion", "summary"],
            "- Summarize the main points\n- Draw conclusions\n- Suggest future directions",
        ),
    ];
    let lower = section_name.to_lowercase();
    FOCUS
        .iter()
        .find(|(kws, _)| kws.iter().any(|kw| lower.contains(kw)))
        .map(|(_, focus)| *focus)
        .unwrap_or("- Comprehensive coverage\n- Detailed and specific")
}

pub const DEFAULT_SECTION_GENERATE_TEXT: &str = r#"Write the {{section}} section for an assignment on "{{topic}}" in {{subject}}.

Requirements:
- Write about {{words}} words.
- Professional academic style, specific to "{{topic}}" in {{subject}}.
- No section heading. No meta-text such as "Here is...". Start directly with the content.
- Write flowing paragraphs, not bullet points.
{{focus}}

Write the section now:"#;

pub const DEFAULT_SECTION_REWRITE_TEXT: &str = r#"Current content of the {{section}} section (assignment on "{{topic}}" in {{subject}}):

{{current}}

User instruction: {{instruction}}

Rewrite this section following the user's instruction.

Requirements:
- Professional academic style.
- {{length}}
- Keep the focus on "{{topic}}" in {{subject}}.
- No section heading. No meta-text.
- Write flowing paragraphs unless the instruction asks for a list.

Rewrite now:"#;

pub const DEFAULT_REFERENCES_TEXT: &str = r#"Generate exactly {{count}} realistic academic references for an assignment on "{{topic}}" in {{subject}}.

Requirements:
- Exactly {{count}} references, one per line.
- Number them "1. ", "2. ", ... in IEEE style: Author initials and surname, "Title," Journal or Conference, vol., no., pp., year.
- Years between 2018 and 2024; titles relevant to "{{topic}}".
- No heading and no introductory sentence.

References:"#;

pub const DEFAULT_STYLE_TRANSFORM_TEXT: &str = r#"Current content of the {{section}} section (assignment on "{{topic}}" in {{subject}}):

{{current}}

Task: {{style_instruction}}

Requirements:
- Keep all key information.
- Professional academic style.
- Use exactly the format requested.
- No section heading. No meta-text.

Transform now:"#;

pub const DEFAULT_QUESTION_TEXT: &str = r#"{{context}}

User question: {{question}}

Give a helpful answer about the document, or suggest changes."#;

#[cfg(test)]
mod tests {
    use crate::config::PromptsSection;

    use super::{render_template, section_focus, PromptSet};

    #[test]
    fn renders_all_placeholders() {
        assert_eq!(
            render_template("{{a}} and {{b}} and {{a}}", &[("a", "x"), ("b", "y")]),
            "x and y and x"
        );
    }

    #[test]
    fn focus_follows_section_kind() {
        assert!(section_focus("Problem Analysis").contains("root causes"));
        assert!(section_focus("Aim of the Work").contains("objectives"));
        assert!(section_focus("Appendix").contains("Comprehensive"));
    }

    #[test]
    fn unconfigured_prompts_fall_back_to_builtins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let set = PromptSet::load(dir.path(), &PromptsSection::default()).expect("load");
        assert!(set.references.contains("{{count}}"));

        std::fs::create_dir_all(dir.path().join("prompts")).expect("mkdir");
        std::fs::write(dir.path().join("prompts/references.txt"), "R {{count}}").expect("write");
        let set = PromptSet::load(dir.path(), &PromptsSection::default()).expect("load");
        assert_eq!(set.references, "R {{count}}");
    }
}
