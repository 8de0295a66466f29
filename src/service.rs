//! Orchestration behind the HTTP routes. Everything here blocks; the server runs
//! it on the blocking thread pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chat::ChatCommand;
use crate::config::Settings;
use crate::docx::rebuild::{rebuild, unique_output_file_name};
use crate::docx::template::extract_sections;
use crate::error::AppError;
use crate::generate::{refine, ContentWriter, DocumentContext, TextGenerator, TraceWriter};
use crate::sections::SectionSet;
use crate::session::{lock_session, DocumentSession, Role, SessionStore};

pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// An uploaded template plus the form fields that came with it.
#[derive(Clone, Debug, Default)]
pub struct GenerateRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub topic: String,
    pub subject: String,
    pub temperature: Option<f32>,
    /// Accepted for compatibility; section length comes from the config.
    pub word_count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub document_id: String,
    pub topic: String,
    pub subject: String,
    pub sections: SectionSet,
    pub section_names: Vec<String>,
    pub section_count: usize,
    pub total_words: usize,
    pub fallback_sections: Vec<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub success: bool,
    pub document_id: String,
    pub topic: String,
    pub subject: String,
    pub sections: SectionSet,
    pub section_count: usize,
    pub total_words: usize,
    pub created_at: DateTime<Utc>,
    pub chat_history_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub response: String,
    pub command: ChatCommand,
    pub updated_sections: SectionSet,
    pub removed_sections: Vec<String>,
    pub failed_sections: Vec<String>,
    pub sections_modified: Vec<String>,
    pub current_sections: SectionSet,
}

#[derive(Debug, Serialize)]
pub struct FinalizeResponse {
    pub success: bool,
    pub filename: String,
    pub download_url: String,
    pub file_size: u64,
    pub topic_injected: bool,
    pub deleted_paragraphs: usize,
    pub sections_written: usize,
}

pub struct AssignmentService {
    upload_dir: PathBuf,
    output_dir: PathBuf,
    writer: ContentWriter,
    sessions: SessionStore,
}

impl AssignmentService {
    pub fn new(settings: &Settings, llm: Arc<dyn TextGenerator>) -> anyhow::Result<Self> {
        let trace = TraceWriter::new(
            settings.generation.trace_dir.clone(),
            settings.generation.trace_prompts,
        )?;
        Self::with_parts(
            settings.upload_dir.clone(),
            settings.output_dir.clone(),
            ContentWriter::new(
                llm,
                settings.prompts.clone(),
                settings.generation.clone(),
                trace,
            ),
            SessionStore::new(settings.session_ttl),
        )
    }

    pub fn with_parts(
        upload_dir: PathBuf,
        output_dir: PathBuf,
        writer: ContentWriter,
        sessions: SessionStore,
    ) -> anyhow::Result<Self> {
        for dir in [&upload_dir, &output_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create directory: {}", dir.display()))?;
        }
        Ok(Self {
            upload_dir,
            output_dir,
            writer,
            sessions,
        })
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Saves the template, extracts its sections and writes every one of them.
    pub fn generate(&self, req: GenerateRequest) -> Result<GenerateResponse, AppError> {
        if !has_docx_extension(&req.file_name) {
            return Err(AppError::InvalidUpload(
                "Only .docx templates are supported".to_string(),
            ));
        }
        if req.bytes.is_empty() {
            return Err(AppError::InvalidUpload("The uploaded file is empty".to_string()));
        }
        let topic = req.topic.trim();
        let subject = req.subject.trim();
        if topic.is_empty() || subject.is_empty() {
            return Err(AppError::InvalidUpload(
                "Both topic and subject are required".to_string(),
            ));
        }

        let template_path = self
            .upload_dir
            .join(format!("{}_{}", Uuid::new_v4().simple(), safe_file_name(&req.file_name)));
        std::fs::write(&template_path, &req.bytes)
            .with_context(|| format!("save upload: {}", template_path.display()))?;

        let names = extract_sections(&template_path);
        info!(topic = %topic, sections = ?names, "template sections");
        let temperature = req
            .temperature
            .unwrap_or(self.writer.settings().temperature)
            .clamp(0.0, 2.0);
        let ctx = DocumentContext { topic, subject };
        let (sections, fallbacks) = self.writer.write_document(ctx, &names, temperature);

        let total_words = sections.total_words();
        let section_count = sections.len();
        let document_id =
            self.sessions
                .create(topic, subject, sections.clone(), template_path);
        let message = if fallbacks.is_empty() {
            format!("Generated {section_count} sections")
        } else {
            format!(
                "Generated {section_count} sections; {} used fallback text",
                fallbacks.len()
            )
        };
        Ok(GenerateResponse {
            success: true,
            document_id,
            topic: topic.to_string(),
            subject: subject.to_string(),
            section_names: sections.names(),
            sections,
            section_count,
            total_words,
            fallback_sections: fallbacks,
            message,
        })
    }

    pub fn preview(&self, document_id: &str) -> Result<PreviewResponse, AppError> {
        let handle = self
            .sessions
            .get(document_id)
            .ok_or_else(|| AppError::SessionNotFound(document_id.to_string()))?;
        let session = lock_session(&handle);
        Ok(PreviewResponse {
            success: true,
            document_id: session.id.clone(),
            topic: session.topic.clone(),
            subject: session.subject.clone(),
            sections: session.sections.clone(),
            section_count: session.sections.len(),
            total_words: session.sections.total_words(),
            created_at: session.created_at,
            chat_history_count: session.chat_history.len(),
        })
    }

    /// One chat turn. The session stays locked from reading its sections until the
    /// results are written back.
    pub fn chat(&self, document_id: &str, prompt: &str) -> Result<ChatResponse, AppError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AppError::InvalidUpload("Empty chat message".to_string()));
        }
        let handle = self
            .sessions
            .get(document_id)
            .ok_or_else(|| AppError::SessionNotFound(document_id.to_string()))?;
        let mut session = lock_session(&handle);
        let DocumentSession {
            topic,
            subject,
            sections,
            ..
        } = &mut *session;

        let mut working = sections.clone();
        let ctx = DocumentContext { topic, subject };
        let outcome = refine(&self.writer, ctx, &mut working, prompt);
        *sections = working;

        let now = Utc::now();
        session.push_turn(Role::User, prompt, now);
        session.push_turn(Role::Assistant, outcome.reply.clone(), now);

        let updated_sections: SectionSet = outcome
            .updated
            .iter()
            .filter_map(|name| session.sections.get(name).map(|c| (name.clone(), c.to_string())))
            .collect();
        let mut sections_modified = outcome.updated.clone();
        sections_modified.extend(outcome.removed.iter().cloned());
        Ok(ChatResponse {
            success: true,
            response: outcome.reply,
            command: outcome.command,
            updated_sections,
            removed_sections: outcome.removed,
            failed_sections: outcome.failed,
            sections_modified,
            current_sections: session.sections.clone(),
        })
    }

    /// Builds the output file. An error report from the rebuild fails the request
    /// so a broken file is never offered for download.
    pub fn finalize(
        &self,
        document_id: &str,
        student_name: Option<&str>,
    ) -> Result<FinalizeResponse, AppError> {
        let handle = self
            .sessions
            .get(document_id)
            .ok_or_else(|| AppError::SessionNotFound(document_id.to_string()))?;
        let (topic, sections, template) = {
            let session = lock_session(&handle);
            (
                session.topic.clone(),
                session.sections.clone(),
                session.template_path.clone(),
            )
        };
        if !template.exists() {
            return Err(AppError::FileNotFound(template.display().to_string()));
        }

        let filename = unique_output_file_name(student_name, Local::now().naive_local());
        let output_path = self.output_dir.join(&filename);
        let report = rebuild(&template, &topic, &sections, &output_path);
        if !report.is_success() {
            return Err(AppError::Rebuild(
                report.message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        let file_size = std::fs::metadata(&output_path)
            .with_context(|| format!("stat output: {}", output_path.display()))?
            .len();
        Ok(FinalizeResponse {
            success: true,
            download_url: format!("/api/download/{filename}"),
            filename,
            file_size,
            topic_injected: report.topic_injected,
            deleted_paragraphs: report.deleted_paragraphs,
            sections_written: report.sections_written,
        })
    }

    /// Resolves a download name inside the output directory.
    pub fn download_path(&self, filename: &str) -> Result<PathBuf, AppError> {
        if filename.is_empty()
            || filename.contains(['/', '\\'])
            || filename.contains("..")
        {
            return Err(AppError::FileNotFound(filename.to_string()));
        }
        let path = self.output_dir.join(filename);
        if !path.is_file() {
            return Err(AppError::FileNotFound(filename.to_string()));
        }
        Ok(path)
    }

    pub fn cleanup(&self, document_id: &str) -> Result<(), AppError> {
        let session = self
            .sessions
            .delete(document_id)
            .ok_or_else(|| AppError::SessionNotFound(document_id.to_string()))?;
        remove_template(&session);
        Ok(())
    }

    pub fn purge_expired(&self) -> usize {
        let removed = self.sessions.purge_expired();
        removed.iter().for_each(remove_template);
        removed.len()
    }

    /// Drops every session and its uploaded template.
    pub fn shutdown(&self) -> usize {
        let removed = self.sessions.drain();
        removed.iter().for_each(remove_template);
        info!(count = removed.len(), "sessions cleared on shutdown");
        removed.len()
    }
}

fn remove_template(session: &DocumentSession) {
    if let Err(err) = std::fs::remove_file(&session.template_path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %session.template_path.display(), error = %err, "could not remove template");
        }
    }
}

fn has_docx_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("docx"))
}

fn safe_file_name(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("template.docx");
    let safe: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if safe.trim_matches(['.', '_']).is_empty() {
        "template.docx".to_string()
    } else {
        safe
    }
}
