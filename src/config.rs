use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, info};

use crate::generate::prompts::{default_prompt_files, PromptSet, DEFAULT_PROMPTS_DIR};

pub const CONFIG_FILE_NAME: &str = "assignment-builder.toml";
pub const CONFIG_ENV: &str = "ASSIGNMENT_BUILDER_CONFIG";
pub const BIND_ENV: &str = "ASSIGNMENT_BUILDER_BIND";
pub const MODEL_ENV: &str = "GROQ_MODEL";

/// Reference lists generated for a fresh document stay within this range.
pub const REFERENCE_COUNT_RANGE: (usize, usize) = (8, 10);

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub prompts: PromptsSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ServerSection {
    #[serde(default)]
    pub bind: Option<String>,
    #[serde(default)]
    pub upload_dir: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub session_ttl_hours: Option<i64>,
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct LlmSection {
    /// OpenAI-compatible API root, without the `/chat/completions` suffix.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct GenerationSection {
    #[serde(default)]
    pub section_words: Option<usize>,
    #[serde(default)]
    pub rewrite_words: Option<usize>,
    #[serde(default)]
    pub reduce_words: Option<usize>,
    #[serde(default)]
    pub reference_count: Option<usize>,
    #[serde(default)]
    pub max_reference_count: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub reference_temperature: Option<f32>,
    #[serde(default)]
    pub trace_dir: Option<String>,
    #[serde(default)]
    pub trace_prompts: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    #[serde(default)]
    pub section_generate: Option<String>,
    #[serde(default)]
    pub section_rewrite: Option<String>,
    #[serde(default)]
    pub references: Option<String>,
    #[serde(default)]
    pub style_transform: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct GenerationSettings {
    /// Word cap for sections written during the initial build.
    pub section_words: usize,
    /// Default word cap for chat rewrites.
    pub rewrite_words: usize,
    /// Word cap when a chat instruction asks for a shorter section.
    pub reduce_words: usize,
    pub reference_count: usize,
    /// Upper bound on a reference count asked for in chat.
    pub max_reference_count: usize,
    pub temperature: f32,
    pub reference_temperature: f32,
    pub trace_dir: PathBuf,
    pub trace_prompts: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            section_words: 110,
            rewrite_words: 150,
            reduce_words: 75,
            reference_count: REFERENCE_COUNT_RANGE.0,
            max_reference_count: 30,
            temperature: 0.7,
            reference_temperature: 0.8,
            trace_dir: PathBuf::from("_trace"),
            trace_prompts: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub config_path: PathBuf,
    pub bind: String,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub session_ttl: chrono::Duration,
    pub sweep_interval: Duration,
    pub llm: LlmSettings,
    pub generation: GenerationSettings,
    pub prompts: PromptSet,
}

impl Settings {
    /// Resolves the config file (`--config`, then `ASSIGNMENT_BUILDER_CONFIG`, then an
    /// upward search) and applies environment overrides. A missing file means defaults.
    pub fn load(config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let cfg_file = config_path
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .or_else(|| find_default_config(&cwd, CONFIG_FILE_NAME));

        let mut file_cfg = AppConfig::default();
        if let Some(p) = cfg_file.as_ref() {
            if p.exists() {
                file_cfg = load_config(p)?;
                info!(config = %p.display(), "loaded config");
            }
        }
        let cfg_path = cfg_file.unwrap_or_else(|| cwd.join(CONFIG_FILE_NAME));
        Self::from_config(&cfg_path, &file_cfg, |key| std::env::var(key).ok())
    }

    pub fn from_config(
        cfg_path: &Path,
        cfg: &AppConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let config_dir = cfg_path.parent().unwrap_or_else(|| Path::new("."));
        let resolve = |p: &str| {
            let p = PathBuf::from(p);
            if p.is_relative() {
                config_dir.join(p)
            } else {
                p
            }
        };

        let bind = env(BIND_ENV)
            .filter(|s| !s.trim().is_empty())
            .or_else(|| cfg.server.bind.clone())
            .unwrap_or_else(|| "127.0.0.1:8000".to_string());
        let upload_dir = resolve(cfg.server.upload_dir.as_deref().unwrap_or("uploads"));
        let output_dir = resolve(cfg.server.output_dir.as_deref().unwrap_or("outputs"));
        let session_ttl = chrono::Duration::hours(cfg.server.session_ttl_hours.unwrap_or(24).max(1));
        let sweep_interval =
            Duration::from_secs(cfg.server.sweep_interval_secs.unwrap_or(600).max(1));

        let llm = LlmSettings {
            base_url: cfg
                .llm
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.groq.com/openai/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            model: env(MODEL_ENV)
                .filter(|s| !s.trim().is_empty())
                .or_else(|| cfg.llm.model.clone())
                .unwrap_or_else(|| "llama-3.3-70b-versatile".to_string()),
            api_key_env: cfg
                .llm
                .api_key_env
                .clone()
                .unwrap_or_else(|| "GROQ_API_KEY".to_string()),
            timeout: Duration::from_secs(cfg.llm.timeout_secs.unwrap_or(120).max(1)),
        };

        let defaults = GenerationSettings::default();
        let g = &cfg.generation;
        let (min_refs, max_refs) = REFERENCE_COUNT_RANGE;
        let generation = GenerationSettings {
            section_words: g.section_words.unwrap_or(defaults.section_words).max(1),
            rewrite_words: g.rewrite_words.unwrap_or(defaults.rewrite_words).max(1),
            reduce_words: g.reduce_words.unwrap_or(defaults.reduce_words).max(1),
            reference_count: g
                .reference_count
                .unwrap_or(defaults.reference_count)
                .clamp(min_refs, max_refs),
            max_reference_count: g
                .max_reference_count
                .unwrap_or(defaults.max_reference_count)
                .max(max_refs),
            temperature: g.temperature.unwrap_or(defaults.temperature),
            reference_temperature: g
                .reference_temperature
                .unwrap_or(defaults.reference_temperature),
            trace_dir: g
                .trace_dir
                .as_deref()
                .map(&resolve)
                .unwrap_or_else(|| config_dir.join(&defaults.trace_dir)),
            trace_prompts: g.trace_prompts.unwrap_or(defaults.trace_prompts),
        };

        let prompts = PromptSet::load(config_dir, &cfg.prompts).context("load prompts")?;
        debug!(bind = %bind, model = %llm.model, "resolved settings");

        Ok(Self {
            config_path: cfg_path.to_path_buf(),
            bind,
            upload_dir,
            output_dir,
            session_ttl,
            sweep_interval,
            llm,
            generation,
            prompts,
        })
    }
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

/// Writes the default config and prompt files into `dir`. Existing files are kept
/// unless `force` is set.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILE_NAME);

    let prompts_dir = dir.join(DEFAULT_PROMPTS_DIR);
    std::fs::create_dir_all(&prompts_dir)
        .with_context(|| format!("create prompts dir: {}", prompts_dir.display()))?;

    for (fname, body) in default_prompt_files() {
        let p = prompts_dir.join(fname);
        if p.exists() && !force {
            continue;
        }
        std::fs::write(&p, body).with_context(|| format!("write prompt: {}", p.display()))?;
    }

    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

const DEFAULT_CONFIG_TOML: &str = r#"[server]
bind = "127.0.0.1:8000"
upload_dir = "uploads"
output_dir = "outputs"
# Sessions expire this long after creation.
session_ttl_hours = 24
sweep_interval_secs = 600

[llm]
# Any OpenAI-compatible chat completions API.
base_url = "https://api.groq.com/openai/v1"
model = "llama-3.3-70b-versatile"
api_key_env = "GROQ_API_KEY"
timeout_secs = 120

[generation]
section_words = 110
rewrite_words = 150
reduce_words = 75
# Clamped to 8..=10.
reference_count = 8
# Chat requests for more references than this are capped.
max_reference_count = 30
temperature = 0.7
reference_temperature = 0.8
trace_dir = "_trace"
trace_prompts = false

[prompts]
section_generate = "prompts/section_generate.txt"
section_rewrite = "prompts/section_rewrite.txt"
references = "prompts/references.txt"
style_transform = "prompts/style_transform.txt"
question = "prompts/question.txt"
"#;
