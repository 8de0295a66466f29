use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Local;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use assignment_builder::config::init_default_config;
use assignment_builder::docx::rebuild::{rebuild, unique_output_file_name};
use assignment_builder::docx::template::extract_sections;
use assignment_builder::generate::GroqClient;
use assignment_builder::sections::SectionSet;
use assignment_builder::{run_server, AssignmentService, Settings};

#[derive(Parser, Debug)]
#[command(name = "assignment-builder")]
#[command(about = "Assignment documents from DOCX templates, written and refined with an LLM", long_about = None)]
struct Args {
    /// Generate default config + prompt files, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write config/prompt files (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite existing config/prompt files when used with --init-config
    #[arg(long)]
    force: bool,

    /// Config file path (default: search for assignment-builder.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run the HTTP server (the default when no other mode is given)
    #[arg(long)]
    serve: bool,

    /// Print the section list extracted from a template as JSON (no LLM)
    #[arg(long, value_name = "DOCX")]
    extract_sections: Option<PathBuf>,

    /// Rebuild a template with sections from `--sections-json` (no LLM)
    #[arg(long, value_name = "DOCX")]
    rebuild: Option<PathBuf>,

    /// JSON object of section name -> content, in document order
    #[arg(long, value_name = "JSON")]
    sections_json: Option<PathBuf>,

    /// Assignment topic written into the template's topic cell
    #[arg(long)]
    topic: Option<String>,

    /// Output directory for --rebuild (default: current directory)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Student name used in the output file name
    #[arg(long)]
    student: Option<String>,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    if args.serve && (args.extract_sections.is_some() || args.rebuild.is_some()) {
        bail!("--serve cannot be combined with --extract-sections or --rebuild");
    }

    if let Some(template) = args.extract_sections.as_ref() {
        let names = extract_sections(template);
        println!("{}", serde_json::to_string_pretty(&names)?);
        return Ok(());
    }

    if let Some(template) = args.rebuild.as_ref() {
        let sections_path = args
            .sections_json
            .as_ref()
            .context("--rebuild requires --sections-json")?;
        let topic = args.topic.as_deref().context("--rebuild requires --topic")?;
        let raw = std::fs::read_to_string(sections_path)
            .with_context(|| format!("read sections: {}", sections_path.display()))?;
        let sections: SectionSet = serde_json::from_str(&raw)
            .with_context(|| format!("parse sections: {}", sections_path.display()))?;
        let out_dir = args.output.clone().unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&out_dir)
            .with_context(|| format!("create output dir: {}", out_dir.display()))?;
        let out_path = out_dir.join(unique_output_file_name(
            args.student.as_deref(),
            Local::now().naive_local(),
        ));
        let report = rebuild(template, topic, &sections, &out_path);
        println!("{}", serde_json::to_string_pretty(&report)?);
        if !report.is_success() {
            bail!(
                "rebuild failed: {}",
                report.message.unwrap_or_default()
            );
        }
        return Ok(());
    }

    if args.sections_json.is_some() || args.topic.is_some() || args.student.is_some() {
        bail!("--sections-json, --topic and --student are only used with --rebuild");
    }
    serve(args.config)
}

/// The blocking HTTP client has to be built before the async runtime starts.
fn serve(config: Option<PathBuf>) -> anyhow::Result<()> {
    let settings = Settings::load(config).context("load settings")?;
    let llm = GroqClient::new(&settings.llm).context("build completion client")?;
    tracing::info!(model = %llm.model(), config = %settings.config_path.display(), "starting");
    let service = Arc::new(AssignmentService::new(&settings, Arc::new(llm))?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    // `service` outlives the runtime so the blocking client is dropped outside it.
    runtime.block_on(run_server(&settings.bind, service.clone(), settings.sweep_interval))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
