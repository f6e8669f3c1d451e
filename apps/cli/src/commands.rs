//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use draftforge_backend::{BackendOptions, ChatBackend, OpenAiBackend};
use draftforge_core::pipeline::{ArticlePipeline, GenerationOutcome, ProgressSink};
use draftforge_imagery::{MediaSearch, PageFetcher, RelevanceRanker};
use draftforge_research::TavilySearch;
use draftforge_shared::{
    RequestOverrides, RunId, StageName, StageStatus, Tone, default_db_path, init_config,
    load_config, validate_api_key,
};
use draftforge_storage::{RunRecord, SETTING_KEYS, Storage};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Draftforge — turn a topic into a publishable article.
#[derive(Parser)]
#[command(
    name = "draftforge",
    version,
    about = "Generate researched, edited, fact-checked articles from a single topic.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate an article for a topic.
    Generate {
        /// Article topic.
        topic: String,

        /// Target keyword (repeatable).
        #[arg(short, long = "keywords", value_name = "KEYWORD")]
        keywords: Vec<String>,

        /// Writing tone: professional, casual, academic, or conversational.
        #[arg(short, long)]
        tone: Option<String>,

        /// Intended readership, e.g. "engineering leads".
        #[arg(short, long)]
        audience: Option<String>,

        /// Append a generated FAQ section.
        #[arg(long, overrides_with = "no_faq")]
        faq: bool,

        /// Skip the FAQ section.
        #[arg(long)]
        no_faq: bool,

        /// Output directory (defaults to the configured one).
        #[arg(short, long)]
        output: Option<String>,
    },

    /// List recorded generation runs.
    Runs {
        /// Maximum number of runs to show.
        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration and system settings.
    Show,
    /// Set a system-governed setting.
    Set {
        /// Setting key (model_name, temperature, enable_web_search,
        /// max_research_sources, min_word_count, max_word_count).
        key: String,

        /// New value.
        value: String,
    },
    /// Print one system-governed setting.
    Get {
        /// Setting key.
        key: String,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "draftforge=info",
        1 => "draftforge=debug",
        _ => "draftforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate {
            topic,
            keywords,
            tone,
            audience,
            faq,
            no_faq,
            output,
        } => {
            cmd_generate(
                &topic,
                keywords,
                tone.as_deref(),
                audience,
                faq_override(faq, no_faq),
                output.as_deref(),
            )
            .await
        }
        Command::Runs { limit } => cmd_runs(limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
            ConfigAction::Set { key, value } => cmd_config_set(&key, &value).await,
            ConfigAction::Get { key } => cmd_config_get(&key).await,
        },
    }
}

/// Collapse the `--faq`/`--no-faq` flag pair into an override.
fn faq_override(faq: bool, no_faq: bool) -> Option<bool> {
    match (faq, no_faq) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_generate(
    topic: &str,
    keywords: Vec<String>,
    tone: Option<&str>,
    audience: Option<String>,
    include_faq: Option<bool>,
    output: Option<&str>,
) -> Result<()> {
    if topic.trim().is_empty() {
        return Err(eyre!("topic must not be empty"));
    }

    // Validate API key before doing anything
    let config = load_config()?;
    validate_api_key(&config)?;

    let tone = tone.map(|t| t.parse::<Tone>()).transpose()?;

    let storage = open_storage().await?;
    let system = storage.load_system_settings().await?;

    let output_dir = match output {
        Some(dir) => expand_tilde(dir),
        None => expand_tilde(&config.defaults.output_dir),
    };
    let sources_dir = expand_tilde(&config.defaults.sources_dir);

    // Generation backend
    let api_key = std::env::var(&config.backend.api_key_env).unwrap_or_default();
    let options = BackendOptions::new(api_key)
        .with_base_url(config.backend.base_url.clone())
        .with_ssl_verify(config.backend.ssl_verify);
    let backend: Arc<dyn ChatBackend> = Arc::new(OpenAiBackend::new(&options)?);

    // Image scouting
    let fetcher = PageFetcher::new(config.backend.ssl_verify)?;
    let media = MediaSearch::new()?;
    let ranker = Arc::new(RelevanceRanker::new(
        backend.clone(),
        fetcher,
        media,
        system.model_name.clone(),
    ));

    // Web search runs only with credentials; the stage itself honors the
    // enable_web_search setting.
    let search_key = std::env::var(&config.search.api_key_env).unwrap_or_default();

    let mut pipeline =
        ArticlePipeline::new(backend, config, system, output_dir, sources_dir).with_ranker(ranker);
    if search_key.is_empty() {
        info!("search API key not set, research will use local sources only");
    } else {
        pipeline = pipeline.with_search(Arc::new(TavilySearch::new(search_key)?));
    }

    let overrides = RequestOverrides {
        tone,
        audience,
        keywords: if keywords.is_empty() {
            None
        } else {
            Some(keywords)
        },
        include_faq,
        include_meta_tags: None,
        style_rules: None,
    };

    info!(topic, "generating article");

    let progress = CliProgress::new();
    let outcome = match pipeline.run(topic, &overrides, &progress).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // Keep the original error even if the history write fails too
            if let Err(db_err) = storage.record_run(&failed_run(topic)).await {
                tracing::warn!(error = %db_err, "could not record failed run");
            }
            return Err(e.into());
        }
    };

    storage
        .record_run(&RunRecord {
            run_id: outcome.run_id,
            topic: topic.to_string(),
            status: "completed".into(),
            word_count: outcome.word_count,
            verification_score: outcome.document.fact_check.verification_score,
            output_path: outcome.files.markdown_path.display().to_string(),
            created_at: Utc::now(),
        })
        .await?;

    // Print summary
    let unverified = outcome
        .document
        .fact_check
        .flagged_claims
        .iter()
        .filter(|c| !c.verified)
        .count();

    println!();
    println!("  Article generated!");
    println!("  Title:    {}", outcome.document.title);
    println!("  Words:    {}", outcome.word_count);
    println!("  Sources:  {}", outcome.document.citations.len());
    println!(
        "  Score:    {:.0}%",
        outcome.document.fact_check.verification_score * 100.0
    );
    if unverified > 0 {
        println!("  Review:   {unverified} claims could not be verified");
    }
    println!("  Markdown: {}", outcome.files.markdown_path.display());
    println!("  JSON:     {}", outcome.files.json_path.display());
    println!("  Time:     {:.1}s", outcome.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_runs(limit: u32) -> Result<()> {
    let storage = open_storage().await?;
    let runs = storage.list_runs(limit).await?;

    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    for run in runs {
        println!(
            "  {}  {:<9} {:>5}w  score {:.2}  {}",
            run.created_at.format("%Y-%m-%d %H:%M"),
            run.status,
            run.word_count,
            run.verification_score,
            run.topic
        );
    }

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");

    let storage = open_storage().await?;
    let settings = storage.load_system_settings().await?;
    println!("[system]  # stored in {}", default_db_path()?.display());
    println!("model_name = {:?}", settings.model_name);
    println!("temperature = {}", settings.temperature);
    println!("enable_web_search = {}", settings.enable_web_search);
    println!("max_research_sources = {}", settings.max_research_sources);
    println!("min_word_count = {}", settings.min_word_count);
    println!("max_word_count = {}", settings.max_word_count);
    Ok(())
}

async fn cmd_config_set(key: &str, value: &str) -> Result<()> {
    let storage = open_storage().await?;
    storage.set_setting(key, value).await?;
    println!("Set {key} = {value}");
    Ok(())
}

async fn cmd_config_get(key: &str) -> Result<()> {
    let storage = open_storage().await?;
    let settings = storage.load_system_settings().await?;

    let value = match key {
        "model_name" => settings.model_name,
        "temperature" => settings.temperature.to_string(),
        "enable_web_search" => settings.enable_web_search.to_string(),
        "max_research_sources" => settings.max_research_sources.to_string(),
        "min_word_count" => settings.min_word_count.to_string(),
        "max_word_count" => settings.max_word_count.to_string(),
        other => {
            return Err(eyre!(
                "unknown setting key '{other}' (expected one of: {})",
                SETTING_KEYS.map(|(k, _)| k).join(", ")
            ));
        }
    };

    println!("{value}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Open the settings database at its default location.
async fn open_storage() -> Result<Storage> {
    let path = default_db_path()?;
    Ok(Storage::open(&path).await?)
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// History row for a run that did not produce a document.
fn failed_run(topic: &str) -> RunRecord {
    RunRecord {
        run_id: RunId::new(),
        topic: topic.to_string(),
        status: "failed".into(),
        word_count: 0,
        verification_score: 0.0,
        output_path: String::new(),
        created_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressSink for CliProgress {
    fn stage_started(&self, stage: StageName) {
        self.spinner.set_message(format!("{}...", stage.activity()));
    }

    fn stage_finished(&self, stage: StageName, status: StageStatus, elapsed: Duration) {
        match status {
            StageStatus::Failed => self.spinner.finish_and_clear(),
            _ => self.spinner.println(format!(
                "  ✓ {} ({:.1}s)",
                stage.activity(),
                elapsed.as_secs_f64()
            )),
        }
    }

    fn thought(&self, _stage: StageName, message: &str) {
        self.spinner.set_message(message.to_string());
    }

    fn done(&self, _outcome: &GenerationOutcome) {
        self.spinner.finish_and_clear();
    }
}
