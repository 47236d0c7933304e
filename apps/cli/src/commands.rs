//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use atomizer_core::{
    DecomposeOptions, DecomposeResult, Decomposition, Drainer, OpenAiEmbedder, ProgressReporter,
    ShutdownSignal, aggregate_batch, decompose_document, expand, parse_job_batch,
    retrieve_nested_context,
};
use atomizer_markdown::{parse_record, record_to_markdown};
use atomizer_shared::{AppConfig, expand_home, init_config, load_config, resolve_api_key};
use atomizer_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Atomizer: decompose hierarchical text into atoms and contexts.
#[derive(Parser)]
#[command(
    name = "atomizer",
    version,
    about = "Decompose outline text into atoms and contexts, and aggregate their embeddings.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database path (overrides `[storage] database_path`).
    #[arg(long, global = true, env = "ATOMIZER_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// How to read the input document.
#[derive(clap::Args)]
pub(crate) struct InputArgs {
    /// Input file (`-` or omitted for stdin).
    pub file: Option<PathBuf>,

    /// Treat the input as a flat JSON record and convert it to an outline first.
    #[arg(long)]
    pub record: bool,

    /// Record fields forming the title item (repeatable).
    #[arg(long = "title-field", default_values_t = vec!["name".to_string()])]
    pub title_fields: Vec<String>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Parse a document and print its node tree, atoms and contexts as JSON.
    Parse {
        #[command(flatten)]
        input: InputArgs,

        /// Owner recorded on the printed contexts.
        #[arg(long)]
        owner: Option<String>,
    },

    /// Parse a document and store its atoms and contexts.
    Decompose {
        #[command(flatten)]
        input: InputArgs,

        /// Owner recorded on every context.
        #[arg(long)]
        owner: Option<String>,

        /// Enqueue one embedding job per atom on the configured queue.
        #[arg(long)]
        enqueue: bool,

        /// Print the result as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Print the stored tree under a context id.
    Expand {
        /// Root context id.
        id: String,

        /// Print structure only, without atom content.
        #[arg(long)]
        structure_only: bool,
    },

    /// Recompute and store aggregate embeddings for contexts.
    Aggregate {
        /// Context ids.
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Run embedding jobs from a JSON file or from the queue table.
    Drain {
        /// JSON array of job descriptors. Reads the queue when omitted.
        #[arg(long)]
        jobs: Option<PathBuf>,

        /// Maximum jobs claimed from the queue (defaults to `[queue] batch_size`).
        #[arg(long)]
        limit: Option<u32>,
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
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so JSON output stays clean.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "atomizer=info",
        1 => "atomizer=debug",
        _ => "atomizer=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db;
    match cli.command {
        Command::Parse { input, owner } => cmd_parse(&input, owner.as_deref()),
        Command::Decompose {
            input,
            owner,
            enqueue,
            json,
        } => cmd_decompose(db.as_deref(), &input, owner, enqueue, json).await,
        Command::Expand { id, structure_only } => {
            cmd_expand(db.as_deref(), &id, structure_only).await
        }
        Command::Aggregate { ids } => cmd_aggregate(db.as_deref(), &ids).await,
        Command::Drain { jobs, limit } => cmd_drain(db.as_deref(), jobs.as_deref(), limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read the input document, converting a JSON record to an outline if asked.
fn read_input(input: &InputArgs) -> Result<String> {
    let raw = match input.file.as_deref() {
        None => read_stdin()?,
        Some(path) if path == Path::new("-") => read_stdin()?,
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| eyre!("cannot read {}: {e}", path.display()))?,
    };

    if !input.record {
        return Ok(raw);
    }

    let record = parse_record(&raw)?;
    let fields: Vec<&str> = input.title_fields.iter().map(String::as_str).collect();
    Ok(record_to_markdown(&record, &fields))
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| eyre!("cannot read stdin: {e}"))?;
    Ok(buf)
}

/// Open the database named by `--db`, or the configured one.
async fn open_storage(db: Option<&Path>, config: &AppConfig) -> Result<Storage> {
    let path = match db {
        Some(p) => p.to_path_buf(),
        None => expand_home(&config.storage.database_path),
    };
    info!(path = %path.display(), "opening database");
    Ok(Storage::open(&path).await?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_parse(input: &InputArgs, owner: Option<&str>) -> Result<()> {
    let text = read_input(input)?;
    let decomposition = Decomposition::from_text(&text, owner);
    print_json(&decomposition)
}

async fn cmd_decompose(
    db: Option<&Path>,
    input: &InputArgs,
    owner: Option<String>,
    enqueue: bool,
    json: bool,
) -> Result<()> {
    let config = load_config()?;
    let text = read_input(input)?;
    let storage = open_storage(db, &config).await?;

    let options = DecomposeOptions {
        owner,
        enqueue_to: enqueue.then(|| config.queue.name.clone()),
    };

    let reporter = CliProgress::new();
    let result = decompose_document(&storage, &text, &options, &reporter).await?;

    if json {
        return print_json(&result);
    }

    println!();
    println!("  Document decomposed.");
    println!("  Roots:    {}", result.root_ids.join(", "));
    println!("  Atoms:    {}", result.atom_count);
    println!("  Contexts: {}", result.context_count);
    if enqueue {
        println!("  Jobs:     {} (queue {})", result.jobs_enqueued, config.queue.name);
    }
    println!("  Time:     {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_expand(db: Option<&Path>, id: &str, structure_only: bool) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(db, &config).await?;

    if structure_only {
        let tree = retrieve_nested_context(&storage, id)
            .await?
            .ok_or_else(|| eyre!("no context stored for {id}"))?;
        return print_json(&tree);
    }

    let tree = expand(&storage, &storage, id)
        .await?
        .ok_or_else(|| eyre!("no context stored for {id}"))?;
    print_json(&tree)
}

async fn cmd_aggregate(db: Option<&Path>, ids: &[String]) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(db, &config).await?;

    let outcomes = aggregate_batch(&storage, &storage, ids).await;
    print_json(&outcomes)?;

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    if failed > 0 {
        return Err(eyre!("{failed} of {} aggregations failed", outcomes.len()));
    }
    Ok(())
}

async fn cmd_drain(db: Option<&Path>, jobs_file: Option<&Path>, limit: Option<u32>) -> Result<()> {
    let config = load_config()?;
    let api_key = resolve_api_key(&config)?;
    let embedder = OpenAiEmbedder::from_config(&config.embedding, &api_key)?;
    let storage = open_storage(db, &config).await?;

    let jobs = match jobs_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| eyre!("cannot read {}: {e}", path.display()))?;
            parse_job_batch(&raw)?
        }
        None => {
            let limit = limit.unwrap_or(config.queue.batch_size);
            let visibility = Duration::from_secs(config.queue.visibility_timeout_secs);
            storage
                .read_jobs(&config.queue.name, limit, visibility)
                .await?
        }
    };

    if jobs.is_empty() {
        println!("No jobs to run.");
        return Ok(());
    }

    let signal = ShutdownSignal::new();
    let on_interrupt = signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing the current job");
            on_interrupt.trigger("interrupted");
        }
    });

    let drainer = Drainer::new(&storage, &storage, &embedder, config.queue.name.clone());
    let report = drainer.drain(jobs, &signal).await?;

    print_json(&report)?;
    eprintln!(
        "{} completed, {} failed",
        report.completed.len(),
        report.failed.len()
    );
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
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
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn persisted(&self, kind: &str, count: usize) {
        self.spinner.set_message(format!("Stored {count} {kind}"));
    }

    fn done(&self, _result: &DecomposeResult) {
        self.spinner.finish_and_clear();
    }
}
