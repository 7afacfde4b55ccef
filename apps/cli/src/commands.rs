//! CLI command definitions, routing, and tracing setup.

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use orgenrich_core::{Pipeline, PipelineOptions, RunProgress, RunSummary, load_prompt, load_records};
use orgenrich_generation::{ChatRequest, OpenAiClient, OpenAiOptions, RetryPolicy, Role};
use orgenrich_index::{BulkBatcher, FlushOutcome, HttpBulkOptions, HttpBulkTransport};
use orgenrich_shared::{
    AppConfig, RunLog, RunSettings, init_config, load_config, resolve_source_paths,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// orgenrich: enrich organization records and bulk-load them into a search index.
#[derive(Parser)]
#[command(
    name = "orgenrich",
    version,
    about = "Enrich organization records with generated classification and AFI scoring, then bulk-index them.",
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
    /// Enrich every record in the input dataset and index the results.
    Run {
        /// Process only the first N records.
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show the messages that would be sent for one record. No network calls.
    Preview {
        /// Zero-based record position.
        #[arg(short, long, default_value = "0")]
        index: usize,
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

/// Crates whose events are shown by default.
const LOG_TARGETS: [&str; 5] = [
    "orgenrich",
    "orgenrich_core",
    "orgenrich_generation",
    "orgenrich_index",
    "orgenrich_shared",
];

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
    match cli.command {
        Command::Run { limit } => cmd_run(limit).await,
        Command::Preview { index } => cmd_preview(index),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(limit: Option<usize>) -> Result<()> {
    let config = load_config()?;
    let settings = RunSettings::from_env(&config)?;

    let log = RunLog::create_in(&settings.log_dir)?;
    if let Some(path) = log.path() {
        info!(path = %path.display(), "writing run log");
    }

    // Dataset and prompt problems abort before any request is made.
    let records = load_records(&settings.input_path)?;
    let prompt = load_prompt(&settings.prompt_path)?;

    let generator = OpenAiClient::new(OpenAiOptions {
        api_key: settings.api_key.clone(),
        model: settings.model.clone(),
        base_url: settings.base_url.clone(),
        temperature: settings.temperature,
        timeout: settings.generation_timeout,
    })?;
    let transport = HttpBulkTransport::new(HttpBulkOptions {
        url: settings.index_url.clone(),
        username: settings.index_username.clone(),
        password: settings.index_password.clone(),
        ca_cert: settings.index_ca_cert.clone(),
        timeout: settings.index_timeout,
    })?;

    info!(
        model = generator.model(),
        index = %settings.index_url,
        input = %settings.input_path.display(),
        records = records.len(),
        "starting enrichment run"
    );

    let options = PipelineOptions {
        retry: RetryPolicy {
            max_attempts: settings.max_attempts,
            base: settings.backoff_base,
            cap: settings.backoff_cap,
        },
        limit,
    };
    let total = limit.map_or(records.len(), |n| n.min(records.len()));

    let mut pipeline = Pipeline::new(
        generator,
        BulkBatcher::new(transport, settings.flush_docs),
        log,
        options,
    );

    let reporter = CliProgress::new(total);
    let summary = pipeline.run(&records, &prompt, &reporter).await;
    reporter.finish();

    print_summary(&summary, pipeline.log());
    Ok(())
}

fn print_summary(summary: &RunSummary, log: &RunLog) {
    println!();
    println!("  Run complete.");
    println!("  ID:        {}", summary.run_id);
    println!("  Records:   {}", summary.records);
    println!("  Indexed:   {}", summary.indexed);
    println!("  Failed:    {}", summary.failed);
    println!("  Anomalies: {}", summary.anomalies);
    println!(
        "  Batches:   {} ({} failed)",
        summary.flushes, summary.failed_flushes
    );
    if let Some(path) = log.path() {
        println!("  Log:       {}", path.display());
    }
    println!("  Time:      {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

fn cmd_preview(index: usize) -> Result<()> {
    let config = load_config()?;
    let (input, prompt_path) = resolve_source_paths(&config);

    let records = load_records(&input)?;
    let prompt = load_prompt(&prompt_path)?;

    let record = records.get(index).ok_or_else(|| {
        eyre!(
            "record {index} is out of range: {} has {} records",
            input.display(),
            records.len()
        )
    })?;

    let request = ChatRequest::new(&prompt.instruction, prompt.render(record));

    println!("# {} (id: {})", record.display_name(index), record.doc_id());
    for message in &request.messages {
        let label = match message.role {
            Role::System => "SYSTEM",
            Role::User => "USER",
        };
        println!();
        println!("{label}:");
        println!("{}", message.content);
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Record progress bar for `run`.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl RunProgress for CliProgress {
    fn record_started(&self, name: &str, _position: usize, _total: usize) {
        self.bar.set_message(name.to_string());
    }

    fn record_finished(&self, _name: &str, _ok: bool) {
        self.bar.inc(1);
    }

    fn flushed(&self, outcome: &FlushOutcome) {
        if !outcome.is_success() {
            self.bar
                .println(format!("bulk batch of {} docs was not indexed", outcome.docs()));
        }
    }
}
