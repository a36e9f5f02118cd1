//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lineage_core::{CrawlSummary, MapRequest, NodeSummary, ProgressReporter};
use lineage_crawler::HttpPageSource;
use lineage_shared::{
    AppConfig, CrawlConfig, DescendantRecord, Profile, db_path, init_config, load_config,
    load_config_from,
};
use lineage_storage::Storage;

/// Shown instead of the name of a descendant estimated to be living.
const REDACTED_NAME: &str = "[living]";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// lineage: map a historical person's descendants from a genealogy site.
#[derive(Parser)]
#[command(
    name = "lineage",
    version,
    about = "Crawl a genealogy site for a person's descendants, score them, and query the results.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.lineage/lineage.toml).
    #[arg(long, global = true, env = "LINEAGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file (overrides [storage] db_path).
    #[arg(long, global = true, env = "LINEAGE_DB")]
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

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Crawl and persist the descendants of a root profile.
    Map {
        /// Root profile identifier on the source site (e.g. Hopewell-183).
        root_id: String,

        /// Owner name the records are stored under.
        #[arg(short, long)]
        owner: String,

        /// Deepest generation to crawl.
        #[arg(short, long)]
        depth: Option<u32>,

        /// Stop after this many descendants.
        #[arg(long)]
        max_nodes: Option<usize>,

        /// Minimum milliseconds between profile fetches.
        #[arg(long)]
        rate_limit_ms: Option<u64>,

        /// Owner metadata as a JSON object, stored with the run.
        #[arg(long)]
        metadata: Option<String>,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the chain from an owner down to a named descendant.
    Lineage {
        /// Owner name the records are stored under.
        #[arg(short, long)]
        owner: String,

        /// Part of the descendant's name (case-insensitive).
        fragment: String,

        /// Print the chain as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Aggregate statistics for an owner's records.
    Stats {
        /// Owner name the records are stored under.
        #[arg(short, long)]
        owner: String,

        /// Print the statistics as JSON.
        #[arg(long)]
        json: bool,
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

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "lineage=info",
        1 => "lineage=debug",
        _ => "lineage=trace",
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
    let Cli {
        config, db, command, ..
    } = cli;

    match command {
        Command::Map {
            root_id,
            owner,
            depth,
            max_nodes,
            rate_limit_ms,
            metadata,
            json,
        } => {
            let app = resolve_config(config.as_deref())?;
            let db = resolve_db(db, &app)?;
            let overrides = MapOverrides {
                depth,
                max_nodes,
                rate_limit_ms,
            };
            cmd_map(&app, &db, root_id, owner, &overrides, metadata.as_deref(), json).await
        }
        Command::Lineage {
            owner,
            fragment,
            json,
        } => {
            let app = resolve_config(config.as_deref())?;
            let db = resolve_db(db, &app)?;
            cmd_lineage(&app, &db, &owner, &fragment, json).await
        }
        Command::Stats { owner, json } => {
            let app = resolve_config(config.as_deref())?;
            let db = resolve_db(db, &app)?;
            cmd_stats(&db, &owner, json).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config.as_deref()),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

/// `--db` wins over the configured database path.
fn resolve_db(flag: Option<PathBuf>, app: &AppConfig) -> Result<PathBuf> {
    Ok(match flag {
        Some(path) => path,
        None => db_path(app)?,
    })
}

// ---------------------------------------------------------------------------
// map
// ---------------------------------------------------------------------------

/// Command-line overrides for `[crawl]` settings.
#[derive(Debug, Default)]
struct MapOverrides {
    depth: Option<u32>,
    max_nodes: Option<usize>,
    rate_limit_ms: Option<u64>,
}

fn crawl_config(app: &AppConfig, overrides: &MapOverrides) -> CrawlConfig {
    let mut crawl = CrawlConfig::from(app);
    if let Some(depth) = overrides.depth {
        crawl.max_depth = depth;
    }
    if overrides.max_nodes.is_some() {
        crawl.max_nodes = overrides.max_nodes;
    }
    if let Some(ms) = overrides.rate_limit_ms {
        crawl.rate_limit_ms = ms;
    }
    crawl
}

fn parse_metadata(raw: Option<&str>) -> Result<serde_json::Value> {
    let Some(raw) = raw else {
        return Ok(serde_json::json!({}));
    };
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| eyre!("invalid --metadata JSON: {e}"))?;
    if !value.is_object() {
        return Err(eyre!("--metadata must be a JSON object"));
    }
    Ok(value)
}

async fn cmd_map(
    app: &AppConfig,
    db: &Path,
    root_id: String,
    owner: String,
    overrides: &MapOverrides,
    metadata: Option<&str>,
    json: bool,
) -> Result<()> {
    let request = MapRequest {
        root_external_id: root_id,
        owner_name: owner,
        owner_metadata: parse_metadata(metadata)?,
        crawl: crawl_config(app, overrides),
    };
    // Fail on bad settings before touching the database or network.
    request.crawl.validate()?;

    let storage = Storage::open(db).await?;
    let source = HttpPageSource::new(&request.crawl)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current profile");
            on_interrupt.cancel();
        }
    });

    info!(
        root = %request.root_external_id,
        owner = %request.owner_name,
        max_depth = request.crawl.max_depth,
        db = %db.display(),
        "mapping descendants"
    );

    let reporter = CliProgress::new();
    let mut summary =
        lineage_core::map_descendants(&request, source, &storage, &reporter, cancel).await?;

    let redact = app.privacy.redact_living;
    for node in &mut summary.nodes {
        node.name = display_name(&node.name, node.is_living, redact).to_string();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &CrawlSummary) {
    println!();
    if summary.cancelled {
        println!("  Run cancelled; partial results were saved.");
    } else {
        println!("  Descendant mapping complete!");
    }
    println!("  Run:         {}", summary.run_id);
    println!("  Owner:       {}", summary.owner_name);
    println!("  Descendants: {}", summary.total_descendants);
    println!("  Generations: {}", summary.max_generation_reached);
    println!("  Failures:    {}", summary.failure_count);
    if summary.truncated {
        println!("  Node limit reached; deeper descendants were not crawled.");
    }
    println!("  Time:        {:.1}s", summary.duration_ms as f64 / 1000.0);
    println!();

    for node in &summary.nodes {
        println!(
            "  {indent}{name} ({id})  {rel}, {score:.2} {status}",
            indent = "  ".repeat(node.generation.saturating_sub(1) as usize),
            name = node.name,
            id = node.external_id,
            rel = node.relationship_path,
            score = node.confidence_score,
            status = node.status,
        );
    }
    for failure in &summary.failures {
        println!("  ! {}: {}", failure.external_id, failure.error);
    }
    if !summary.nodes.is_empty() || !summary.failures.is_empty() {
        println!();
    }
}

// ---------------------------------------------------------------------------
// lineage / stats
// ---------------------------------------------------------------------------

async fn cmd_lineage(
    app: &AppConfig,
    db: &Path,
    owner: &str,
    fragment: &str,
    json: bool,
) -> Result<()> {
    let storage = Storage::open_readonly(db).await?;
    let mut chain = storage.reconstruct_lineage(owner, fragment).await?;

    if chain.is_empty() {
        return Err(eyre!("no descendant of '{owner}' matches '{fragment}'"));
    }

    let redact = app.privacy.redact_living;
    for record in &mut chain {
        record.descendant_name =
            display_name(&record.descendant_name, record.is_living, redact).to_string();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&chain)?);
    } else {
        print_lineage(owner, &chain);
    }
    Ok(())
}

fn print_lineage(owner: &str, chain: &[DescendantRecord]) {
    println!();
    println!("  {owner}");
    for record in chain {
        println!(
            "  {indent}└─ {name} ({id}){years}  {rel}, {score:.2} {status}",
            indent = "   ".repeat(record.generation.saturating_sub(1) as usize),
            name = record.descendant_name,
            id = record.source_external_id,
            years = life_span(record.birth_year, record.death_year),
            rel = record.relationship_path,
            score = record.confidence_score,
            status = record.status,
        );
    }
    println!();
}

fn life_span(birth: Option<i32>, death: Option<i32>) -> String {
    match (birth, death) {
        (None, None) => String::new(),
        (b, d) => format!(
            " {}-{}",
            b.map(|y| y.to_string()).unwrap_or_default(),
            d.map(|y| y.to_string()).unwrap_or_default()
        ),
    }
}

async fn cmd_stats(db: &Path, owner: &str, json: bool) -> Result<()> {
    let storage = Storage::open_readonly(db).await?;
    let stats = storage.stats(owner).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!("  Owner:        {owner}");
    println!("  Descendants:  {}", stats.total_descendants);
    println!("  Generations:  {}", stats.generations_reached);
    println!("  Avg score:    {:.2}", stats.avg_confidence);
    println!("  Confirmed:    {}", stats.counts_by_tier.confirmed_lineage);
    println!("  Probable:     {}", stats.counts_by_tier.probable);
    println!("  Suspected:    {}", stats.counts_by_tier.suspected);
    println!("  Living:       {}", stats.living_count);
    println!();
    Ok(())
}

/// Name to print for a descendant, hiding living people when `redact` is set.
fn display_name(name: &str, is_living: bool, redact: bool) -> &str {
    if redact && is_living { REDACTED_NAME } else { name }
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
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        spinner.set_message("Fetching root profile");
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn root_fetched(&self, root: &Profile) {
        self.spinner.set_message(format!(
            "Crawling descendants of {} ({} children)",
            root.display_name,
            root.children.len()
        ));
    }

    fn descendant_recorded(&self, node: &NodeSummary, total: usize) {
        self.spinner.set_message(format!(
            "[{total}] generation {} {}",
            node.generation, node.external_id
        ));
    }

    fn done(&self, _summary: &CrawlSummary) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
