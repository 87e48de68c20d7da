use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recrawl::config::{Config, MapperStrategy};
use recrawl::crawler::{ClassKeySource, SurtAuthorityClassKey};
use recrawl::models::CrawlUri;
use recrawl::partition::{CrawlMapProcessor, CrawlMapper, HashCrawlMapper, LexicalCrawlMapper};
use recrawl::storage::history_store::{HistoryStore, SqliteHistoryStore};
use recrawl::storage::journal::{self, JournalEntry, JournalReader};
use recrawl::storage::persist::{self, PreloadSource};

#[derive(Parser)]
#[command(
    name = "recrawl",
    version,
    about = "Fetch-history persistence and crawl mapping tools",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Print Prometheus metrics to stderr on exit
    #[arg(long, global = true)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a persist journal or prior store into a store environment
    Import {
        /// Journal path, journal URL, or prior store environment directory
        /// (defaults to the configured preload source)
        source: Option<String>,

        /// Store environment directory (defaults to the configured one)
        #[arg(short, long)]
        store: Option<PathBuf>,
    },

    /// Print every stored record as a persist journal line
    Dump {
        /// Store environment directory (defaults to the configured one)
        #[arg(short, long)]
        store: Option<PathBuf>,
    },

    /// Show the crawler node responsible for each input
    Map {
        /// Class keys or URIs; read from stdin when none are given
        inputs: Vec<String>,

        /// Treat inputs as URIs and derive their class keys
        #[arg(short, long)]
        uri: bool,

        /// Mapping strategy (hash, lexical)
        #[arg(long)]
        strategy: Option<MapperStrategy>,

        /// Number of crawler nodes for the hash strategy
        #[arg(short, long)]
        buckets: Option<u64>,

        /// Class key reduction pattern for the hash strategy
        #[arg(long)]
        reduce: Option<String>,

        /// Map file path or URL for the lexical strategy
        #[arg(long)]
        map_source: Option<String>,
    },

    /// Divert URIs owned by other nodes into this node's diversion logs
    Divert {
        /// URIs; read from stdin when none are given
        inputs: Vec<String>,
    },

    /// Print the data lines of a journal (gzip or plain, file or URL)
    Cat {
        /// Journal path or URL
        source: String,

        /// Also print timestamp and error markers
        #[arg(short, long)]
        all: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }

    // Initialize tracing/logging
    setup_tracing(&config.logging.format, &config.logging.level, cli.verbose)?;

    if cli.metrics {
        if let Err(e) = recrawl::metrics::init_metrics() {
            tracing::warn!(error = %e, "Metrics initialization failed");
        }
    }

    match cli.command {
        Commands::Import { source, store } => {
            let source = source
                .or_else(|| config.persist.preload_source.clone())
                .context("No import source given and no preload_source configured")?;
            let store = store.unwrap_or_else(|| config.persist.env_dir.clone());
            tracing::info!(source = %source, store = %store.display(), "Starting import command");
            import(&source, store)?;
        }

        Commands::Dump { store } => {
            let store = store.unwrap_or_else(|| config.persist.env_dir.clone());
            tracing::info!(store = %store.display(), "Starting dump command");
            dump(store)?;
        }

        Commands::Map {
            inputs,
            uri,
            strategy,
            buckets,
            reduce,
            map_source,
        } => {
            if let Some(strategy) = strategy {
                config.mapper.strategy = strategy;
            }
            if let Some(buckets) = buckets {
                config.mapper.bucket_count = buckets;
            }
            if reduce.is_some() {
                config.mapper.reduce_pattern = reduce;
            }
            if map_source.is_some() {
                config.mapper.map_source = map_source;
            }
            config.validate()?;
            tracing::info!(strategy = ?config.mapper.strategy, "Starting map command");
            map(&config, inputs, uri)?;
        }

        Commands::Divert { inputs } => {
            config.validate()?;
            tracing::info!(
                strategy = ?config.mapper.strategy,
                local = %config.mapper.local_name,
                "Starting divert command"
            );
            divert(&config, inputs)?;
        }

        Commands::Cat { source, all } => {
            tracing::info!(source = %source, "Starting cat command");
            cat(&source, all)?;
        }
    }

    if cli.metrics {
        match recrawl::metrics::encode_metrics() {
            Ok(text) => eprint!("{text}"),
            Err(e) => tracing::warn!(error = %e, "Metrics export failed"),
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("recrawl=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("recrawl={level},warn")))
    };

    // stdout carries command output, so logs go to stderr
    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
                .init();
        }
    }

    Ok(())
}

fn import(source: &str, env_dir: PathBuf) -> Result<()> {
    let store = SqliteHistoryStore::open(&env_dir)
        .with_context(|| format!("Failed to open store environment: {}", env_dir.display()))?;

    let loaded = persist::preload(&store, &PreloadSource::parse(source));
    store.sync().context("Failed to sync store")?;
    let total = store.len()?;
    store.close()?;

    println!("Imported {loaded} records ({total} stored)");
    Ok(())
}

fn dump(env_dir: PathBuf) -> Result<()> {
    let store = SqliteHistoryStore::open_existing(&env_dir)
        .with_context(|| format!("Failed to open store environment: {}", env_dir.display()))?;

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let mut write_error = None;
    let mut skipped = 0usize;

    store.scan(&mut |key, record| {
        if write_error.is_some() {
            return;
        }
        match persist::format_log_line(key, &record) {
            Ok(line) => {
                if let Err(e) = writeln!(out, "{line}") {
                    write_error = Some(e);
                }
            }
            Err(e) => {
                skipped += 1;
                tracing::warn!(key, error = %e, "Record not printable");
            }
        }
    })?;

    if let Some(e) = write_error {
        return Err(e).context("Failed to write dump");
    }
    out.flush()?;
    if skipped > 0 {
        tracing::warn!(skipped, "Some records were skipped");
    }
    Ok(())
}

fn build_mapper(config: &Config) -> Result<Box<dyn CrawlMapper>> {
    let mapper: Box<dyn CrawlMapper> = match config.mapper.strategy {
        MapperStrategy::Hash => {
            let reduction = config.mapper.key_reduction();
            Box::new(HashCrawlMapper::new(config.mapper.bucket_count, reduction)?)
        }
        MapperStrategy::Lexical => {
            let source = config
                .mapper
                .map_source
                .as_deref()
                .context("lexical mapper requires a map source")?;
            Box::new(LexicalCrawlMapper::load(source, config.mapper.local_name.clone())?)
        }
    };
    Ok(mapper)
}

fn read_inputs(inputs: Vec<String>) -> Result<Vec<String>> {
    if !inputs.is_empty() {
        return Ok(inputs);
    }
    Ok(io::stdin()
        .lock()
        .lines()
        .collect::<io::Result<Vec<_>>>()
        .context("Failed to read stdin")?
        .into_iter()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect())
}

fn map(config: &Config, inputs: Vec<String>, uri: bool) -> Result<()> {
    let mapper = build_mapper(config)?;

    let class_keys = SurtAuthorityClassKey;
    for input in read_inputs(inputs)? {
        let key = if uri { class_keys.class_key(&input) } else { input.clone() };
        println!("{input}\t{}", mapper.target_for(&key));
    }
    Ok(())
}

fn divert(config: &Config, inputs: Vec<String>) -> Result<()> {
    let processor = CrawlMapProcessor::new(build_mapper(config)?, config.mapper.settings())
        .with_context(|| {
            format!(
                "Failed to prepare diversion directory: {}",
                config.mapper.diversion_dir.display()
            )
        })?;

    let mut diverted = 0usize;
    let mut failed = 0usize;
    for input in read_inputs(inputs)? {
        let mut curi = CrawlUri::new(input);
        match processor.process(&mut curi) {
            Ok(outcome) => {
                if let Some(target) = outcome.uri_target {
                    println!("{}\t{target}", curi.uri);
                    diverted += 1;
                }
            }
            Err(e) => {
                failed += 1;
                tracing::error!(uri = %curi.uri, error = %e, "Diversion not logged");
            }
        }
    }
    processor.close();

    tracing::info!(diverted, failed, "Divert finished");
    if failed > 0 {
        anyhow::bail!("{failed} diversions could not be logged");
    }
    Ok(())
}

fn cat(source: &str, all: bool) -> Result<()> {
    let reader = journal::open_source(source)
        .with_context(|| format!("Failed to open journal: {source}"))?;

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    for entry in JournalReader::new(reader) {
        match entry? {
            JournalEntry::Data(line) => writeln!(out, "{line}")?,
            JournalEntry::Timestamp(ts) if all => writeln!(out, "T {ts}")?,
            JournalEntry::Error { timestamp, message } if all => {
                writeln!(out, "E {timestamp} {message}")?
            }
            _ => {}
        }
    }
    out.flush()?;
    Ok(())
}
