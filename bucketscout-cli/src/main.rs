use anyhow::{bail, Context, Result};
use bucketscout::{
    ensure_bucket, search, DirectoryStore, MatchResult, SearchConfig, SearchError, SearchEvent,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::borrow::Cow;
use std::io::{self, IsTerminal, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bucketscout", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
struct CliSearchConfig {
    /// Substring to search for
    query: String,

    /// Bucket to search
    #[arg(short, long)]
    bucket: Option<String>,

    /// Only search keys starting with this prefix (may be a regular expression)
    #[arg(short, long)]
    prefix: Option<String>,

    /// Ignore ASCII case of the query while searching
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// Directory whose subdirectories are buckets
    #[arg(short = 'r', long = "root")]
    root: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print one JSON object per match
    #[arg(long)]
    json: bool,

    /// Print search statistics after the matches
    #[arg(short, long)]
    stats: bool,

    /// Log progress to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the objects of a bucket for a substring
    Search(Box<CliSearchConfig>),

    /// Print the version of bucketscout
    Version,
}

#[derive(Serialize)]
struct JsonMatch<'a> {
    bucket: &'a str,
    key: &'a str,
    line: usize,
    excerpt: Cow<'a, str>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Search(args) => run_search(*args),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_search(args: CliSearchConfig) -> Result<()> {
    let cli_config = SearchConfig {
        query: args.query,
        bucket: args.bucket.unwrap_or_default(),
        prefix: args.prefix,
        ignore_case: args.ignore_case,
        store_root: args.root.unwrap_or_else(|| PathBuf::from(".")),
        parallelism: args.threads,
        log_level: if args.verbose { "debug" } else { "warn" }.to_string(),
    };

    let file_config = SearchConfig::load_from(args.config.as_deref())
        .context("Failed to load configuration")?;
    let config = file_config.merge_with_cli(cli_config);

    init_logging(&config.log_level);
    debug!("Effective configuration: {:?}", config);
    if !io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let request = config.request()?;
    let store = DirectoryStore::new(&config.store_root);

    match ensure_bucket(&store, &request.bucket) {
        Ok(()) => {}
        Err(SearchError::BucketNotFound(bucket)) => bail!(
            "The bucket `{}` was not found under `{}`",
            bucket,
            config.store_root.display()
        ),
        Err(e) => return Err(e.into()),
    }

    let mut stream = search(Arc::new(store), &request)?;
    let bucket = stream.bucket().to_string();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for event in stream.by_ref() {
        match event {
            SearchEvent::Match(result) => print_match(&mut out, &bucket, &result, args.json)?,
            SearchEvent::FetchFailed(failure) => eprintln!("{}", failure),
        }
    }

    if args.stats {
        writeln!(out, "{}", stream.summary())?;
    }
    out.flush()?;
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn print_match(out: &mut impl Write, bucket: &str, result: &MatchResult, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(&JsonMatch {
            bucket,
            key: &result.key,
            line: result.line_number,
            excerpt: result.excerpt_lossy(),
        })?;
        writeln!(out, "{}", line)?;
    } else {
        writeln!(
            out,
            "{} {}:{}",
            format!("{}/{}", bucket, result.key).blue(),
            result.line_number.to_string().green(),
            result.excerpt_lossy()
        )?;
    }
    Ok(())
}
