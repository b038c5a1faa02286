use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};

use product_enricher::archiver::{self, RunArchive};
use product_enricher::{
    BatchContext, EngineConfig, HttpFetcher, RequiredFields, extract_all, join_rows, telemetry,
};

/// Enrich a list of product identifiers with title, price, image, description and rating.
#[derive(Parser, Debug)]
#[command(name = "product-enricher")]
struct Args {
    /// Identifiers to look up
    ids: Vec<String>,

    /// File with one identifier per line (`#` starts a comment)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// JSON engine config; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the three-attempt profile
    #[arg(long)]
    simplified: bool,

    #[arg(long)]
    max_attempts: Option<u32>,

    /// Only process the first K unique identifiers
    #[arg(short, long)]
    limit: Option<usize>,

    /// Also require a price before an item counts as found
    #[arg(long)]
    require_price: bool,

    #[arg(short, long, default_value = "archive.json")]
    output: PathBuf,
}

fn read_identifiers(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading identifiers from {}", path.display()))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn build_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None if args.simplified => EngineConfig::simplified(),
        None => EngineConfig::default(),
    };
    if args.simplified {
        config.max_attempts = EngineConfig::simplified().max_attempts;
    }
    if let Some(max_attempts) = args.max_attempts {
        config.max_attempts = max_attempts;
    }
    if args.limit.is_some() {
        config.max_items = args.limit;
    }
    if args.require_price {
        config.required_fields = RequiredFields::TitlePriceImage;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    telemetry::init_telemetry();
    let args = Args::parse();
    let config = build_config(&args)?;

    let mut rows = args.ids.clone();
    if let Some(path) = &args.input {
        rows.extend(read_identifiers(path)?);
    }
    if rows.is_empty() {
        bail!("no identifiers given; pass them as arguments or with --input");
    }

    let mut ctx = BatchContext::new().with_progress(|p| {
        println!("Processed {} of {} products ({})", p.completed, p.total, p.identifier);
    });
    let fetcher = HttpFetcher::new(config.request_timeout());
    let outcome = extract_all(&mut ctx, &config, &fetcher, &rows)?;

    let log = ctx.log.drain();
    for event in &log {
        println!("{:<8} {event}", event.severity);
    }

    let joined = join_rows(rows, |row| row.as_str(), &outcome.results, &config);
    let archive = RunArchive::new(&outcome.summary, &joined, &ctx.failures, &log);
    archiver::save_to_file(&archive, &args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;

    if !ctx.failures.is_empty() {
        let failed: Vec<_> = ctx.failures.iter().collect();
        warn!(count = failed.len(), "no usable result for: {}", failed.join(", "));
    }
    info!(
        succeeded = outcome.summary.succeeded,
        total = outcome.summary.total,
        output = %args.output.display(),
        "Products archived."
    );
    Ok(())
}
