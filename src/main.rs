use anyhow::{Context, Result};
use catalog_loader::config::{DEFAULT_MAX_CONNECTIONS, MIN_LOAD_CONNECTIONS};
use catalog_loader::load::{load_catalog, LoadReport};
use catalog_loader::models::Catalog;
use catalog_loader::parser::parse_file;
use catalog_loader::store::PgCatalogStore;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "catalog-loader")]
#[command(about = "Parse product-catalog dumps and bulk-load them into PostgreSQL")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a dump and write the collections as CSV files
    Extract(ExtractArgs),
    /// Create the catalog tables
    Schema(SchemaArgs),
    /// Parse a dump and load it into PostgreSQL
    Load(LoadArgs),
}

#[derive(Args)]
struct ExtractArgs {
    /// Path to the catalog dump (plain, .gz or .bz2)
    #[arg(short, long)]
    input: String,

    /// Output directory for CSV files
    #[arg(short, long, required_unless_present = "dry_run")]
    output: Option<String>,

    /// Dry run - parse and report, don't write output files
    #[arg(long)]
    dry_run: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SchemaArgs {
    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[derive(Args)]
struct LoadArgs {
    /// Path to the catalog dump (plain, .gz or .bz2)
    #[arg(short, long)]
    input: String,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Connection pool size (at least 3: one per concurrent load branch)
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_CONNECTIONS,
        value_parser = clap::value_parser!(u32).range(MIN_LOAD_CONNECTIONS as i64..)
    )]
    max_connections: u32,

    /// Create the catalog tables before loading
    #[arg(long)]
    create_schema: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

fn print_parse_summary(catalog: &Catalog, elapsed_secs: f64) {
    let stats = &catalog.stats;
    println!();
    println!("=== Parse Summary ===");
    println!("Parse time:           {:.2}s", elapsed_secs);
    println!("Lines read:           {}", stats.lines_read);
    println!("Blocks closed:        {}", stats.blocks_closed);
    println!("Products:             {}", catalog.products.len());
    println!("Duplicate products:   {}", stats.duplicate_products);
    println!("Blocks without ASIN:  {}", stats.blocks_without_identifier);
    println!("Categories:           {}", catalog.categories.len());
    println!("Category links:       {}", catalog.product_categories.len());
    println!("Similar links:        {}", catalog.similar.len());
    println!("Reviews:              {}", catalog.reviews.len());
    println!("Dropped categories:   {}", stats.malformed_categories);
    println!("Dropped reviews:      {}", stats.malformed_reviews);
}

fn print_load_summary(report: &LoadReport) {
    println!();
    println!("=== Load Summary ===");
    println!("Load time:            {:.2}s", report.elapsed().as_secs_f64());
    for phase in report.summary() {
        let label = format!("{}:", phase.collection);
        match (phase.rows, phase.error) {
            (Some(rows), _) => println!("{label:<22}loaded {rows} rows"),
            (None, Some(error)) => println!("{label:<22}{}: {error}", phase.status),
            (None, None) => println!("{label:<22}{}", phase.status),
        }
    }
}

fn parse_timed(input: &str) -> Result<(Catalog, f64)> {
    let start = Instant::now();
    let catalog = parse_file(input)?;
    Ok((catalog, start.elapsed().as_secs_f64()))
}

fn run_extract(args: ExtractArgs) -> Result<()> {
    let (catalog, parse_secs) = parse_timed(&args.input)?;

    if let Some(output) = args.output.as_deref().filter(|_| !args.dry_run) {
        catalog_loader::extract::write_csvs(&catalog, output)?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&catalog.stats)?);
    } else {
        print_parse_summary(&catalog, parse_secs);
    }
    Ok(())
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .thread_name("catalog-load-worker")
        .enable_io()
        .enable_time()
        .build()
        .context("Failed to build tokio runtime")
}

fn run_schema(args: SchemaArgs) -> Result<()> {
    build_runtime()?.block_on(async {
        let store = PgCatalogStore::connect(&args.database_url, 1).await?;
        store.create_schema().await?;
        info!("Catalog schema created");
        anyhow::Ok(())
    })
}

fn run_load(args: LoadArgs) -> Result<()> {
    // Parse before connecting: an unreadable dump must abort before any load.
    let (catalog, parse_secs) = parse_timed(&args.input)?;
    let stats = catalog.stats.clone();
    if !args.json {
        print_parse_summary(&catalog, parse_secs);
    }

    let report = build_runtime()?.block_on(async {
        let store = PgCatalogStore::connect(&args.database_url, args.max_connections).await?;
        if args.create_schema {
            store.create_schema().await?;
        }
        anyhow::Ok(load_catalog(Arc::new(store), catalog).await)
    })?;

    if args.json {
        let summary = json!({ "parse": stats, "load": report.summary() });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_load_summary(&report);
    }

    report.ensure_success()
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Extract(args) => run_extract(args),
        Commands::Schema(args) => run_schema(args),
        Commands::Load(args) => run_load(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
