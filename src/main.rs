//! retail-pipeline - batch analytics over retail transaction data
//!
//! Loads the customer, product and transaction files into a relational
//! store, builds sales summary tables with SQL, and renders PNG charts.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Fatal error (config, connection, load, aggregation)
//!   2 - Pipeline completed but at least one chart failed to render

mod analysis;
mod cli;
mod config;
mod error;
mod loader;
mod models;
mod render;
mod report;
mod store;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::Args;
use config::{Config, ReportFormat, CONFIG_FILE};
use error::PipelineError;
use models::{CategoryShare, RunMetadata, RunReport, TopCustomer};
use render::RenderOptions;
use std::path::{Path, PathBuf};
use std::time::Instant;
use store::Store;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if args.init_config {
        return handle_init_config();
    }

    let (mut config, config_source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Configuration failed: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(log_level(&args, &config))?;

    info!("retail-pipeline v{}", env!("CARGO_PKG_VERSION"));
    match config_source {
        Some(path) => info!("Loaded config from: {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }
    debug!("Arguments: {:?}", args);

    match run_pipeline(&args, &config).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            report_failure(&e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default config file.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to point at your database and source files.");
    Ok(())
}

/// Quiet wins, then verbose from either the flag or the config file.
fn log_level(args: &Args, config: &Config) -> tracing::Level {
    if args.quiet {
        tracing::Level::ERROR
    } else if config.general.verbose {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    }
}

fn init_logging(level: tracing::Level) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Load configuration from file or use defaults, returning where it came from.
fn load_config(args: &Args) -> Result<(Config, Option<PathBuf>)> {
    let config = match args.config {
        Some(ref path) => (Config::load(path)?, Some(path.clone())),
        None => match Config::load_default()? {
            Some(config) => (config, Some(PathBuf::from(CONFIG_FILE))),
            None => (Config::default(), None),
        },
    };
    config.0.validate()?;
    Ok(config)
}

/// Print which stage failed, and why.
fn report_failure(e: &anyhow::Error) {
    match e.downcast_ref::<PipelineError>() {
        Some(pipeline_error) => {
            error!("{} stage failed: {}", pipeline_error.stage(), pipeline_error);
            eprintln!("\n❌ {} stage failed: {}", pipeline_error.stage(), pipeline_error);
        }
        None => {
            error!("Pipeline failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
        }
    }
}

/// Connect, run every stage, and always close the store. Returns the exit code.
async fn run_pipeline(args: &Args, config: &Config) -> Result<i32> {
    let start_time = Instant::now();

    println!("🔌 Connecting to database...");
    let store = Store::connect(&config.database).await?;

    let result = run_stages(&store, args, config, start_time).await;
    store.close().await;
    result
}

async fn run_stages(store: &Store, args: &Args, config: &Config, start_time: Instant) -> Result<i32> {
    let show_progress = !args.quiet;
    let output_dir = &config.general.output_dir;

    // Stage 1: load
    println!("\n📥 Loading data...");
    let mut load_options = loader::LoadOptions::from(&config.loader);
    load_options.show_progress = show_progress;
    let loaded = loader::load_sources(store, &config.sources, &load_options).await?;
    for table in &loaded {
        println!("   {} → {} rows", table.table, table.rows);
    }

    // Stage 2: aggregate
    println!("\n🧮 Running SQL transformations...");
    let derived = analysis::run_aggregations(store).await?;
    for table in &derived {
        println!("   {} ({} rows)", table.table, table.rows);
    }

    // Stage 3: render
    println!("\n📊 Generating charts...");
    let mut render_options = RenderOptions::new(output_dir, &config.charts);
    render_options.show_progress = show_progress;
    let charts = render::render_all(store, &render_options).await;
    for chart in &charts {
        match chart.error {
            None => println!("   ✅ {}", chart.path),
            Some(ref e) => println!("   ❌ {}: {}", chart.chart, e),
        }
    }

    let (top_customers, category_shares) = report_highlights(store).await;
    let report = RunReport {
        metadata: RunMetadata {
            run_date: Utc::now(),
            backend: store.backend().to_string(),
            output_dir: output_dir.display().to_string(),
            duration_seconds: start_time.elapsed().as_secs_f64(),
        },
        loaded,
        derived,
        charts,
        top_customers,
        category_shares,
    };

    if config.report.enabled {
        println!("\n📝 Writing run report...");
        if let Err(e) = save_report(&report, config.report.format, output_dir) {
            warn!("{:#}", e);
            eprintln!("   ⚠️  {:#}", e);
        }
    }

    print_summary(&report);

    let failed = report.failed_charts();
    if failed > 0 {
        eprintln!(
            "\n⛔ {} of {} charts failed to render (exit code 2).",
            failed,
            report.charts.len()
        );
        return Ok(2);
    }

    println!(
        "\n✅ Pipeline complete! Charts saved to: {}",
        output_dir.display()
    );
    Ok(0)
}

/// Top customers and category shares for the run report; a failed read only
/// leaves its section empty.
async fn report_highlights(store: &Store) -> (Vec<TopCustomer>, Vec<CategoryShare>) {
    let top_customers = analysis::fetch_top_customers(store)
        .await
        .unwrap_or_else(|e| {
            warn!("Skipping top customers in report: {}", e);
            Vec::new()
        });
    let category_shares = match analysis::fetch_category_sales(store).await {
        Ok(rows) => analysis::category_shares(&rows),
        Err(e) => {
            warn!("Skipping category shares in report: {}", e);
            Vec::new()
        }
    };
    (top_customers, category_shares)
}

fn save_report(report: &RunReport, format: ReportFormat, output_dir: &Path) -> Result<()> {
    let content = match format {
        ReportFormat::Json => report::generate_json_report(report)?,
        ReportFormat::Markdown => report::generate_markdown_report(report),
    };
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let path = report::write_report(&content, output_dir, format.file_name())?;
    info!("Run report saved to {}", path.display());
    Ok(())
}

fn print_summary(report: &RunReport) {
    let rows: usize = report.loaded.iter().map(|t| t.rows).sum();
    let rendered = report.charts.len() - report.failed_charts();

    println!("\n📋 Pipeline Summary:");
    println!(
        "   Rows loaded: {} across {} tables",
        rows,
        report.loaded.len()
    );
    println!("   Summary tables: {}", report.derived.len());
    println!("   Charts: {}/{} rendered", rendered, report.charts.len());
    println!("   Duration: {:.1}s", report.metadata.duration_seconds);
}
