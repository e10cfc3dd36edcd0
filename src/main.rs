//! rfmseg: RFM customer segmentation dashboard generator
//!
//! This is the main entrypoint that orchestrates data loading, scoring,
//! chart rendering and the optional exports.

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use rfmseg::{load_transactions, report, run_pipeline, viz, Args};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter())),
        )
        .init();

    args.validate()?;

    if args.verbose {
        println!("rfmseg - Customer Segmentation using RFM quartiles");
        println!("==================================================\n");
    }

    run_dashboard(&args)
}

/// Run the full segmentation pipeline
fn run_dashboard(args: &Args) -> Result<()> {
    println!("=== RFM Segmentation Pipeline ===\n");

    let start_time = Instant::now();

    // Step 1: Load data
    if args.verbose {
        println!("Step 1: Loading transactions");
        println!("  Input file: {}", args.input);
        println!("  Encoding: {:?}", args.encoding);
    }

    let data_start = Instant::now();
    let transactions = load_transactions(&args.input, args.encoding)
        .with_context(|| format!("failed to load {}", args.input))?;
    let data_time = data_start.elapsed();

    println!("✓ Data loaded: {} transaction lines", transactions.len());
    if args.verbose {
        println!("  Loading time: {:.2}s", data_time.as_secs_f64());
    }

    // Step 2: Aggregate and score
    if args.verbose {
        println!("\nStep 2: Aggregating and scoring customers");
    }

    let score_start = Instant::now();
    let table = run_pipeline(&transactions).context("segmentation failed")?;
    let score_time = score_start.elapsed();

    println!("✓ Customers scored: {}", table.len());
    if args.verbose {
        println!("  Scoring time: {:.2}s", score_time.as_secs_f64());
    }

    // Step 3: Charts and summary
    if args.verbose {
        match args.chart_dir() {
            Some(dir) => println!("\nStep 3: Rendering charts into {}", dir.display()),
            None => println!("\nStep 3: Chart rendering skipped"),
        }
    }

    let viz_start = Instant::now();
    let dashboard = viz::generate_dashboard(&table, args.chart_dir())?;
    let viz_time = viz_start.elapsed();

    if args.verbose {
        println!("\n  Dashboard time: {:.2}s", viz_time.as_secs_f64());
    }

    // Step 4: Optional exports
    if let Some(path) = &args.export_csv {
        report::write_csv(&table, path).with_context(|| format!("failed to write {}", path))?;
        println!("\nScored table saved to: {}", path);
    }

    if let Some(path) = &args.json {
        write_json(&dashboard, Path::new(path))?;
        println!("Dashboard payload saved to: {}", path);
    }

    let total_time = start_time.elapsed();
    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", total_time.as_secs_f64());

    Ok(())
}

fn write_json(dashboard: &report::Dashboard, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(dashboard)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
