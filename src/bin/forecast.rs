//! Run the full multi-model forecast over a daily OHLCV CSV file
//!
//! Usage: cargo run --bin forecast -- --data prices.csv --horizon 30
//!
//! The CSV is expected to have a header row with
//! `date,open,high,low,close,volume` columns, dates in ISO-8601.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use forecast_ml::prelude::*;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-model price forecast")]
struct Args {
    /// Path to a daily OHLCV CSV file
    #[arg(short, long)]
    data: PathBuf,

    /// Forecast horizon in trading days
    #[arg(long, default_value = "30")]
    horizon: usize,

    /// Lookback window for the sequence regressor
    #[arg(long, default_value = "20")]
    lookback: usize,

    /// Monte Carlo paths for the GBM band forecast
    #[arg(long, default_value = "1000")]
    paths: usize,

    /// Seed for every random source in the run
    #[arg(long, default_value = "42")]
    seed: u64,
}

fn load_series(path: &PathBuf) -> Result<PriceSeries> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut bars = Vec::new();
    for record in reader.records() {
        let record = record?;
        let date: NaiveDate = record
            .get(0)
            .context("missing date column")?
            .parse()
            .context("date must be ISO-8601")?;
        let field = |i: usize| -> Result<f64> {
            record
                .get(i)
                .with_context(|| format!("missing column {i}"))?
                .parse::<f64>()
                .with_context(|| format!("column {i} is not numeric"))
        };

        bars.push(Bar::new(
            date,
            field(1)?,
            field(2)?,
            field(3)?,
            field(4)?,
            field(5)?,
        ));
    }

    Ok(PriceSeries::new(bars)?)
}

fn print_model(name: &str, metrics: &Metrics, point: &[f64]) {
    println!(
        "{:<10} MAE {:>8.3}  RMSE {:>8.3}  MAPE {:>6.2}%  (day 1: {:.2}, day {}: {:.2})",
        name,
        metrics.mae,
        metrics.rmse,
        metrics.mape,
        point[0],
        point.len(),
        point[point.len() - 1],
    );
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forecast_ml=info".into()),
        )
        .init();

    let args = Args::parse();

    println!("===========================================");
    println!("  Multi-Model Price Forecast");
    println!("===========================================\n");

    let series = load_series(&args.data)?;
    info!(bars = series.len(), "loaded series");
    println!("Loaded {} daily bars\n", series.len());

    let config = PipelineConfig {
        horizon: args.horizon,
        tree: TreeSearchConfig {
            seed: args.seed,
            ..Default::default()
        },
        gbm: GbmConfig {
            n_paths: args.paths,
            seed: args.seed,
            ..Default::default()
        },
        trainer: TrainerConfig {
            lookback: args.lookback,
            ..Default::default()
        },
        ..Default::default()
    };

    let mut substrate = LinearWindowModel::new(args.lookback, 0.1);
    let report = run(
        &series,
        &mut substrate,
        &config,
        &mut TracingProgress,
        &CancelToken::new(),
    )?;

    println!("\n=== Test-Set Accuracy & {}-Day Forecast ===\n", args.horizon);

    for (name, model) in [
        ("tree", &report.tree),
        ("gbm", &report.gbm),
        ("sequence", &report.sequence),
    ] {
        match model {
            Some(run) => print_model(name, &run.metrics, &run.point),
            None => println!("{name:<10} failed"),
        }
    }

    for (name, err) in &report.failures {
        println!("\nwarning: {name} failed: {err}");
    }

    if let Some(ensemble) = &report.ensemble {
        println!("\n=== Ensemble ===\n");
        println!("{:>4}  {:>10}  {:>10}  {:>10}", "day", "lower5", "point", "upper95");
        for t in 0..ensemble.point.len() {
            println!(
                "{:>4}  {:>10.2}  {:>10.2}  {:>10.2}",
                t + 1,
                ensemble.lower5[t],
                ensemble.point[t],
                ensemble.upper95[t],
            );
        }
    }

    Ok(())
}
