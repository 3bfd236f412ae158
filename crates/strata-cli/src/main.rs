//! Strata CLI - Command Line Interface
//!
//! Command-line tool for inspecting and evaluating Strata expressions and
//! table schemas.
//!
//! Key Features:
//! - Expression parsing, validation and layout inspection
//! - Evaluation over JSON-lines records with live and encoded accumulators
//! - Schema compilation and row layout reporting
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use strata_common::utils::format_duration;
use strata_common::SchemaConfig;
use strata_expr::{EncodedAccumulator, Expr, Params, Record};
use strata_timeseries::Table;

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(Parser)]
#[command(name = "strata")]
#[command(author = "AutomataNexus Development Team")]
#[command(version = "0.1.0")]
#[command(about = "Strata expression and sequence tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an expression and show its canonical form and layout
    Explain { expression: String },
    /// Evaluate an expression over JSON-lines records
    Eval {
        expression: String,
        /// Records file, one JSON object per line (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Metadata record as a JSON object, used by IF conditions
        #[arg(short, long)]
        meta: Option<String>,
    },
    /// Compile a TOML schema and show each table's row layout
    Schema {
        #[arg(short, long, default_value = "strata.toml")]
        config: PathBuf,
    },
}

// =============================================================================
// Commands
// =============================================================================

fn explain(expression: &str) -> Result<()> {
    let expr: Expr = expression.parse()?;
    println!("Expression:  {}", expr);
    println!("Depends on:  {}", expr.depends_on().join(", "));
    println!("Width:       {} bytes", expr.encoded_width());
    println!("Shift:       {}", format_duration(expr.shift()));
    println!("Wire size:   {} bytes", expr.to_bytes()?.len());
    match expr.validate() {
        Ok(()) => println!("Storable:    yes"),
        Err(e) => println!("Storable:    no ({})", e),
    }
    Ok(())
}

fn eval(expression: &str, input: Option<PathBuf>, meta: Option<String>) -> Result<()> {
    let expr: Expr = expression.parse()?;
    let meta: Option<Record> = meta
        .map(|m| serde_json::from_str(&m))
        .transpose()
        .context("metadata must be a JSON object")?;

    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(&path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut live = expr.accumulator();
    let mut encoded = vec![0u8; expr.encoded_width()];
    let mut count = 0usize;

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line)
            .with_context(|| format!("line {}: invalid record", number + 1))?;

        let meta = meta.as_ref().map(|m| m as &dyn Params);
        live.update_with_meta(&record, meta);
        let updated = expr.update(&mut encoded, &record, meta)?;
        count += 1;
        tracing::debug!(line = number + 1, value = updated.value, delta = updated.delta(), "applied record");
    }

    if count == 0 {
        bail!("no records to evaluate");
    }

    let (value, valid) = expr.get(&encoded)?;
    println!("Records:     {}", count);
    println!("Live:        {}", live.get());
    println!("Encoded:     {}{}", value, if valid { "" } else { " (unset)" });
    Ok(())
}

fn schema(config: PathBuf) -> Result<()> {
    let schema = SchemaConfig::from_file(&config)
        .with_context(|| format!("loading {}", config.display()))?;

    for table_config in &schema.tables {
        let table = Table::from_config(table_config)?;
        println!(
            "{} (resolution {}, retention {}, {} periods)",
            table.name(),
            format_duration(table.resolution()),
            format_duration(table.retention()),
            table.max_periods()
        );
        println!("  row width {} bytes, reads {}", table.row_width(), table.depends_on().join(", "));
        for field in table.fields() {
            let range = field.range();
            println!(
                "  {:<16} [{:>4}..{:<4}] {}",
                field.name, range.start, range.end, field.expr
            );
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Explain { expression } => explain(&expression),
        Commands::Eval {
            expression,
            input,
            meta,
        } => eval(&expression, input, meta),
        Commands::Schema { config } => schema(config),
    }
}
