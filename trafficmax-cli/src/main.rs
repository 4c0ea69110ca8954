//! CLI for the trafficmax sensor aggregation pipeline.
//!
//! Provides commands for running the pipeline over input files and for
//! inspecting how lines are parsed.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use trafficmax::{LineSource, Pipeline, PipelineConfig};

/// trafficmax — Peak car counts per traffic light, per timestamp.
#[derive(Parser)]
#[command(name = "trafficmax", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Aggregate one or more input files and print the maximum report.
    Run {
        /// Input files, one producer thread per file.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// JSON file with pipeline settings; flags below override it.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Channel capacity (records queued between producers and consumers).
        #[arg(long)]
        capacity: Option<usize>,

        /// Number of consumer threads.
        #[arg(long)]
        consumers: Option<usize>,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Do not print a line per consumed record.
        #[arg(long)]
        quiet: bool,
    },

    /// Parse an input file and print each record as a JSON line.
    Parse {
        /// Input file to parse.
        input: PathBuf,
    },
}

/// Output format for the final report.
#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable report lines.
    Text,
    /// Pretty-printed JSON document.
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            inputs,
            config,
            capacity,
            consumers,
            format,
            quiet,
        } => cmd_run(&inputs, config.as_deref(), capacity, consumers, &format, quiet),
        Commands::Parse { input } => cmd_parse(&input),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Implements `trafficmax run <inputs>...`.
///
/// Returns `Ok(false)` when the report was printed but some input could not
/// be read to the end.
fn cmd_run(
    inputs: &[PathBuf],
    config_path: Option<&Path>,
    capacity: Option<usize>,
    consumers: Option<usize>,
    format: &OutputFormat,
    quiet: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let mut config = match config_path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(capacity) = capacity {
        config.capacity = capacity;
    }
    if let Some(consumers) = consumers {
        config.consumers = consumers;
    }

    let pipeline = Pipeline::new(config)?;
    tracing::debug!(config = ?pipeline.config(), inputs = inputs.len(), "starting pipeline");

    let echo = !quiet && *format == OutputFormat::Text;
    let report = pipeline.run_files(inputs, |record| {
        if echo {
            println!("Consumed: {record}");
        }
    })?;

    for e in &report.source_errors {
        eprintln!("Warning: {e}");
    }

    match format {
        OutputFormat::Text => println!("{report}"),
        OutputFormat::Json => println!("{}", report.to_json_pretty()?),
    }

    Ok(report.is_complete())
}

/// Implements `trafficmax parse <input>`.
fn cmd_parse(input: &Path) -> Result<bool, Box<dyn std::error::Error>> {
    let mut source = LineSource::open(input)?;

    for record in source.by_ref() {
        println!("{}", serde_json::to_string(&record?)?);
    }

    if source.lines_skipped() > 0 {
        eprintln!(
            "Skipped {} of {} line(s) without a timestamp",
            source.lines_skipped(),
            source.lines_read()
        );
    }

    Ok(true)
}
