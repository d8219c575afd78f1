//! MQL CLI - Compile metrics queries to query plans
//!
//! Usage:
//!   mql compile <query> --context <context.json> [--dataset <dataset>] [--settings <mql.toml>] [--dry-run] [--output <format>]
//!   mql parse <query> [--output <format>]
//!
//! Examples:
//!   mql compile 'sum(d:transactions/duration@millisecond) by transaction' --context ctx.json
//!   mql compile '(sum(d:a/x@ms) / sum(d:a/y@ms)) by transaction' --context ctx.json --output json
//!   mql parse 'p95(d:transactions/duration@millisecond){env:prod}'

use clap::{Parser, Subcommand, ValueEnum};
use mql::config::Settings;
use mql::pipeline::{compile_query, parse_intermediate, CompileOptions};
use mql::query::{Dataset, Query};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mql")]
#[command(about = "MQL - A compiler for the metrics query language")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an MQL query against a context
    Compile {
        /// The MQL query text
        query: String,

        /// Path to the JSON context file
        #[arg(short, long)]
        context: PathBuf,

        /// Dataset to compile against
        #[arg(short, long, default_value = "generic-metrics")]
        dataset: DatasetArg,

        /// Path to a settings file (defaults to $MQL_CONFIG or ./mql.toml)
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Also print the plan as it was before post-processing
        #[arg(long)]
        dry_run: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// Print the intermediate tree of an MQL query
    Parse {
        /// The MQL query text
        query: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },
}

#[derive(Clone, ValueEnum)]
enum DatasetArg {
    Metrics,
    GenericMetrics,
}

impl From<DatasetArg> for Dataset {
    fn from(arg: DatasetArg) -> Self {
        match arg {
            DatasetArg::Metrics => Dataset::Metrics,
            DatasetArg::GenericMetrics => Dataset::GenericMetrics,
        }
    }
}

/// JSON shape of `mql compile --output json`.
#[derive(Serialize)]
struct CompileReport<'a> {
    query: &'a Query,
    original_ast: Option<&'a str>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable plan
    Text,
    /// Plan serialized as JSON
    Json,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "mql=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile {
            query,
            context,
            dataset,
            settings,
            dry_run,
            output,
        } => cmd_compile(&query, context, dataset, settings, dry_run, output),
        Commands::Parse { query, output } => cmd_parse(&query, output),
    }
}

fn cmd_compile(
    query: &str,
    context: PathBuf,
    dataset: DatasetArg,
    settings: Option<PathBuf>,
    dry_run: bool,
    output: OutputFormat,
) -> ExitCode {
    let raw = match fs::read_to_string(&context) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading context '{}': {}", context.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let context: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Invalid context JSON: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let settings = match settings {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Settings error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let options = CompileOptions::default()
        .with_dataset(dataset.into())
        .with_settings(settings)
        .with_dry_run(dry_run);

    match compile_query(query, &context, &options) {
        Ok(compiled) => {
            match output {
                OutputFormat::Text => {
                    if let Some(original) = &compiled.original_ast {
                        println!("-- Before post-processing");
                        println!("{}", original);
                        println!("-- Compiled");
                    }
                    println!("{}", compiled.query);
                }
                OutputFormat::Json => {
                    let report = CompileReport {
                        query: &compiled.query,
                        original_ast: compiled.original_ast.as_deref(),
                    };
                    match serde_json::to_string_pretty(&report) {
                        Ok(s) => println!("{}", s),
                        Err(e) => {
                            eprintln!("Serialization error: {}", e);
                            return ExitCode::FAILURE;
                        }
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Compilation error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_parse(query: &str, output: OutputFormat) -> ExitCode {
    let node = match parse_intermediate(query) {
        Ok(node) => node,
        Err(e) => {
            eprintln!("Parse error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let OutputFormat::Text = output {
        print!("{}", node);
        return ExitCode::SUCCESS;
    }
    match serde_json::to_string_pretty(&node) {
        Ok(s) => {
            println!("{}", s);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Serialization error: {}", e);
            ExitCode::FAILURE
        }
    }
}
