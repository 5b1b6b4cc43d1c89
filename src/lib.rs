//! Pantier: time-aligned annotation model and multi-format converter.
//!
//! Pantier reads linguistic annotation files (ELAN, Praat, NIST sclite,
//! subtitles, HTK, CSV, plain text) into one superset model, lets callers
//! edit it through validated tier operations, and writes it back in any
//! supported format, degrading or rejecting what the target cannot express.
//!
//! # Modules
//!
//! - [`ir`]: The annotation model (Point, Interval, Tag, Label, Tier, Transcription, etc.) and the format readers/writers
//! - [`adapter`]: Format adapters, their capabilities, and the dispatcher
//! - [`conversion`]: Lossiness reports for conversions between formats
//! - [`validation`]: Structural validation and error reporting
//! - [`batch`]: Parallel conversion of a directory tree
//! - [`error`]: Error types for pantier operations

pub mod adapter;
pub mod batch;
pub mod conversion;
pub mod error;
pub mod ir;
pub mod validation;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

pub use adapter::{Capabilities, Dispatcher, FormatAdapter, Registry};
pub use error::PantierError;

/// The pantier CLI application.
#[derive(Parser)]
#[command(name = "pantier")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Convert an annotation file to another format.
    Convert(ConvertArgs),
    /// Validate an annotation file for errors and warnings.
    Validate(ValidateArgs),
    /// List supported formats and their capabilities.
    Formats(FormatsArgs),
    /// Convert every annotation file under a directory.
    Batch(BatchArgs),
}

/// Output format for reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Arguments for the convert subcommand.
#[derive(clap::Args)]
struct ConvertArgs {
    /// Input file; its extension selects the reader.
    input: PathBuf,

    /// Output file; its extension selects the writer.
    output: PathBuf,

    /// Detect the input format from content when its extension is unknown.
    #[arg(long)]
    heuristic: bool,

    /// Output format for the conversion report.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    report: OutputFormat,

    /// Write even if the target format loses information.
    #[arg(long)]
    allow_lossy: bool,
}

/// Arguments for the validate subcommand.
#[derive(clap::Args)]
struct ValidateArgs {
    /// Input file to validate.
    input: PathBuf,

    /// Detect the input format from content when its extension is unknown.
    #[arg(long)]
    heuristic: bool,

    /// Treat warnings as errors (exit non-zero if any warnings).
    #[arg(long)]
    strict: bool,

    /// Output format for the report.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

/// Arguments for the formats subcommand.
#[derive(clap::Args)]
struct FormatsArgs {
    /// Output format for the listing.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

/// Arguments for the batch subcommand.
#[derive(clap::Args)]
struct BatchArgs {
    /// Directory to read.
    input: PathBuf,

    /// Directory to write; the input layout is kept.
    output: PathBuf,

    /// Extension of the output files (e.g. 'eaf', 'textgrid').
    #[arg(long)]
    to: String,

    /// Worker threads (0 = available parallelism).
    #[arg(long, env = "PANTIER_JOBS", default_value_t = 0)]
    jobs: usize,

    /// Also convert files with unknown extensions, detected from content.
    #[arg(long)]
    heuristic: bool,

    /// Output format for the summary.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output_format: OutputFormat,
}

/// Run the pantier CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), PantierError> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Convert(args)) => run_convert(args),
        Some(Commands::Validate(args)) => run_validate(args),
        Some(Commands::Formats(args)) => run_formats(args),
        Some(Commands::Batch(args)) => run_batch(args),
        None => {
            println!("pantier {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Time-aligned annotation model and multi-format converter.");
            println!();
            println!("Run 'pantier --help' for usage information.");
            Ok(())
        }
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the default `pantier=warn`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pantier=warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, PantierError> {
    serde_json::to_string_pretty(value).map_err(|source| PantierError::ReportJson { source })
}

/// Execute the convert subcommand.
fn run_convert(args: ConvertArgs) -> Result<(), PantierError> {
    let dispatcher = Dispatcher::default();
    let target = dispatcher.adapter_for(&args.output).ok_or_else(|| {
        PantierError::UnsupportedExtension {
            path: args.output.clone(),
            extension: args
                .output
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    })?;

    let mut trs = dispatcher.read(&args.input, args.heuristic)?;
    let from = trs
        .metadata
        .get("file_reader")
        .cloned()
        .unwrap_or_default();
    let report = conversion::build_conversion_report(
        &trs,
        &from,
        target.name(),
        &target.capabilities(),
    );

    // A rejected conversion is left to the writer, which names the cause.
    if report.is_lossy() && !report.is_rejected() && !args.allow_lossy {
        return Err(PantierError::LossyConversion { report });
    }

    dispatcher.write(&mut trs, &args.output)?;

    match args.report {
        OutputFormat::Json => println!("{}", to_json(&report)?),
        OutputFormat::Text => {
            println!(
                "Converted {} ({}) -> {} ({})",
                args.input.display(),
                report.from,
                args.output.display(),
                report.to
            );
            print!("{}", report);
        }
    }
    Ok(())
}

/// Execute the validate subcommand.
fn run_validate(args: ValidateArgs) -> Result<(), PantierError> {
    let trs = Dispatcher::default().read(&args.input, args.heuristic)?;

    let opts = validation::ValidateOptions {
        strict: args.strict,
    };
    let report = validation::validate_transcription(&trs, &opts);

    match args.output {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "error_count": report.error_count(),
                "warning_count": report.warning_count(),
                "issues": report.issues,
            });
            println!("{}", to_json(&value)?);
        }
        OutputFormat::Text => print!("{}", report),
    }

    validation::ensure_valid(report, &opts)
}

/// Execute the formats subcommand.
fn run_formats(args: FormatsArgs) -> Result<(), PantierError> {
    let registry = Registry::with_default_adapters();

    match args.output {
        OutputFormat::Json => {
            let formats: Vec<_> = registry
                .adapters()
                .map(|a| {
                    serde_json::json!({
                        "name": a.name(),
                        "extensions": a.extensions(),
                        "capabilities": a.capabilities(),
                    })
                })
                .collect();
            println!("{}", to_json(&formats)?);
        }
        OutputFormat::Text => {
            for adapter in registry.adapters() {
                let supported: Vec<&str> = adapter
                    .capabilities()
                    .flags()
                    .iter()
                    .filter(|(_, on)| *on)
                    .map(|(name, _)| *name)
                    .collect();
                println!(
                    "{:<10} .{:<9} {}",
                    adapter.name(),
                    adapter.extensions().join(", ."),
                    supported.join(" ")
                );
            }
        }
    }
    Ok(())
}

/// Execute the batch subcommand.
fn run_batch(args: BatchArgs) -> Result<(), PantierError> {
    let opts = batch::BatchOptions {
        jobs: args.jobs,
        target_extension: args.to,
        heuristic: args.heuristic,
    };
    let report = batch::convert_tree(&Dispatcher::default(), &args.input, &args.output, &opts)?;

    match args.output_format {
        OutputFormat::Json => println!("{}", to_json(&report)?),
        OutputFormat::Text => {
            println!(
                "Converted {} file(s), {} failed, {} skipped",
                report.converted.len(),
                report.failed.len(),
                report.skipped
            );
            for failure in &report.failed {
                println!("  - {}: {}", failure.path.display(), failure.message);
            }
        }
    }

    if report.is_ok() {
        Ok(())
    } else {
        Err(PantierError::BatchFailed {
            failed: report.failed.len(),
        })
    }
}
