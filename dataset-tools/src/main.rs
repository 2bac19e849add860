mod analyzer;
mod config;
mod error;
mod formats;
mod jsonl;
mod preprocessor;
mod schema;
mod types;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::config::PreprocessConfig;
use crate::error::DatasetError;

/// Validation, statistics and training-format conversion for
/// conversational JSONL datasets.
#[derive(Parser)]
#[command(name = "dataset-tools")]
#[command(version)]
#[command(about = "Validate, analyze and preprocess conversational training data")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate dataset files and print statistics
    Analyze {
        /// JSONL files or directories containing them
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Print the report as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Check dataset files against the conversation schema only
    Validate {
        /// JSONL files or directories containing them
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Combine clean dataset files into a single JSONL file
    Combine {
        /// JSONL files or directories, combined in the order given
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Combined output file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Expand conversations into training examples and write train/val/test splits
    Preprocess {
        /// Conversation JSONL file
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for the split files
        #[arg(short, long)]
        output_dir: PathBuf,

        /// YAML file with preprocessing defaults
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format (alpaca, chatml, simple); repeat for several
        #[arg(long = "format", value_name = "NAME")]
        formats: Vec<String>,

        #[arg(long)]
        train_ratio: Option<f64>,

        #[arg(long)]
        val_ratio: Option<f64>,

        #[arg(long)]
        test_ratio: Option<f64>,

        /// Include all prior turns in each example's context
        #[arg(long, value_name = "BOOL")]
        include_context: Option<bool>,

        /// System preamble used as the Alpaca instruction and ChatML system turn
        #[arg(long)]
        system_prompt: Option<String>,

        /// Drop duplicate (context, target) examples
        #[arg(long)]
        dedup: bool,

        /// Number of examples to preview (0 disables)
        #[arg(long)]
        preview: Option<usize>,
    },
}

/// Command-line values layered over the config file.
struct PreprocessOverrides {
    formats: Vec<String>,
    train_ratio: Option<f64>,
    val_ratio: Option<f64>,
    test_ratio: Option<f64>,
    include_context: Option<bool>,
    system_prompt: Option<String>,
    dedup: bool,
    preview: Option<usize>,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<DatasetError>()
        .map_or(1, DatasetError::exit_code)
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Analyze { inputs, json } => run_analyze(&inputs, json),
        Commands::Validate { inputs } => run_validate(&inputs),
        Commands::Combine { inputs, output } => run_combine(&inputs, &output),
        Commands::Preprocess {
            input,
            output_dir,
            config,
            formats,
            train_ratio,
            val_ratio,
            test_ratio,
            include_context,
            system_prompt,
            dedup,
            preview,
        } => {
            let overrides = PreprocessOverrides {
                formats,
                train_ratio,
                val_ratio,
                test_ratio,
                include_context,
                system_prompt,
                dedup,
                preview,
            };
            let config = build_config(config.as_deref(), overrides)?;
            run_preprocess(&input, &output_dir, &config)
        }
    }
}

fn run_analyze(inputs: &[PathBuf], json: bool) -> Result<()> {
    let report = analyzer::analyze(inputs).context("analyzing dataset")?;

    if json {
        let rendered = serde_json::to_string_pretty(&report).context("serializing report")?;
        println!("{}", rendered);
    } else {
        analyzer::print_report(&report);
    }

    let count = report.error_count();
    if count > 0 {
        return Err(DatasetError::InvalidRecords { count }.into());
    }
    Ok(())
}

fn run_validate(inputs: &[PathBuf]) -> Result<()> {
    let files = jsonl::collect_inputs(inputs)?;
    let mut count = 0;

    for path in &files {
        let result = analyzer::validate(path)
            .with_context(|| format!("validating {}", path.display()))?;
        if result.is_valid() {
            println!("{}: OK ({} records)", path.display(), result.records);
            continue;
        }
        println!(
            "{}: {} error(s) in {} records",
            path.display(),
            result.errors.len(),
            result.records
        );
        for error in &result.errors {
            println!("  - line {}: {}", error.line, error.message);
        }
        count += result.errors.len();
    }

    if count > 0 {
        return Err(DatasetError::InvalidRecords { count }.into());
    }
    Ok(())
}

fn run_combine(inputs: &[PathBuf], output: &Path) -> Result<()> {
    let written = analyzer::combine(inputs, output)
        .with_context(|| format!("combining into {}", output.display()))?;
    println!("Combined {} conversations into {}", written, output.display());
    Ok(())
}

fn build_config(path: Option<&Path>, overrides: PreprocessOverrides) -> Result<PreprocessConfig> {
    let mut config = match path {
        Some(path) => PreprocessConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PreprocessConfig::default(),
    };

    if !overrides.formats.is_empty() {
        config.formats = overrides.formats;
    }
    if let Some(ratio) = overrides.train_ratio {
        config.train_ratio = ratio;
    }
    if let Some(ratio) = overrides.val_ratio {
        config.val_ratio = ratio;
    }
    if let Some(ratio) = overrides.test_ratio {
        config.test_ratio = ratio;
    }
    if let Some(include_context) = overrides.include_context {
        config.include_context = include_context;
    }
    if let Some(system_prompt) = overrides.system_prompt {
        config.system_prompt = system_prompt;
    }
    if overrides.dedup {
        config.dedup = true;
    }
    if let Some(preview) = overrides.preview {
        config.preview = preview;
    }

    Ok(config)
}

fn run_preprocess(input: &Path, output_dir: &Path, config: &PreprocessConfig) -> Result<()> {
    let summary = preprocessor::preprocess(input, output_dir, config)
        .with_context(|| format!("preprocessing {}", input.display()))?;

    println!("\nLoaded {} conversations", summary.conversations);
    println!("Created {} training examples", summary.examples);
    if summary.duplicates_removed > 0 {
        println!("Removed {} duplicate examples", summary.duplicates_removed);
    }
    println!("\nDataset splits:");
    println!("  Training: {} examples", summary.train);
    println!("  Validation: {} examples", summary.validation);
    println!("  Test: {} examples", summary.test);
    println!("\nWrote:");
    for file in &summary.files {
        println!("  {}", file.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_overrides() -> PreprocessOverrides {
        PreprocessOverrides {
            formats: Vec::new(),
            train_ratio: None,
            val_ratio: None,
            test_ratio: None,
            include_context: None,
            system_prompt: None,
            dedup: false,
            preview: None,
        }
    }

    #[test]
    fn test_cli_parses_preprocess() {
        let cli = Cli::try_parse_from([
            "dataset-tools",
            "preprocess",
            "--input",
            "data/processed/combined_dataset.jsonl",
            "--output-dir",
            "data/splits",
            "--format",
            "alpaca",
            "--format",
            "simple",
            "--train-ratio",
            "0.7",
            "--include-context",
            "false",
        ])
        .unwrap();

        match cli.command {
            Commands::Preprocess {
                formats,
                train_ratio,
                include_context,
                dedup,
                ..
            } => {
                assert_eq!(formats, vec!["alpaca", "simple"]);
                assert_eq!(train_ratio, Some(0.7));
                assert_eq!(include_context, Some(false));
                assert!(!dedup);
            }
            _ => panic!("expected preprocess"),
        }
    }

    #[test]
    fn test_cli_requires_inputs() {
        assert!(Cli::try_parse_from(["dataset-tools", "analyze"]).is_err());
        assert!(Cli::try_parse_from(["dataset-tools", "combine", "a.jsonl"]).is_err());
    }

    #[test]
    fn test_build_config_overrides() {
        let mut overrides = no_overrides();
        overrides.formats = vec!["chatml".into()];
        overrides.val_ratio = Some(0.2);
        overrides.test_ratio = Some(0.0);
        overrides.dedup = true;

        let config = build_config(None, overrides).unwrap();
        assert_eq!(config.formats, vec!["chatml"]);
        assert_eq!(config.train_ratio, 0.8);
        assert_eq!(config.val_ratio, 0.2);
        assert_eq!(config.test_ratio, 0.0);
        assert!(config.dedup);
        assert!(config.include_context);
    }

    #[test]
    fn test_build_config_file_then_flags() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("preprocess.yaml");
        std::fs::write(&path, "formats: [simple]\npreview: 0\ninclude_context: false\n").unwrap();

        let mut overrides = no_overrides();
        overrides.include_context = Some(true);

        let config = build_config(Some(path.as_path()), overrides).unwrap();
        assert_eq!(config.formats, vec!["simple"]);
        assert_eq!(config.preview, 0);
        assert!(config.include_context);
    }

    #[test]
    fn test_exit_code_survives_context() {
        let err = anyhow::Error::new(DatasetError::UnsupportedFormat("xml".into()))
            .context("preprocessing input.jsonl");
        assert_eq!(exit_code(&err), 6);

        let err = anyhow::anyhow!("something else");
        assert_eq!(exit_code(&err), 1);
    }
}
