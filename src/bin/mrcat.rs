use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use mri_catalog::app::{IndexOptions, IndexResult, ProgressSink, RunsResult, open_dataset};
use mri_catalog::config::{Config, ConfigLoader};
use mri_catalog::error::CatalogError;
use mri_catalog::output::{JsonOutput, LogSink, OutputMode, TextOutput};
use mri_catalog::store::Store;

#[derive(Parser)]
#[command(name = "mrcat")]
#[command(about = "Index BIDS-like MRI datasets into a cached subject/session/run catalog")]
#[command(version, author)]
struct Cli {
    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Build or load the catalog and print a summary")]
    Index(DatasetArgs),
    #[command(about = "List every run in the catalog with its echo time")]
    Runs(DatasetArgs),
}

#[derive(Args, Clone)]
struct DatasetArgs {
    /// JSON config file (defaults to ./mrcat.json when present).
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    data_root: Option<Utf8PathBuf>,

    #[arg(long)]
    metadata_root: Option<Utf8PathBuf>,

    /// Keep localizer/scout/phantom/ACR acquisitions (`--include-phantom=false` to override the config).
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    include_phantom: Option<bool>,

    /// Merge NIfTI header fields into sidecar parameters.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    include_header: Option<bool>,

    #[arg(long)]
    seed_extension: Option<String>,

    /// Discard the cached catalog and rebuild it.
    #[arg(long)]
    reindex: bool,
}

impl DatasetArgs {
    fn overrides(&self) -> Config {
        Config {
            schema_version: None,
            name: self.name.clone(),
            data_root: self.data_root.clone(),
            metadata_root: self.metadata_root.clone(),
            include_phantom: self.include_phantom,
            include_header: self.include_header,
            seed_extension: self.seed_extension.clone(),
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CatalogError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CatalogError) -> u8 {
    match error {
        CatalogError::EmptyDataset(_)
        | CatalogError::DataRootMissing(_)
        | CatalogError::ConfigRead(_)
        | CatalogError::ConfigParse(_)
        | CatalogError::InvalidConfig(_) => 2,
        CatalogError::CacheLoad { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    match cli.command {
        Commands::Index(args) => {
            let result = IndexResult::from(&open(&args, output_mode)?);
            match output_mode {
                OutputMode::Json => JsonOutput::print_index(&result).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_index(&result),
            }
            Ok(())
        }
        Commands::Runs(args) => {
            let result = RunsResult::from(&open(&args, output_mode)?);
            match output_mode {
                OutputMode::Json => JsonOutput::print_runs(&result).into_diagnostic()?,
                OutputMode::Text => TextOutput::print_runs(&result),
            }
            Ok(())
        }
    }
}

fn open(args: &DatasetArgs, output_mode: OutputMode) -> miette::Result<mri_catalog::app::Catalog> {
    let config = ConfigLoader::resolve(args.config.as_deref(), args.overrides())?;
    Store::new_with_root(config.metadata_root.clone()).ensure_metadata_root()?;
    let options = IndexOptions {
        reindex: args.reindex,
    };
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Text => &LogSink,
    };
    Ok(open_dataset(&config, &options, sink)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset_args(argv: &[&str]) -> DatasetArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Index(args) | Commands::Runs(args) => args,
        }
    }

    #[test]
    fn include_flags_default_to_config() {
        let overrides = dataset_args(&["mrcat", "index"]).overrides();
        assert_eq!(overrides.include_phantom, None);
        assert_eq!(overrides.include_header, None);
    }

    #[test]
    fn bare_include_flag_means_true() {
        let overrides = dataset_args(&["mrcat", "runs", "--include-phantom"]).overrides();
        assert_eq!(overrides.include_phantom, Some(true));
        assert_eq!(overrides.include_header, None);
    }

    #[test]
    fn include_flags_can_turn_config_off() {
        let overrides = dataset_args(&[
            "mrcat",
            "index",
            "--include-phantom=false",
            "--include-header",
            "false",
        ])
        .overrides();
        assert_eq!(overrides.include_phantom, Some(false));
        assert_eq!(overrides.include_header, Some(false));
    }

    #[test]
    fn exit_codes_separate_cache_errors() {
        let cache = CatalogError::CacheLoad {
            path: Utf8PathBuf::from("/meta/demo.catalog.json"),
            reason: "truncated".to_string(),
        };
        assert_eq!(map_exit_code(&cache), 3);
        assert_eq!(map_exit_code(&CatalogError::EmptyDataset(Utf8PathBuf::from("/data"))), 2);
    }
}
