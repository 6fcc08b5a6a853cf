use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use criteo_ingest::app::{Pipeline, RunOptions, RunReport};
use criteo_ingest::archive::{Extractor, FormatRegistry};
use criteo_ingest::config::{ConfigLoader, ParquetCompression, PipelineConfig};
use criteo_ingest::convert::ParquetConverter;
use criteo_ingest::domain::{DestinationUrl, Source};
use criteo_ingest::error::IngestError;
use criteo_ingest::fetch::HttpFetcher;
use criteo_ingest::loader::TsvLoader;
use criteo_ingest::output::{JsonOutput, OutputMode, render_summary};
use criteo_ingest::progress::{LogProgress, ProgressSink, TerminalProgress};
use criteo_ingest::storage::{LocalObjectStore, ObjectStore, S3ObjectStore};
use criteo_ingest::tokens;
use criteo_ingest::upload::ObjectStoreUploader;
use criteo_ingest::workspace::Workspace;

#[derive(Parser)]
#[command(name = "criteo-ingest")]
#[command(about = "Convert Criteo TSV archives to partitioned Parquet and upload them to object storage")]
#[command(version)]
struct Cli {
    #[arg(long, global = true, help = "Print machine-readable JSON instead of a summary")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch, convert and upload datasets")]
    Ingest(IngestArgs),
    #[command(about = "Collect distinct sparse-column tokens across TSV files")]
    Tokens(TokensArgs),
}

#[derive(Args)]
struct IngestArgs {
    #[arg(required = true, help = "Archive urls, local archives, raw TSV files or staging directories")]
    sources: Vec<String>,

    #[arg(long, help = "Destination such as s3://bucket/prefix/ or file://bucket/prefix/")]
    dest: String,

    #[arg(long)]
    work_dir: Option<String>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    max_rows_per_file: Option<usize>,

    #[arg(long)]
    compression: Option<ParquetCompression>,

    #[arg(long, help = "Delete extracted TSV files once converted")]
    delete_raw: bool,

    #[arg(long, help = "Delete partition files once uploaded")]
    delete_uploaded: bool,

    #[arg(long)]
    no_progress: bool,
}

#[derive(Args)]
struct TokensArgs {
    #[arg(long, default_value = "./*.tsv")]
    inglob: String,

    #[arg(long, help = "Worker threads; defaults to the number of CPUs")]
    nprocs: Option<usize>,

    outfile: PathBuf,
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<IngestError>() {
                return ExitCode::from(map_exit_code(err));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &IngestError) -> u8 {
    match error {
        IngestError::InvalidSource(_)
        | IngestError::InvalidDestination(_)
        | IngestError::SchemeMismatch { .. }
        | IngestError::ConfigRead(_)
        | IngestError::ConfigParse(_) => 2,
        IngestError::Http(_) | IngestError::HttpStatus { .. } | IngestError::Storage(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<bool> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    match cli.command {
        Commands::Ingest(args) => run_ingest(args, output_mode),
        Commands::Tokens(args) => run_tokens(args, output_mode),
    }
}

fn run_ingest(args: IngestArgs, output_mode: OutputMode) -> miette::Result<bool> {
    let mut config = ConfigLoader::resolve(args.config.as_deref())?;
    if let Some(dir) = &args.work_dir {
        config.work_dir = Utf8PathBuf::from(dir);
    }
    if args.max_rows_per_file.is_some() {
        config.max_rows_per_file = args.max_rows_per_file.filter(|rows| *rows > 0);
    }
    if let Some(compression) = args.compression {
        config.compression = compression;
    }
    config.delete_raw_after_convert |= args.delete_raw;
    config.delete_partitions_after_upload |= args.delete_uploaded;

    let sources = args
        .sources
        .iter()
        .map(|value| value.parse::<Source>())
        .collect::<Result<Vec<_>, IngestError>>()?;

    let destination: DestinationUrl = args.dest.parse()?;
    let sink: Box<dyn ProgressSink> = if args.no_progress || !std::io::stderr().is_terminal() {
        Box::new(LogProgress::default())
    } else {
        Box::new(TerminalProgress::default())
    };

    let report = match destination.scheme() {
        "s3" => {
            let store = S3ObjectStore::new(&config.s3)?;
            run_pipeline(store, &args.dest, &config, &sources, sink.as_ref())?
        }
        "file" => {
            let root = config
                .local_store_root
                .clone()
                .unwrap_or_else(|| config.work_dir.join("store"));
            run_pipeline(
                LocalObjectStore::new(root),
                &args.dest,
                &config,
                &sources,
                sink.as_ref(),
            )?
        }
        other => {
            return Err(IngestError::SchemeMismatch {
                expected: "s3 or file".to_string(),
                found: other.to_string(),
            }
            .into());
        }
    };

    match output_mode {
        OutputMode::Json => JsonOutput::print_report(&report).into_diagnostic()?,
        OutputMode::Human => print!("{}", render_summary(&report)),
    }
    Ok(report.is_success())
}

fn run_pipeline<S: ObjectStore>(
    store: S,
    destination: &str,
    config: &PipelineConfig,
    sources: &[Source],
    sink: &dyn ProgressSink,
) -> Result<RunReport, IngestError> {
    let uploader = ObjectStoreUploader::new(store, destination)?
        .delete_after_upload(config.delete_partitions_after_upload);

    let workspace = Workspace::new(config.work_dir.clone());
    workspace.ensure()?;
    let extractor =
        Extractor::new(FormatRegistry::standard()).with_staging_root(workspace.staging_dir());
    let converter =
        ParquetConverter::new(config.compression, config.max_rows_per_file, config.batch_size);

    let pipeline = Pipeline::new(
        workspace,
        extractor,
        HttpFetcher::new()?,
        TsvLoader::new(),
        converter,
        uploader,
        RunOptions {
            delete_raw_after_convert: config.delete_raw_after_convert,
        },
    );
    Ok(pipeline.run(sources, sink))
}

fn run_tokens(args: TokensArgs, output_mode: OutputMode) -> miette::Result<bool> {
    tokens::check_output(&args.outfile)?;
    let inputs = tokens::resolve_inputs(&args.inglob)?;
    let workers = args.nprocs.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });

    tracing::info!(files = inputs.len(), workers, "collecting distinct tokens");
    let merged = tokens::distinct_tokens(&inputs, workers)?;
    tokens::write_tokens(&args.outfile, &merged)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_json(&serde_json::json!({
            "files": inputs.len(),
            "tokens": merged.total(),
            "outfile": args.outfile.display().to_string(),
        }))
        .into_diagnostic()?,
        OutputMode::Human => println!(
            "wrote {} distinct tokens from {} files to {}",
            merged.total(),
            inputs.len(),
            args.outfile.display()
        ),
    }
    Ok(true)
}
