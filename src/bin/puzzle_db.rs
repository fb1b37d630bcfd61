use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use lichess_puzzle_db::app::{self, AcquireOptions, App};
use lichess_puzzle_db::config::{ConfigLoader, ConfigOverrides, ResolvedConfig};
use lichess_puzzle_db::domain::{Codec, SubsetSize};
use lichess_puzzle_db::error::PuzzleDbError;
use lichess_puzzle_db::fetch::{ArchiveSource, HttpArchiveSource};
use lichess_puzzle_db::output::{self, JsonOutput, OutputMode, StatusLines};

#[derive(Parser)]
#[command(name = "puzzle-db")]
#[command(about = "Download the lichess puzzle database and cut small CSV subsets from it")]
#[command(version, author)]
struct Cli {
    /// Path to a JSON config file (default: ./puzzle-db.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Directory holding every artifact
    #[arg(long, global = true)]
    dir: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download, decompress and subset the puzzle database (default)")]
    Fetch(FetchArgs),
    #[command(about = "Print the path of the dataset or of one subset")]
    Locate(LocateArgs),
}

#[derive(Args, Clone, Default)]
struct FetchArgs {
    /// Archive URL
    #[arg(long)]
    url: Option<String>,

    /// Subset line counts, repeatable or comma separated
    #[arg(long = "subset", value_delimiter = ',')]
    subsets: Vec<SubsetSize>,

    #[arg(long)]
    codec: Option<Codec>,

    /// Total request timeout in seconds (unset: no limit)
    #[arg(long)]
    timeout: Option<u64>,

    #[arg(long)]
    retries: Option<usize>,

    /// Rebuild every artifact even if it is already complete
    #[arg(long)]
    force: bool,

    /// Print the result as JSON instead of status lines
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct LocateArgs {
    /// Subset size; omit for the full dataset
    #[arg(short, long)]
    num: Option<SubsetSize>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<PuzzleDbError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PuzzleDbError) -> u8 {
    match error {
        PuzzleDbError::DatasetNotFound { .. } => 2,
        err if err.is_network() => 3,
        PuzzleDbError::Decompression(_) => 4,
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
    match cli.command {
        Some(Commands::Fetch(args)) => run_fetch(cli.config, cli.dir, args),
        Some(Commands::Locate(args)) => run_locate(cli.config, cli.dir, args),
        None => run_fetch(cli.config, cli.dir, FetchArgs::default()),
    }
}

fn run_fetch(config: Option<String>, dir: Option<String>, args: FetchArgs) -> miette::Result<()> {
    let FetchArgs {
        url,
        subsets,
        codec,
        timeout,
        retries,
        force,
        json,
    } = args;

    let overrides = ConfigOverrides {
        working_dir: dir,
        remote_url: url,
        subset_sizes: subsets,
        codec,
        timeout_secs: timeout,
        retries,
    };
    let resolved = ConfigLoader::resolve(config.as_deref(), overrides)?;
    let source = HttpArchiveSource::new(&resolved.http)?;
    let app = App::new(source);
    let options = AcquireOptions { force };

    let output_mode = if json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    run_acquire(&app, &resolved, options, output_mode)
}

fn run_acquire<S: ArchiveSource>(
    app: &App<S>,
    resolved: &ResolvedConfig,
    options: AcquireOptions,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::Json => {
            let result = app.acquire(resolved, options, &JsonOutput)?;
            JsonOutput::print_acquire(&result).into_diagnostic()?;
        }
        OutputMode::Human => {
            let result = app.acquire(resolved, options, &StatusLines)?;
            output::print_acquire_summary(&result);
        }
    }
    Ok(())
}

fn run_locate(config: Option<String>, dir: Option<String>, args: LocateArgs) -> miette::Result<()> {
    let overrides = ConfigOverrides {
        working_dir: dir,
        ..ConfigOverrides::default()
    };
    let resolved = ConfigLoader::resolve(config.as_deref(), overrides)?;
    let path = app::locate(&resolved, args.num)?;
    println!("{path}");
    Ok(())
}
