use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use long_trips::app::App;
use long_trips::config::{ConfigLoader, ConfigOverrides};
use long_trips::error::{ErrorKind, TripError};
use long_trips::fetch::{HttpDownloader, ThreadPacer};
use long_trips::output::{ConsoleOutput, JsonOutput, OutputMode};

#[derive(Parser)]
#[command(name = "long-trips")]
#[command(about = "Download taxi trip Parquet files and keep the trips above the 90th distance percentile")]
#[command(version, author)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Clone)]
struct GlobalArgs {
    /// JSON config file (defaults to ./long-trips.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// File with one URL per line
    #[arg(long, global = true)]
    sources: Option<String>,

    #[arg(long, global = true)]
    data_dir: Option<String>,

    #[arg(long, global = true)]
    results_dir: Option<String>,

    /// Numeric column the threshold is computed over
    #[arg(long, global = true)]
    column: Option<String>,

    #[arg(long, global = true)]
    quantile: Option<f64>,

    /// Pause after each download, in seconds
    #[arg(long, global = true)]
    wait_secs: Option<f64>,

    /// Retries per download on transient failures (0 aborts on first failure)
    #[arg(long, global = true)]
    retries: Option<usize>,

    /// Print a JSON report instead of status messages
    #[arg(long, global = true)]
    json: bool,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    #[command(about = "Download, compute the threshold and write results (default)")]
    Run,
    #[command(about = "Download every URL of the source list into the data folder")]
    Fetch,
    #[command(about = "Compute the threshold over downloaded files and write results")]
    Process,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<TripError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &TripError) -> u8 {
    match error.kind() {
        ErrorKind::Configuration => 2,
        ErrorKind::Retrieval => 3,
        ErrorKind::Data => 4,
        ErrorKind::Write => 5,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let GlobalArgs {
        config,
        sources,
        data_dir,
        results_dir,
        column,
        quantile,
        wait_secs,
        retries,
        json,
        verbose,
    } = cli.global;

    let overrides = ConfigOverrides {
        source_list: sources,
        data_dir,
        results_dir,
        column,
        quantile,
        wait_secs,
        retries,
    };
    let resolved = ConfigLoader::resolve(config.as_deref(), overrides)?;
    let output_mode = if json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let downloader = HttpDownloader::new(resolved.retries)?;
    let app = App::new(resolved, downloader, ThreadPacer);
    let command = cli.command.unwrap_or(Commands::Run);

    match output_mode {
        OutputMode::Json => match command {
            Commands::Run => JsonOutput::print_run(&app.run(&JsonOutput)?).into_diagnostic(),
            Commands::Fetch => JsonOutput::print_fetch(&app.fetch(&JsonOutput)?).into_diagnostic(),
            Commands::Process => {
                JsonOutput::print_process(&app.process(&JsonOutput)?).into_diagnostic()
            }
        },
        OutputMode::Human => {
            let console = ConsoleOutput::new(verbose);
            let workspace = app.workspace().clone();
            if matches!(command, Commands::Run | Commands::Fetch) {
                app.fetch(&console)?;
                console.print_fetch(workspace.data_dir());
            }
            if matches!(command, Commands::Run | Commands::Process) {
                let result = app.process(&console)?;
                console.print_process(workspace.results_dir(), &result);
            }
            Ok(())
        }
    }
}
