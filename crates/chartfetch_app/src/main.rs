mod app;
mod profile;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use chartfetch_core::{AuthMode, TaskStatus};
use chartfetch_logging::{cf_error, LogDestination, DEFAULT_LOG_FILE};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;

use app::{SelectionRequest, WorkerCommand};
use profile::{RunProfile, DEFAULT_PROFILE};

#[derive(Debug, Parser)]
#[command(name = "chartfetch", about = "Batch chart downloads through a task worker")]
struct Cli {
    /// Worker executable that speaks the JSON-line task protocol.
    #[arg(long, global = true, env = "CHARTFETCH_WORKER", default_value = "chartfetch-worker")]
    worker: String,

    /// Extra argument passed to the worker. Repeatable.
    #[arg(long = "worker-arg", global = true)]
    worker_args: Vec<String>,

    #[arg(long, global = true, default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Also log to the terminal, at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the manifest catalog.
    Catalog {
        /// Rebuild the catalog from a manifest directory first.
        #[arg(long, value_name = "DIR")]
        refresh: Option<String>,
    },
    /// Download the selected manifests.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, default_value = DEFAULT_PROFILE)]
    profile: PathBuf,

    /// Manifest path to select. Repeatable.
    #[arg(long = "select", value_name = "PATH")]
    select: Vec<String>,

    /// Select the whole catalog.
    #[arg(long)]
    all: bool,

    #[arg(long, value_name = "DIR")]
    refresh: Option<String>,

    #[arg(long, value_name = "DIR")]
    output_dir: Option<String>,

    #[arg(long, value_enum)]
    auth_mode: Option<AuthArg>,

    /// Key or captcha, depending on the auth mode.
    #[arg(long)]
    secret: Option<String>,

    /// Write the effective profile back to `--profile`.
    #[arg(long)]
    save_profile: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AuthArg {
    Key,
    Captcha,
}

impl From<AuthArg> for AuthMode {
    fn from(value: AuthArg) -> Self {
        match value {
            AuthArg::Key => AuthMode::Key,
            AuthArg::Captcha => AuthMode::Captcha,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let destination = if cli.verbose {
        LogDestination::Both(cli.log_file.clone())
    } else {
        LogDestination::File(cli.log_file.clone())
    };
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    chartfetch_logging::initialize(destination, level);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            cf_error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let worker = WorkerCommand {
        program: cli.worker,
        args: cli.worker_args,
    };
    let handle = app::start(&worker)?;

    match cli.command {
        Command::Catalog { refresh } => {
            app::load_catalog(&handle, refresh.as_deref()).await?;
            app::print_catalog(&handle.view());
            Ok(ExitCode::SUCCESS)
        }
        Command::Run(args) => {
            let profile = effective_profile(&args)?;
            if args.save_profile {
                profile.save(&args.profile)?;
            }

            app::load_catalog(&handle, args.refresh.as_deref()).await?;
            let selection = SelectionRequest {
                all: args.all,
                paths: args.select,
            };
            app::apply_selection(&handle, &selection).await?;

            let status = app::run_task(&handle, profile.to_options()).await?;
            Ok(match status {
                TaskStatus::Completed => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            })
        }
    }
}

/// The profile file, if any, with command-line overrides applied.
fn effective_profile(args: &RunArgs) -> Result<RunProfile> {
    let mut profile = if args.profile.exists() {
        RunProfile::load(&args.profile)?
    } else {
        RunProfile::default()
    };
    if let Some(dir) = &args.output_dir {
        profile.output_dir = dir.clone();
    }
    if let Some(mode) = args.auth_mode {
        profile.auth_mode = mode.into();
    }
    if let Some(secret) = &args.secret {
        match profile.auth_mode {
            AuthMode::Key => profile.key = secret.clone(),
            AuthMode::Captcha => profile.captcha = secret.clone(),
        }
    }
    Ok(profile)
}
