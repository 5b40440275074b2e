mod check_config;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use fsumi_sync::config::{DEFAULT_DATA_DIR, DEFAULT_LOG_FILE};
use fsumi_sync::{
    exit_code, init_logging, missing_vars, run_once_mode, run_scheduled, shutdown_signal,
    ConfigError, NewsPipeline, RunMode, ScrapeJob, ScraperConfig, REQUIRED_VARS,
};
use fsumi_web::{AppState, GatewayConfig};
use tokio::sync::watch;
use tracing::{error, info, warn};

const FAILURE: u8 = 1;

#[derive(Debug, Parser)]
#[command(name = "fsumi")]
#[command(about = "FS-UMI news scraper and CSC API gateway")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Run the scraper a single time and exit.
    #[arg(short = 'o', long, conflicts_with = "schedule")]
    once: bool,
    /// Run immediately, then every SCRAPER_INTERVAL minutes.
    #[arg(short = 's', long)]
    schedule: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the API gateway, plus the scheduled scraper when its credentials are set.
    Serve,
    /// Print configuration diagnostics.
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Some(Commands::CheckConfig) = cli.command {
        return check_config();
    }

    let _log_guard = match init_logging(Path::new(DEFAULT_DATA_DIR), DEFAULT_LOG_FILE) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("logging unavailable: {err:#}");
            None
        }
    };

    match cli.command {
        Some(Commands::Serve) => serve().await,
        _ => {
            let mode = run_mode(&cli);
            ExitCode::from(scrape(ScraperConfig::from_env(), mode, NewsPipeline::new).await)
        }
    }
}

fn run_mode(cli: &Cli) -> RunMode {
    if cli.schedule {
        RunMode::Scheduled
    } else {
        if !cli.once {
            info!("use --schedule or -s for continuous running, --once or -o for single run");
        }
        RunMode::Once
    }
}

fn load_scraper_config(config: Result<ScraperConfig, ConfigError>) -> Option<Arc<ScraperConfig>> {
    match config {
        Ok(config) => Some(Arc::new(config)),
        Err(ConfigError::MissingVars(vars)) => {
            error!("missing required environment variables: {}", vars.join(", "));
            info!("please set the following environment variables:");
            for var in vars {
                info!("  - {var}");
            }
            None
        }
    }
}

/// Process exit status for the scraper run modes.
async fn scrape<J, B>(config: Result<ScraperConfig, ConfigError>, mode: RunMode, build: B) -> u8
where
    J: ScrapeJob,
    B: FnOnce(Arc<ScraperConfig>) -> anyhow::Result<J>,
{
    let Some(config) = load_scraper_config(config) else {
        return FAILURE;
    };
    let pipeline = match build(config.clone()) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(err) => {
            error!("{err:#}");
            return FAILURE;
        }
    };

    match mode {
        RunMode::Once => {
            tokio::select! {
                outcome = run_once_mode(pipeline) => exit_code(&outcome),
                _ = shutdown_signal() => {
                    info!("shutting down gracefully");
                    0
                }
            }
        }
        RunMode::Scheduled => {
            run_scheduled(pipeline, config.interval, shutdown_signal()).await;
            0
        }
    }
}

async fn wait_for_stop(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

async fn serve() -> ExitCode {
    let gateway = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    let scraper = if missing_vars(|key| std::env::var(key).ok()).is_empty() {
        let config = load_scraper_config(ScraperConfig::from_env());
        config.and_then(|config| match NewsPipeline::new(config.clone()) {
            Ok(pipeline) => {
                info!("starting news scraper (scheduled mode)");
                let stop = wait_for_stop(stop_rx.clone());
                Some(tokio::spawn(run_scheduled(
                    Arc::new(pipeline),
                    config.interval,
                    stop,
                )))
            }
            Err(err) => {
                error!("news scraper unavailable: {err:#}");
                None
            }
        })
    } else {
        warn!("news scraper credentials not fully configured; scraper will not run");
        info!("required: {}", REQUIRED_VARS.join(", "));
        None
    };

    let state = AppState::from_config(gateway);
    let served = fsumi_web::serve(state, wait_for_stop(stop_rx)).await;

    if let Some(handle) = scraper {
        if let Err(err) = handle.await {
            error!("scheduled scraper task failed: {err}");
        }
    }

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn check_config() -> ExitCode {
    match GatewayConfig::from_env() {
        Ok(config) => {
            let missing = missing_vars(|key| std::env::var(key).ok());
            print!("{}", check_config::render(&config, &missing));
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("[ERROR] {err}");
            ExitCode::FAILURE
        }
    }
}
