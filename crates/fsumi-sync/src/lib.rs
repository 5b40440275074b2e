//! Scraper orchestration: configuration, merge engine, run pipeline, scheduler and run logger.

pub mod config;
pub mod logging;
pub mod merge;
pub mod pipeline;
pub mod scheduler;

pub use config::{missing_vars, ConfigError, ScraperConfig, REQUIRED_VARS};
pub use logging::{init_logging, LogGuard, RunLineFormat};
pub use merge::{merge, MergeResult};
pub use pipeline::NewsPipeline;
pub use scheduler::{
    exit_code, run_guarded, run_once_mode, run_scheduled, shutdown_signal, RunMode, ScrapeJob,
};

pub const CRATE_NAME: &str = "fsumi-sync";
