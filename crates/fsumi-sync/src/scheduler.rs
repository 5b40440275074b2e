use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use fsumi_core::{RunOutcome, RunSummary};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::pipeline::NewsPipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Once,
    Scheduled,
}

/// Anything the scheduler can run repeatedly.
#[async_trait]
pub trait ScrapeJob: Send + Sync + 'static {
    async fn run(&self) -> Result<RunSummary>;
}

#[async_trait]
impl ScrapeJob for NewsPipeline {
    async fn run(&self) -> Result<RunSummary> {
        self.run_once().await
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs the job on its own task; an error or panic becomes a failed outcome.
/// Dropping the returned future abandons the run.
pub async fn run_guarded<J: ScrapeJob>(job: Arc<J>) -> RunOutcome {
    let mut task = AbortOnDrop(tokio::spawn(async move { job.run().await }));
    match (&mut task.0).await {
        Ok(Ok(summary)) => RunOutcome::from(&summary),
        Ok(Err(err)) => {
            error!("error in scraping process: {err:#}");
            RunOutcome::failed(format!("{err:#}"))
        }
        Err(join) => {
            let reason = if join.is_panic() {
                "scraping run panicked"
            } else {
                "scraping run was cancelled"
            };
            error!("error in scraping process: {reason}");
            RunOutcome::failed(reason)
        }
    }
}

pub async fn run_once_mode<J: ScrapeJob>(job: Arc<J>) -> RunOutcome {
    info!("running news scraper once");
    let outcome = run_guarded(job).await;
    if outcome.success {
        info!(
            "scraping completed successfully! total: {}, new: {}",
            outcome.total, outcome.new
        );
    } else {
        error!(
            "scraping failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    outcome
}

/// Process exit status for a single run.
pub fn exit_code(outcome: &RunOutcome) -> u8 {
    if outcome.success {
        0
    } else {
        1
    }
}

/// Runs immediately, then again `interval` after each run finishes, until
/// `shutdown` resolves. Returns the number of runs that completed.
pub async fn run_scheduled<J, S>(job: Arc<J>, interval: Duration, shutdown: S) -> usize
where
    J: ScrapeJob,
    S: Future<Output = ()> + Send,
{
    info!(
        "starting scheduled scraper (every {} minutes)",
        interval.as_secs() / 60
    );
    tokio::pin!(shutdown);

    let mut completed = 0usize;
    loop {
        if completed > 0 {
            info!("scheduled run starting");
        }
        tokio::select! {
            _ = &mut shutdown => break,
            outcome = run_guarded(job.clone()) => {
                completed += 1;
                if outcome.success {
                    info!(
                        "scheduled run finished: total {}, new {}, spreadsheet updated {}",
                        outcome.total, outcome.new, outcome.store_updated
                    );
                }
            }
        }

        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!("received shutdown signal, shutting down gracefully");
    completed
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn summary(total: usize, new: usize) -> RunSummary {
        let now = Utc::now();
        RunSummary {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            known: total - new,
            fetched: new,
            failed_pages: 0,
            total,
            new,
            store_updated: true,
            backup_written: true,
        }
    }

    #[derive(Default)]
    struct Scripted {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ScrapeJob for Scripted {
        async fn run(&self) -> Result<RunSummary> {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => anyhow::bail!("sheet unreachable"),
                1 => panic!("boom"),
                n => Ok(summary(10 + n, 1)),
            }
        }
    }

    #[tokio::test]
    async fn guarded_run_maps_error_and_panic_to_failed_outcomes() {
        let job = Arc::new(Scripted::default());

        let first = run_guarded(job.clone()).await;
        assert!(!first.success);
        assert_eq!(first.error.as_deref(), Some("sheet unreachable"));
        assert_eq!(exit_code(&first), 1);

        let second = run_guarded(job.clone()).await;
        assert!(!second.success);
        assert_eq!(second.error.as_deref(), Some("scraping run panicked"));

        let third = run_once_mode(job).await;
        assert!(third.success);
        assert_eq!((third.total, third.new), (12, 1));
        assert_eq!(exit_code(&third), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_mode_keeps_running_after_failures() {
        let job = Arc::new(Scripted::default());
        let interval = Duration::from_secs(30 * 60);

        let completed = run_scheduled(
            job.clone(),
            interval,
            tokio::time::sleep(Duration::from_secs(95 * 60)),
        )
        .await;

        // t = 0, 30, 60 and 90 minutes
        assert_eq!(completed, 4);
        assert_eq!(job.calls.load(Ordering::SeqCst), 4);
    }

    struct Slow;

    #[async_trait]
    impl ScrapeJob for Slow {
        async fn run(&self) -> Result<RunSummary> {
            tokio::time::sleep(Duration::from_secs(20 * 60)).await;
            Ok(summary(1, 1))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_measured_from_the_end_of_a_run() {
        let start = tokio::time::Instant::now();
        let completed = run_scheduled(
            Arc::new(Slow),
            Duration::from_secs(30 * 60),
            tokio::time::sleep(Duration::from_secs(75 * 60)),
        )
        .await;

        // runs end at 20 and 70 minutes; the third would start at 100
        assert_eq!(completed, 2);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(75 * 60));
        assert!(elapsed < Duration::from_secs(76 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_a_run_abandons_it() {
        let completed = run_scheduled(
            Arc::new(Slow),
            Duration::from_secs(30 * 60),
            tokio::time::sleep(Duration::from_secs(5 * 60)),
        )
        .await;
        assert_eq!(completed, 0);
    }
}
