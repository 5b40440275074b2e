use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use fsumi_adapters::{fetch_listing_pages, FsUmiNewsAdapter, ListingAdapter};
use fsumi_core::{NewsRecord, RunSummary};
use fsumi_storage::{
    GoogleSheetsClient, HttpClientConfig, HttpFetcher, LocalBackup, RecordOrigin, RecordStore,
    TabularStore,
};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ScraperConfig;
use crate::merge::{merge, MergeResult};

/// One scraping run: load known records, fetch listing pages, merge, save.
pub struct NewsPipeline {
    config: Arc<ScraperConfig>,
    http: HttpFetcher,
    adapter: Box<dyn ListingAdapter>,
    store: RecordStore,
}

impl NewsPipeline {
    pub fn new(config: Arc<ScraperConfig>) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: config.http_timeout,
            user_agent: Some(config.user_agent.clone()),
        })?;
        let sheets = GoogleSheetsClient::new(
            http.client().clone(),
            config.service_account_key(),
            config.spreadsheet_id.clone(),
            config.google.clone(),
        );
        let adapter = FsUmiNewsAdapter::new(config.listing_url.clone(), &config.site_origin)
            .context("building listing adapter")?;
        Ok(Self::with_parts(config, http, Box::new(adapter), Arc::new(sheets)))
    }

    pub fn with_parts(
        config: Arc<ScraperConfig>,
        http: HttpFetcher,
        adapter: Box<dyn ListingAdapter>,
        remote: Arc<dyn TabularStore>,
    ) -> Self {
        let store = RecordStore::new(
            remote,
            LocalBackup::new(config.backup_path()),
            config.default_sheet_name.clone(),
        );
        Self {
            config,
            http,
            adapter,
            store,
        }
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("scrape_run", %run_id, source = self.adapter.source_id());
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<RunSummary> {
        let started_at = Utc::now();
        info!("starting news scraping process");

        let loaded = self.store.load().await;
        if loaded.origin == RecordOrigin::LocalBackup {
            info!("known records come from the local backup");
        }
        let known = loaded.records.len();
        info!("loaded {known} existing news items");

        let pages = fetch_listing_pages(
            &self.http,
            self.adapter.as_ref(),
            self.config.pages,
            self.config.request_delay,
        )
        .await;
        let failed_pages = pages.iter().filter(|p| p.result.is_err()).count();
        let fetched: Vec<NewsRecord> = pages
            .into_iter()
            .filter_map(|p| p.result.ok())
            .flatten()
            .collect();
        let fetched_count = fetched.len();
        info!(
            "fetched {fetched_count} news items from {} pages",
            self.config.pages
        );

        let MergeResult { merged, new_count } = merge(loaded.records, fetched);
        info!("found {new_count} new news items");

        let report = self.store.save(&merged).await;
        if report.remote_updated() {
            info!(
                "successfully updated {} news items ({new_count} new)",
                merged.len()
            );
        } else {
            warn!("updated local file only; spreadsheet update failed");
        }

        Ok(RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            known,
            fetched: fetched_count,
            failed_pages,
            total: merged.len(),
            new: new_count,
            store_updated: report.remote_updated(),
            backup_written: report.backup_written(),
        })
    }
}
