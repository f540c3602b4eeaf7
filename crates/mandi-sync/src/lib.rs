//! Mandi price job orchestration: fetch, parse, store, and trend stages.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use mandi_core::PriceRecord;
use mandi_reports::{open_report, ParseError, ParseStats};
use mandi_storage::{
    upsert_price_records, DownloadError, HttpClientConfig, HttpFetcher, MemoryPriceStore,
    PgPriceStore, PriceStore, ReportSource, StoreError, TimeoutPriceStore, UpsertSummary,
    BROWSER_USER_AGENT, DEFAULT_BATCH_SIZE, DEFAULT_MAX_REDIRECTS, DEFAULT_STORE_TIMEOUT,
    MAX_BATCH_SIZE,
};
use serde::Serialize;
use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod trends;

pub use trends::{calculate_trends, derive_trend, list_current_trends, DEFAULT_TREND_WINDOW};

pub const CRATE_NAME: &str = "mandi-sync";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: Option<String>,
    pub source: Option<ReportSource>,
    pub download_dir: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub max_redirects: usize,
    pub upsert_batch_size: usize,
    pub store_timeout_secs: u64,
    pub trend_window: usize,
    pub scheduler_enabled: bool,
    pub sync_cron: String,
    pub web_port: u16,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            source: None,
            download_dir: PathBuf::from("./downloads"),
            user_agent: BROWSER_USER_AGENT.to_string(),
            http_timeout_secs: 30,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            upsert_batch_size: DEFAULT_BATCH_SIZE,
            store_timeout_secs: DEFAULT_STORE_TIMEOUT.as_secs(),
            trend_window: DEFAULT_TREND_WINDOW,
            scheduler_enabled: false,
            sync_cron: "0 0 6 * * *".to_string(),
            web_port: 5000,
        }
    }
}

fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Zero falls back to the default; anything above the bind-parameter limit is capped.
fn batch_size_setting(raw: Option<usize>) -> usize {
    match raw {
        Some(0) | None => DEFAULT_BATCH_SIZE,
        Some(n) if n > MAX_BATCH_SIZE => {
            warn!(requested = n, max = MAX_BATCH_SIZE, "MANDI_UPSERT_BATCH_SIZE capped");
            MAX_BATCH_SIZE
        }
        Some(n) => n,
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            source: std::env::var("MANDI_SOURCE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .and_then(|v| v.parse().ok()),
            download_dir: std::env::var("MANDI_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            user_agent: std::env::var("MANDI_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: env_parsed("MANDI_HTTP_TIMEOUT_SECS")
                .unwrap_or(defaults.http_timeout_secs),
            max_redirects: env_parsed("MANDI_MAX_REDIRECTS").unwrap_or(defaults.max_redirects),
            upsert_batch_size: batch_size_setting(env_parsed("MANDI_UPSERT_BATCH_SIZE")),
            store_timeout_secs: env_parsed("MANDI_STORE_TIMEOUT_SECS")
                .filter(|n: &u64| *n > 0)
                .unwrap_or(defaults.store_timeout_secs),
            trend_window: env_parsed("MANDI_TREND_WINDOW")
                .filter(|n: &usize| *n >= 2)
                .unwrap_or(defaults.trend_window),
            scheduler_enabled: std::env::var("MANDI_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            sync_cron: std::env::var("MANDI_SYNC_CRON").unwrap_or(defaults.sync_cron),
            web_port: env_parsed("MANDI_WEB_PORT").unwrap_or(defaults.web_port),
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: self.user_agent.clone(),
            max_redirects: self.max_redirects,
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

/// Postgres when `DATABASE_URL` is set, otherwise an in-process store.
/// Every call into the returned store is bounded by `MANDI_STORE_TIMEOUT_SECS`.
pub async fn connect_store(config: &SyncConfig) -> Result<Arc<dyn PriceStore>> {
    let store: Arc<dyn PriceStore> = match &config.database_url {
        Some(url) => {
            let store = PgPriceStore::connect(url)
                .await
                .context("connecting to price database")?;
            store.migrate().await.context("running price migrations")?;
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set; prices are kept in memory for this process only");
            Arc::new(MemoryPriceStore::new())
        }
    };
    Ok(Arc::new(TimeoutPriceStore::new(store, config.store_timeout())))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Fetching,
    Parsing,
    Storing,
    Trending,
    Done,
    Failed,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("fetch stage failed: {0}")]
    Fetch(#[from] DownloadError),
    #[error("parse stage failed: {0}")]
    Parse(#[from] ParseError),
    #[error("trend stage failed: {0}")]
    Trend(#[source] StoreError),
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRunReport {
    pub run_id: Uuid,
    pub source: String,
    pub state: JobState,
    pub failed_stage: Option<JobState>,
    pub error: Option<String>,
    pub fetched_path: Option<String>,
    pub parse: ParseStats,
    pub upsert: UpsertSummary,
    pub trends_updated: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRunReport {
    fn new(run_id: Uuid, source: &ReportSource) -> Self {
        Self {
            run_id,
            source: source.to_string(),
            state: JobState::Idle,
            failed_stage: None,
            error: None,
            fetched_path: None,
            parse: ParseStats::default(),
            upsert: UpsertSummary::default(),
            trends_updated: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn transition(&mut self, next: JobState) {
        debug!(from = ?self.state, to = ?next, "job stage");
        self.state = next;
    }

    pub fn succeeded(&self) -> bool {
        self.state == JobState::Done
    }
}

/// Runs the ingestion pipeline against one report source.
///
/// Runs share nothing but the store; overlapping runs are safe because every
/// write is a keyed upsert.
pub struct MandiJob {
    config: SyncConfig,
    fetcher: HttpFetcher,
    store: Arc<dyn PriceStore>,
}

impl MandiJob {
    pub fn new(config: SyncConfig, store: Arc<dyn PriceStore>) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.http_client_config())?;
        Ok(Self {
            config,
            fetcher,
            store,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn PriceStore> {
        Arc::clone(&self.store)
    }

    pub fn default_source(&self) -> Option<&ReportSource> {
        self.config.source.as_ref()
    }

    /// Run every stage to completion. Failures are reported, never raised.
    pub async fn run_once(&self, source: &ReportSource) -> JobRunReport {
        self.run_with_id(Uuid::new_v4(), source).await
    }

    /// Start a run in the background and return its id immediately.
    pub fn trigger(self: &Arc<Self>, source: ReportSource) -> Uuid {
        let run_id = Uuid::new_v4();
        let job = Arc::clone(self);
        tokio::spawn(async move {
            job.run_with_id(run_id, &source).await;
        });
        run_id
    }

    async fn run_with_id(&self, run_id: Uuid, source: &ReportSource) -> JobRunReport {
        let span = info_span!("mandi_job", %run_id, source = %source);
        async {
            let mut report = JobRunReport::new(run_id, source);
            info!("mandi price job started");

            match self.execute(&mut report, source).await {
                Ok(()) => report.transition(JobState::Done),
                Err(err) => {
                    error!(stage = ?report.state, error = %err, "mandi price job failed");
                    report.failed_stage = Some(report.state);
                    report.error = Some(err.to_string());
                    report.transition(JobState::Failed);
                }
            }
            report.finished_at = Some(Utc::now());
            info!(
                state = ?report.state,
                records = report.parse.records_emitted,
                inserted = report.upsert.inserted,
                updated = report.upsert.updated,
                failed = report.upsert.failed,
                trends = report.trends_updated,
                "mandi price job finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, report: &mut JobRunReport, source: &ReportSource) -> Result<(), JobError> {
        report.transition(JobState::Fetching);
        let dest = self
            .config
            .download_dir
            .join(format!("mandi-{}.{}", report.run_id, source.extension_hint()));
        let fetched = self.fetcher.fetch_source(source, &dest).await?;
        report.fetched_path = Some(fetched.path.display().to_string());

        report.transition(JobState::Parsing);
        let parsed = parse_into(report, &fetched.path);
        fetched.discard().await;
        let records = parsed?;
        if records.is_empty() {
            warn!("report produced no records; skipping store and trend stages");
            return Ok(());
        }

        report.transition(JobState::Storing);
        report.upsert =
            upsert_price_records(self.store.as_ref(), records, self.config.upsert_batch_size).await;

        report.transition(JobState::Trending);
        report.trends_updated = calculate_trends(self.store.as_ref(), self.config.trend_window)
            .await
            .map_err(JobError::Trend)?;
        Ok(())
    }

    pub async fn maybe_build_scheduler(self: &Arc<Self>) -> Result<Option<JobScheduler>> {
        if !self.config.scheduler_enabled {
            return Ok(None);
        }
        let Some(source) = self.config.source.clone() else {
            warn!("scheduler enabled but MANDI_SOURCE is not set; no runs scheduled");
            return Ok(None);
        };

        let sched = JobScheduler::new().await.context("creating scheduler")?;
        let cron = self.config.sync_cron.clone();
        let job = Arc::clone(self);
        let scheduled = Job::new_async(cron.as_str(), move |_uuid, _l| {
            let job = Arc::clone(&job);
            let source = source.clone();
            Box::pin(async move {
                job.run_once(&source).await;
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(scheduled).await.context("adding scheduler job")?;
        info!(%cron, "mandi price job scheduled");
        Ok(Some(sched))
    }
}

/// Read every record from `path`, leaving the parse counts on `report` even when
/// the stream fails part-way.
fn parse_into(report: &mut JobRunReport, path: &Path) -> Result<Vec<PriceRecord>, JobError> {
    let mut reader = open_report(path)?;
    let records: Vec<PriceRecord> = reader.by_ref().collect();
    report.parse = reader.stats();
    if let Some(err) = reader.take_read_error() {
        return Err(err.into());
    }
    info!(
        format = ?reader.format(),
        layout = ?reader.layout(),
        rows = report.parse.rows_read,
        records = records.len(),
        dropped = report.parse.records_dropped,
        coerced = report.parse.values_coerced,
        "report parsed"
    );
    Ok(records)
}

/// One run against the configured source, for the CLI and cron hosts.
pub async fn run_sync_once_from_env(source: Option<ReportSource>) -> Result<JobRunReport> {
    let config = SyncConfig::from_env();
    let source = source
        .or_else(|| config.source.clone())
        .context("no report source given and MANDI_SOURCE is not set")?;
    let store = connect_store(&config).await?;
    let job = MandiJob::new(config, store)?;
    Ok(job.run_once(&source).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SyncConfig::default();
        assert_eq!(config.http_timeout_secs, 30);
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.upsert_batch_size, 500);
        assert_eq!(config.trend_window, 20);
        assert_eq!(config.web_port, 5000);
        assert!(!config.scheduler_enabled);
        assert_eq!(config.http_client_config().timeout, Duration::from_secs(30));
        assert_eq!(config.store_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn batch_size_setting_stays_within_the_bind_limit() {
        assert_eq!(batch_size_setting(None), DEFAULT_BATCH_SIZE);
        assert_eq!(batch_size_setting(Some(0)), DEFAULT_BATCH_SIZE);
        assert_eq!(batch_size_setting(Some(1000)), 1000);
        assert_eq!(batch_size_setting(Some(20_000)), MAX_BATCH_SIZE);
    }

    #[test]
    fn job_state_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&JobState::Trending).unwrap(), "\"trending\"");
    }

    #[tokio::test]
    async fn disabled_scheduler_builds_nothing() {
        let job = Arc::new(MandiJob::new(SyncConfig::default(), Arc::new(MemoryPriceStore::new())).unwrap());
        assert!(job.maybe_build_scheduler().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scheduler_without_source_builds_nothing() {
        let config = SyncConfig {
            scheduler_enabled: true,
            ..SyncConfig::default()
        };
        let job = Arc::new(MandiJob::new(config, Arc::new(MemoryPriceStore::new())).unwrap());
        assert!(job.maybe_build_scheduler().await.unwrap().is_none());
    }
}
