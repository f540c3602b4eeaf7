//! Report download utilities and the durable price store.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, LOCATION};
use reqwest::{StatusCode, Url};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod prices;

pub use prices::{
    upsert_price_records, BatchOutcome, MemoryPriceStore, PgPriceStore, PriceStore, StoreError,
    TimeoutPriceStore, UpsertSummary, DEFAULT_BATCH_SIZE, DEFAULT_STORE_TIMEOUT, MAX_BATCH_SIZE,
};

pub const CRATE_NAME: &str = "mandi-storage";

/// The upstream portal rejects requests that do not look like a desktop browser.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
pub const TABULAR_ACCEPT: &str =
    "text/csv,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Where a run reads its report from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportSource {
    Url(String),
    Path(PathBuf),
}

impl ReportSource {
    /// File extension hint used to name the downloaded copy.
    pub fn extension_hint(&self) -> &'static str {
        let lowered = match self {
            ReportSource::Url(url) => url
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_ascii_lowercase(),
            ReportSource::Path(path) => path.display().to_string().to_ascii_lowercase(),
        };
        if lowered.ends_with(".xlsx") {
            "xlsx"
        } else if lowered.ends_with(".xls") {
            "xls"
        } else {
            "csv"
        }
    }
}

impl FromStr for ReportSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lowered = trimmed.to_ascii_lowercase();
        if lowered.starts_with("http://") || lowered.starts_with("https://") {
            Ok(ReportSource::Url(trimmed.to_string()))
        } else {
            Ok(ReportSource::Path(PathBuf::from(trimmed)))
        }
    }
}

impl std::fmt::Display for ReportSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportSource::Url(url) => f.write_str(url),
            ReportSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub max_redirects: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: BROWSER_USER_AGENT.to_string(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download failed with status {status} for {url}; this source may require a manual browser export")]
    HttpStatus { status: u16, url: String },
    #[error("stopped after {limit} redirects while fetching {url}")]
    TooManyRedirects { limit: usize, url: String },
    #[error("invalid url `{url}`: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("writing download to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A report that is available on local disk.
#[derive(Debug, Clone)]
pub struct FetchedReport {
    pub path: PathBuf,
    pub final_url: Option<String>,
    pub byte_size: Option<usize>,
    pub content_hash: Option<String>,
    pub redirects: usize,
}

impl FetchedReport {
    fn local(path: PathBuf) -> Self {
        Self {
            path,
            final_url: None,
            byte_size: None,
            content_hash: None,
            redirects: 0,
        }
    }

    pub fn is_download(&self) -> bool {
        self.final_url.is_some()
    }

    /// Remove a downloaded copy once it has been read. Local sources are left alone.
    pub async fn discard(&self) {
        if !self.is_download() {
            return;
        }
        match fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "removed downloaded report"),
            Err(err) => warn!(path = %self.path.display(), error = %err, "could not remove downloaded report"),
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_redirects: usize,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(TABULAR_ACCEPT));

        // Redirects are followed by hand so the hop count stays bounded and observable.
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("building reqwest client")?;

        Ok(Self {
            client,
            max_redirects: config.max_redirects,
        })
    }

    /// Resolve a source to a local file, downloading it to `dest` when it is remote.
    pub async fn fetch_source(
        &self,
        source: &ReportSource,
        dest: &Path,
    ) -> Result<FetchedReport, DownloadError> {
        match source {
            ReportSource::Path(path) => {
                debug!(path = %path.display(), "using local report, skipping download");
                Ok(FetchedReport::local(path.clone()))
            }
            ReportSource::Url(url) => self.download_to(url, dest).await,
        }
    }

    pub async fn download_to(&self, url: &str, dest: &Path) -> Result<FetchedReport, DownloadError> {
        let span = info_span!("http_fetch", url);
        self.download_inner(url, dest).instrument(span).await
    }

    async fn download_inner(&self, url: &str, dest: &Path) -> Result<FetchedReport, DownloadError> {
        let mut current = Url::parse(url).map_err(|err| DownloadError::InvalidUrl {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        let mut redirects = 0usize;

        loop {
            let resp = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|source| DownloadError::Request {
                    url: current.to_string(),
                    source,
                })?;
            let status = resp.status();

            if status.is_redirection() {
                let location = resp
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned);
                if let Some(location) = location {
                    if redirects >= self.max_redirects {
                        return Err(DownloadError::TooManyRedirects {
                            limit: self.max_redirects,
                            url: url.to_string(),
                        });
                    }
                    let next = current.join(&location).map_err(|err| DownloadError::InvalidUrl {
                        url: location.clone(),
                        message: err.to_string(),
                    })?;
                    debug!(from = %current, to = %next, status = status.as_u16(), "following redirect");
                    current = next;
                    redirects += 1;
                    continue;
                }
            }

            if status != StatusCode::OK {
                return Err(DownloadError::HttpStatus {
                    status: status.as_u16(),
                    url: current.to_string(),
                });
            }

            let body = resp.bytes().await.map_err(|source| DownloadError::Request {
                url: current.to_string(),
                source,
            })?;
            write_atomically(dest, &body).await?;

            let content_hash = sha256_hex(&body);
            info!(
                path = %dest.display(),
                bytes = body.len(),
                redirects,
                sha256 = %content_hash,
                "report downloaded"
            );
            return Ok(FetchedReport {
                path: dest.to_path_buf(),
                final_url: Some(current.to_string()),
                byte_size: Some(body.len()),
                content_hash: Some(content_hash),
                redirects,
            });
        }
    }
}

/// Write through a temp file and rename so `dest` never holds a partial download.
pub async fn write_atomically(dest: &Path, bytes: &[u8]) -> Result<(), DownloadError> {
    let io_err = |source: std::io::Error| DownloadError::Io {
        path: dest.to_path_buf(),
        source,
    };

    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).await.map_err(io_err)?;

    let temp_path = parent.join(format!(".{}.{}.part", Uuid::new_v4(), bytes.len()));
    let written = async {
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);
        fs::rename(&temp_path, dest).await
    }
    .await;

    if let Err(err) = written {
        let _ = fs::remove_file(&temp_path).await;
        return Err(io_err(err));
    }
    Ok(())
}
