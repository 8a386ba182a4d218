use std::path::PathBuf;
use std::time::{Duration, Instant};

use reqwest::Url;

use crate::error::{LedgerError, LedgerResult};

/// Query parameter appended on forced refreshes so upstream caches miss.
pub const CACHE_BUST_PARAM: &str = "cb";

/// Anything that can hand back the raw CSV export of the investor sheet.
pub trait CsvSource {
    /// Human-readable location, for logs.
    fn describe(&self) -> String;

    /// Read the whole export. `cache_bust` forces a live read where the
    /// transport supports it.
    fn fetch_csv(
        &self,
        cache_bust: Option<&str>,
    ) -> impl std::future::Future<Output = LedgerResult<String>> + Send;
}

/// Published Google Sheet CSV export over HTTPS.
pub struct SheetClient {
    csv_url: Url,
    http: reqwest::Client,
}

impl SheetClient {
    pub fn new(csv_url: &str, timeout: Duration) -> LedgerResult<Self> {
        let csv_url = Url::parse(csv_url.trim()).map_err(|e| {
            LedgerError::InvalidConfig(format!("source.sheet_url {csv_url:?} is not a URL: {e}"))
        })?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self { csv_url, http })
    }

    pub fn export_url(&self, cache_bust: Option<&str>) -> Url {
        let mut url = self.csv_url.clone();
        if let Some(nonce) = cache_bust {
            url.query_pairs_mut().append_pair(CACHE_BUST_PARAM, nonce);
        }
        url
    }
}

impl CsvSource for SheetClient {
    fn describe(&self) -> String {
        self.csv_url.to_string()
    }

    async fn fetch_csv(&self, cache_bust: Option<&str>) -> LedgerResult<String> {
        let url = self.export_url(cache_bust);
        let started = Instant::now();
        let result = async {
            let resp = self
                .http
                .get(url.clone())
                .send()
                .await
                .map_err(|e| LedgerError::SourceUnavailable(format!("request failed: {e}")))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(LedgerError::SourceUnavailable(format!(
                    "sheet export returned HTTP {status}"
                )));
            }
            resp.text()
                .await
                .map_err(|e| LedgerError::SourceUnavailable(format!("reading body: {e}")))
        }
        .await;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let status = if result.is_ok() { "ok" } else { "err" };
        metrics::histogram!("ledger_source_fetch_latency_ms", "status" => status).record(elapsed_ms);

        let body = result?;
        tracing::debug!(url = %url, bytes = body.len(), elapsed_ms, "fetched sheet export");
        ensure_non_empty(body)
    }
}

/// CSV export saved on disk. Used by the CLI and in tests.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CsvSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch_csv(&self, _cache_bust: Option<&str>) -> LedgerResult<String> {
        let body = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            LedgerError::SourceUnavailable(format!("reading {}: {e}", self.path.display()))
        })?;
        ensure_non_empty(body)
    }
}

fn ensure_non_empty(body: String) -> LedgerResult<String> {
    if body.trim().is_empty() {
        return Err(LedgerError::SourceUnavailable(
            "sheet export is empty".to_string(),
        ));
    }
    Ok(body)
}
