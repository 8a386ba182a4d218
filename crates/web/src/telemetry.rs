use anyhow::Result;
use metrics::describe_gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder once and return a handle for `/metrics`.
///
/// The recorder needs periodic upkeep; `/metrics` runs it on each scrape.
pub fn init_global() -> Result<PrometheusHandle> {
    if let Some(handle) = PROM_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let handle = PROM_HANDLE.get_or_init(|| handle).clone();

    ledger::metrics::describe();
    describe_gauge!(
        "ledger_web_build_info",
        "Build info for the ledger web dashboard (value is always 1)."
    );

    let git_sha = std::env::var("GIT_SHA").unwrap_or_else(|_| "unknown".to_string());
    ::metrics::gauge!(
        "ledger_web_build_info",
        "version" => env!("CARGO_PKG_VERSION"),
        "git_sha" => git_sha,
    )
    .set(1.0);

    Ok(handle)
}
