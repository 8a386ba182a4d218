use chrono::NaiveDate;
use common::config::LedgerSettings;
use common::error::{LedgerError, LedgerResult, RecordIssue};
use common::sheet::CsvSource;
use common::types::Position;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use crate::aggregation::{summarize, Settlement, Summary};
use crate::ingestion::{ingest_csv, ColumnMap};
use crate::reconciliation::{reconcile, strategy_for, ReconcileContext};

/// What the dashboard should show after one refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DashboardState {
    /// The sheet has a header but no usable rows.
    NoData,
    FullySettled { settled_positions: usize },
    Active(Summary),
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub state: DashboardState,
    /// Every reconciled position, settled ones included.
    pub positions: Vec<Position>,
    pub issues: Vec<RecordIssue>,
    pub columns: ColumnMap,
    pub strategy: &'static str,
    pub cycle_months: u32,
    pub today: NaiveDate,
}

/// Ingest → reconcile → aggregate over an already-fetched export.
pub fn build_report(
    csv_body: &str,
    settings: &LedgerSettings,
    today: NaiveDate,
) -> LedgerResult<Report> {
    let strategy = strategy_for(settings.strategy);
    let ingested = ingest_csv(csv_body, strategy.required_columns())?;

    metrics::counter!("ledger_records_ingested_total").increment(ingested.records.len() as u64);
    for issue in &ingested.issues {
        metrics::counter!("ledger_record_issues_total", "kind" => issue.kind()).increment(1);
    }

    let ctx = ReconcileContext::new(today, settings, &ingested.records);
    let positions = reconcile(&ingested.records, strategy.as_ref(), &ctx);

    let state = if ingested.records.is_empty() {
        DashboardState::NoData
    } else {
        match summarize(positions.clone(), settings.estimated_monthly_rate_pct) {
            Settlement::FullySettled { settled_positions } => {
                DashboardState::FullySettled { settled_positions }
            }
            Settlement::Active(summary) => DashboardState::Active(summary),
        }
    };

    let (active, capital) = match &state {
        DashboardState::Active(s) => (
            s.active_investor_count,
            s.total_active_capital.to_f64().unwrap_or(0.0),
        ),
        DashboardState::NoData | DashboardState::FullySettled { .. } => (0, 0.0),
    };
    metrics::gauge!("ledger_active_positions").set(active as f64);
    metrics::gauge!("ledger_total_active_capital").set(capital);

    tracing::info!(
        strategy = strategy.name(),
        %today,
        positions = positions.len(),
        active,
        issues = ingested.issues.len(),
        "reconciled ledger"
    );

    Ok(Report {
        state,
        positions,
        issues: ingested.issues,
        columns: ingested.columns,
        strategy: strategy.name(),
        cycle_months: settings.cycle_months,
        today,
    })
}

/// Fetch from `source` and build a fresh report. Failures are logged and
/// counted; the caller renders them.
pub async fn refresh<S: CsvSource + Sync>(
    source: &S,
    settings: &LedgerSettings,
    today: NaiveDate,
    cache_bust: Option<&str>,
) -> LedgerResult<Report> {
    let result = match source.fetch_csv(cache_bust).await {
        Ok(body) => build_report(&body, settings, today),
        Err(e) => Err(e),
    };
    record_outcome(&source.describe(), &result);
    result
}

/// Log and count one refresh. Hosts that fetch through their own cache call
/// this after [`build_report`].
pub fn record_outcome(origin: &str, result: &LedgerResult<Report>) {
    if let Err(e) = result {
        tracing::error!(origin, kind = e.kind(), error = %e, "ledger refresh failed");
    }
    metrics::counter!("ledger_refresh_total", "outcome" => outcome_label(result)).increment(1);
}

fn outcome_label(result: &LedgerResult<Report>) -> &'static str {
    match result {
        Ok(report) => match report.state {
            DashboardState::NoData => "no_data",
            DashboardState::FullySettled { .. } => "fully_settled",
            DashboardState::Active(_) => "active",
        },
        Err(LedgerError::SourceUnavailable(_)) => "source_unavailable",
        Err(LedgerError::SchemaMismatch { .. }) => "schema_mismatch",
        Err(LedgerError::InvalidConfig(_)) => "invalid_config",
    }
}
