use metrics::{describe_counter, describe_gauge, describe_histogram};

pub fn describe() {
    describe_counter!(
        "ledger_refresh_total",
        "Ledger refreshes by outcome (active, fully_settled, no_data, source_unavailable, schema_mismatch)."
    );
    describe_histogram!(
        "ledger_source_fetch_latency_ms",
        "Sheet export fetch latency in milliseconds."
    );
    describe_counter!(
        "ledger_records_ingested_total",
        "Valid records read from the sheet export."
    );
    describe_counter!(
        "ledger_record_issues_total",
        "Rows flagged during ingestion, by kind."
    );
    describe_gauge!(
        "ledger_active_positions",
        "Positions with months remaining after the latest refresh."
    );
    describe_gauge!(
        "ledger_total_active_capital",
        "Capital held across active positions after the latest refresh."
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use common::config::LedgerSettings;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn test_report_records_metrics() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe();
            let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
            let csv = "Name,Amount,Date\nPriya,100000,18/04/2026\nAmit,oops,01/01/2026\n";
            let result = crate::pipeline::build_report(csv, &LedgerSettings::default(), today);
            crate::pipeline::record_outcome("test", &result);
        });

        let rendered = handle.render();
        assert!(rendered.contains("ledger_records_ingested_total 1"), "got:\n{rendered}");
        assert!(rendered.contains("kind=\"unidentified_record\""));
        assert!(rendered.contains("outcome=\"active\""));
        assert!(rendered.contains("ledger_total_active_capital"));
    }
}
