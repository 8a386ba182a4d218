pub mod aggregation;
pub mod ingestion;
pub mod metrics;
pub mod pipeline;
pub mod reconciliation;
