use std::time::Duration;

use common::config::Config;
use common::sheet::{CsvSource, SheetClient};

#[tokio::test]
#[ignore] // requires network and a published sheet
async fn test_fetch_configured_sheet_export() {
    let config = Config::from_toml_str(include_str!("../../../config/default.toml")).unwrap();
    let client = SheetClient::new(&config.source.sheet_url, Duration::from_secs(15)).unwrap();

    let body = client.fetch_csv(None).await.unwrap();
    let header = body.lines().next().unwrap_or_default();
    assert!(header.contains(','), "expected a CSV header, got {header:?}");
}

#[tokio::test]
#[ignore] // requires network
async fn test_cache_busted_fetch_matches_plain_fetch_header() {
    let config = Config::from_toml_str(include_str!("../../../config/default.toml")).unwrap();
    let client = SheetClient::new(&config.source.sheet_url, Duration::from_secs(15)).unwrap();

    let plain = client.fetch_csv(None).await.unwrap();
    let busted = client.fetch_csv(Some("integration")).await.unwrap();
    assert_eq!(plain.lines().next(), busted.lines().next());
}
