use std::time::Duration;

use anyhow::Result;
use common::sheet::{FileSource, SheetClient};
use ledger::pipeline;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let config = common::config::Config::load()?;

    let (dispatch, _otel_guard) = common::observability::build_dispatch(
        config.observability.service_name.clone(),
        &config.general.log_level,
    );
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    let invocation = cli::parse_args(std::env::args()).map_err(anyhow::Error::msg)?;
    let settings = config.ledger_settings()?;
    let today = chrono::Local::now().date_naive();

    let report = if let Some(path) = &invocation.csv_path {
        pipeline::refresh(&FileSource::new(path), &settings, today, None).await?
    } else {
        let client = SheetClient::new(
            &config.source.sheet_url,
            Duration::from_secs(config.source.request_timeout_secs),
        )?;
        pipeline::refresh(&client, &settings, today, None).await?
    };

    print!("{}", cli::render(&report, &invocation)?);
    Ok(())
}
