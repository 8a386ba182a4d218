use std::borrow::Cow;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer};

/// Env var that switches on OTLP span export.
pub const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Flushes the global tracer provider when dropped. Hold it for the life of `main`.
pub struct OtelGuard {
    _private: (),
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

/// Counts ERROR events so refresh failures show up on `/metrics`.
struct ErrorCounterLayer;

impl<S> Layer<S> for ErrorCounterLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            metrics::counter!("tracing_error_events").increment(1);
        }
    }
}

/// Build the process-wide `tracing` dispatcher:
/// - JSON lines on stdout
/// - `RUST_LOG` when set, otherwise `default_level`
/// - `tracing_error_events` counter for ERROR events
/// - OTLP/HTTP span export when `OTEL_EXPORTER_OTLP_ENDPOINT` is set
///
/// The OTLP batch exporter needs a Tokio runtime; both binaries run under `#[tokio::main]`.
pub fn build_dispatch(
    service_name: impl Into<Cow<'static, str>>,
    default_level: &str,
) -> (tracing::Dispatch, Option<OtelGuard>) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .json();

    let otel_layer = std::env::var(OTLP_ENDPOINT_ENV)
        .ok()
        .and_then(|endpoint| otlp_tracer(&endpoint, service_name.into()))
        .map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));
    let guard = otel_layer.as_ref().map(|_| OtelGuard { _private: () });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(ErrorCounterLayer)
        .with(otel_layer);

    (tracing::Dispatch::new(subscriber), guard)
}

/// `None` when the exporter cannot be built; logs and metrics still work without it.
fn otlp_tracer(
    endpoint: &str,
    service_name: Cow<'static, str>,
) -> Option<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .ok()?;

    let resource = Resource::new(vec![KeyValue::new("service.name", service_name.into_owned())]);
    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_resource(resource)
        .build();

    let tracer = provider.tracer("payout_ledger");
    let _ = opentelemetry::global::set_tracer_provider(provider);
    Some(tracer)
}
