mod cache;
mod models;
mod telemetry;

use anyhow::Result;
use askama::Template;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use cache::FetchCache;
use common::config::LedgerSettings;
use common::sheet::{CsvSource, SheetClient};
use ledger::pipeline;
use metrics_exporter_prometheus::PrometheusHandle;
use models::DashboardView;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

pub struct AppState<S> {
    pub source: S,
    pub cache: FetchCache,
    pub settings: LedgerSettings,
    pub auth_password: Option<String>,
    /// `None` leaves `/metrics` unrouted (404).
    pub prometheus: Option<PrometheusHandle>,
}

// --- Cookie-based Auth Middleware ---

const AUTH_COOKIE_NAME: &str = "ledger_auth";

fn generate_auth_token(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Redirects to /login if auth_password is configured and the cookie doesn't match.
/// With no password configured every request passes through.
async fn auth_middleware<S>(
    State(state): State<Arc<AppState<S>>>,
    request: Request,
    next: Next,
) -> Response
where
    S: CsvSource + Send + Sync + 'static,
{
    let Some(password) = state.auth_password.as_deref() else {
        return next.run(request).await;
    };

    let expected = format!("{AUTH_COOKIE_NAME}={}", generate_auth_token(password));
    let is_authenticated = request
        .headers()
        .get(header::COOKIE)
        .and_then(|cookie_header| cookie_header.to_str().ok())
        .is_some_and(|cookie_str| cookie_str.split(';').any(|c| c.trim() == expected));

    if is_authenticated {
        next.run(request).await
    } else {
        Redirect::to("/login").into_response()
    }
}

// --- Templates ---

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    view: DashboardView,
    show_logout: bool,
}

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    error: Option<String>,
}

fn render_html<T: Template>(template: &T) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "template render failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "template error").into_response()
        }
    }
}

// --- Handlers ---

async fn dashboard<S>(State(state): State<Arc<AppState<S>>>) -> Response
where
    S: CsvSource + Send + Sync + 'static,
{
    let today = chrono::Local::now().date_naive();
    let fetched = state.cache.get_or_fetch(&state.source, false).await;
    let freshness = fetched
        .as_ref()
        .map_or(cache::Freshness::Live, |(_, freshness)| *freshness);
    let result =
        fetched.and_then(|(body, _)| pipeline::build_report(&body, &state.settings, today));
    pipeline::record_outcome(&state.source.describe(), &result);

    let view = match &result {
        Ok(report) => DashboardView::from_report(report, freshness),
        Err(e) => DashboardView::from_error(e, &state.settings, today),
    };
    render_html(&DashboardTemplate {
        view,
        show_logout: state.auth_password.is_some(),
    })
}

/// Fetch live past any upstream cache. The redirected page view reports the
/// outcome, including a failure, via [`FetchCache`].
async fn refresh<S>(State(state): State<Arc<AppState<S>>>) -> Redirect
where
    S: CsvSource + Send + Sync + 'static,
{
    match state.cache.get_or_fetch(&state.source, true).await {
        Ok((body, _)) => tracing::info!(bytes = body.len(), "forced refresh"),
        Err(e) => tracing::warn!(error = %e, "forced refresh failed"),
    }
    Redirect::to("/")
}

async fn metrics_endpoint<S>(State(state): State<Arc<AppState<S>>>) -> Response
where
    S: CsvSource + Send + Sync + 'static,
{
    match &state.prometheus {
        Some(handle) => {
            handle.run_upkeep();
            handle.render().into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn login_form<S>(State(state): State<Arc<AppState<S>>>) -> Response
where
    S: CsvSource + Send + Sync + 'static,
{
    if state.auth_password.is_none() {
        return Redirect::to("/").into_response();
    }
    render_html(&LoginTemplate { error: None })
}

#[derive(Deserialize)]
struct LoginForm {
    password: String,
}

async fn login_submit<S>(
    State(state): State<Arc<AppState<S>>>,
    Form(form): Form<LoginForm>,
) -> Response
where
    S: CsvSource + Send + Sync + 'static,
{
    let Some(password) = state.auth_password.as_deref() else {
        return Redirect::to("/").into_response();
    };

    if form.password == password {
        let cookie = format!(
            "{AUTH_COOKIE_NAME}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age=604800",
            generate_auth_token(password)
        );
        (
            StatusCode::SEE_OTHER,
            [
                (header::SET_COOKIE, cookie),
                (header::LOCATION, "/".to_string()),
            ],
        )
            .into_response()
    } else {
        tracing::warn!("rejected dashboard login");
        render_html(&LoginTemplate {
            error: Some("Invalid password".to_string()),
        })
    }
}

async fn logout() -> Response {
    let cookie = format!("{AUTH_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    (
        StatusCode::SEE_OTHER,
        [
            (header::SET_COOKIE, cookie),
            (header::LOCATION, "/login".to_string()),
        ],
    )
        .into_response()
}

// --- Router ---

pub fn create_router<S>(state: Arc<AppState<S>>) -> Router
where
    S: CsvSource + Send + Sync + 'static,
{
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/login", get(login_form::<S>).post(login_submit::<S>))
        .route("/logout", get(logout))
        .route("/metrics", get(metrics_endpoint::<S>));

    // Protected routes (auth required if password is set)
    let protected_routes = Router::new()
        .route("/", get(dashboard::<S>))
        .route("/refresh", post(refresh::<S>))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::<S>,
        ));

    public_routes
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = common::config::Config::load()?;

    let (dispatch, _otel_guard) = common::observability::build_dispatch(
        config.observability.service_name.clone(),
        &config.general.log_level,
    );
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;
    let prometheus = telemetry::init_global()?;

    let settings = config.ledger_settings()?;
    let source = SheetClient::new(
        &config.source.sheet_url,
        Duration::from_secs(config.source.request_timeout_secs),
    )?;

    let web_port = config.web.as_ref().map_or(8080, |w| w.port);
    let web_host = config
        .web
        .as_ref()
        .map_or("0.0.0.0".to_string(), |w| w.host.clone());
    let auth_password = config.web.as_ref().and_then(|w| w.auth_password.clone());

    tracing::info!(
        source = %source.describe(),
        strategy = settings.strategy.as_str(),
        cycle_months = settings.cycle_months,
        auth = auth_password.is_some(),
        "starting ledger dashboard"
    );

    let state = Arc::new(AppState {
        source,
        cache: FetchCache::new(Duration::from_secs(config.source.cache_ttl_secs)),
        settings,
        auth_password,
        prometheus: Some(prometheus),
    });

    let app = create_router(state);
    let addr: SocketAddr = format!("{web_host}:{web_port}").parse()?;
    tracing::info!("dashboard listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
