use anyhow::Context;
use axum::http::StatusCode as AxumStatusCode;
use axum::{response::IntoResponse, Json};
use axum_server::tls_rustls::RustlsConfig;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod admin;
mod cache;
mod clock;
mod config;
mod derive;
mod firestore;
mod firestore_value;
mod html;
mod http;
mod http_tests;
mod identity;
mod loader;
mod model;
mod normalize;
mod period;
mod pipeline;
mod session;
mod store;
mod summary;
mod thresholds;
mod views;

use crate::admin::RecipientError;
use crate::clock::{Clock, SystemClock};
use crate::config::DashboardConfig;
use crate::firestore::FirestoreStore;
use crate::http::AppState;
use crate::identity::{FirebaseIdentity, IdentityError, IdentityProvider, StaticIdentity};
use crate::loader::DashboardLoader;
use crate::period::{Period, PeriodError};
use crate::pipeline::{PipelineTrigger, RecordingTrigger, TriggerError, WorkflowDispatch};
use crate::session::{AuthError, SessionStore};
use crate::store::{DocumentStore, MemoryStore, StoreAuth, StoreError};
use crate::thresholds::{FormErrors, SaveError};
use crate::views::report::ActionReport;
use crate::views::table::{export_csv, TableQuery};

// Lifetime of the opaque tokens issued in offline mode.
const OFFLINE_TOKEN_LIFETIME_SECS: i64 = 60 * 60;

// --- Error Handling ---

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid period: {0}")]
    Period(#[from] PeriodError),
    #[error("Document store error: {0}")]
    Store(#[from] StoreError),
    #[error("Access denied: {0}")]
    Auth(#[from] AuthError),
    #[error("Identity provider error: {0}")]
    Identity(#[from] IdentityError),
    #[error("Pipeline trigger failed: {0}")]
    Trigger(#[from] TriggerError),
    #[error("Form validation failed: {0}")]
    Form(#[from] FormErrors),
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<SaveError> for AppError {
    fn from(err: SaveError) -> Self {
        match err {
            SaveError::Invalid(errors) => AppError::Form(errors),
            SaveError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<RecipientError> for AppError {
    fn from(err: RecipientError) -> Self {
        match err {
            RecipientError::Invalid(errors) => AppError::Form(errors),
            RecipientError::Store(e) => AppError::Store(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        error!("Error occurred: {}", self);

        let (status_code, error_message) = match self {
            AppError::Period(ref e) => (AxumStatusCode::BAD_REQUEST, e.to_string()),
            AppError::Store(StoreError::PermissionDenied { .. }) => (
                AxumStatusCode::FORBIDDEN,
                "The document store refused access.".to_string(),
            ),
            AppError::Store(StoreError::RateLimited) => (
                AxumStatusCode::TOO_MANY_REQUESTS,
                "The document store is rate limiting requests. Try again shortly.".to_string(),
            ),
            AppError::Store(_) => (
                AxumStatusCode::BAD_GATEWAY,
                "Document store request failed.".to_string(),
            ),
            AppError::Auth(AuthError::NotAuthenticated) => (
                AxumStatusCode::UNAUTHORIZED,
                "Sign in required.".to_string(),
            ),
            AppError::Auth(AuthError::NotAuthorized) => (
                AxumStatusCode::FORBIDDEN,
                "Administrator access required.".to_string(),
            ),
            AppError::Identity(IdentityError::InvalidCredentials) => (
                AxumStatusCode::UNAUTHORIZED,
                "Email or password is incorrect.".to_string(),
            ),
            AppError::Identity(_) => (
                AxumStatusCode::BAD_GATEWAY,
                "Identity provider request failed.".to_string(),
            ),
            AppError::Trigger(TriggerError::NotConfigured(reason)) => (
                AxumStatusCode::SERVICE_UNAVAILABLE,
                format!("Pipeline trigger is not configured ({}).", reason),
            ),
            AppError::Trigger(TriggerError::Rejected { status, .. }) => (
                AxumStatusCode::BAD_GATEWAY,
                format!("CI rejected the workflow dispatch (Status {}).", status),
            ),
            AppError::Trigger(_) => (
                AxumStatusCode::BAD_GATEWAY,
                "Pipeline trigger request failed.".to_string(),
            ),
            AppError::Form(errors) => {
                return (
                    AxumStatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "errors": errors.errors })),
                )
                    .into_response();
            }
            AppError::Csv(_) => (
                AxumStatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error (CSV export).".to_string(),
            ),
            AppError::NotFound(ref what) => {
                (AxumStatusCode::NOT_FOUND, format!("{} was not found.", what))
            }
        };

        (status_code, Json(json!({ "error": error_message }))).into_response()
    }
}

// --- Command Line ---

#[derive(Parser, Debug)]
#[command(name = "qip-dashboard", about = "QIP incentive dashboard server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Print the action report for a period as JSON.
    Report {
        /// `february_2026` or `2026-02`; defaults to the current month.
        #[arg(long)]
        period: Option<String>,
    },
    /// Write the full employee table for a period as CSV.
    Export {
        #[arg(long)]
        period: Option<String>,
        #[arg(long, default_value = "qip_export.csv")]
        out: PathBuf,
    },
}

// --- Wiring ---

struct Backends {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    pipeline: Arc<dyn PipelineTrigger>,
}

fn build_backends(config: &DashboardConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Backends> {
    if let Some(fixture) = &config.offline_fixture {
        warn!("Offline mode: serving {:?} with static accounts", fixture);
        let store = MemoryStore::from_fixture_file(fixture)
            .with_context(|| format!("Failed to load offline fixture {:?}", fixture))?;
        let accounts = config.offline_account_list();
        if accounts.is_empty() {
            warn!("No offline accounts configured; nobody will be able to sign in");
        }
        let identity = accounts
            .iter()
            .fold(StaticIdentity::new(OFFLINE_TOKEN_LIFETIME_SECS), |identity, (email, pw)| {
                identity.with_account(email, pw)
            });
        return Ok(Backends {
            store: Arc::new(store),
            identity: Arc::new(identity),
            pipeline: Arc::new(RecordingTrigger::new(clock)),
        });
    }

    if config.firebase_project_id.is_empty() || config.firebase_api_key.is_empty() {
        anyhow::bail!(
            "QIP_FIREBASE_PROJECT_ID and QIP_FIREBASE_API_KEY are required unless QIP_OFFLINE_FIXTURE is set"
        );
    }
    let store = FirestoreStore::new(config.firestore()).context("Failed to build Firestore client")?;
    let identity = FirebaseIdentity::new(
        config.firebase_api_key.clone(),
        config.identity_base_url.clone(),
        config.token_base_url.clone(),
    )
    .context("Failed to build identity client")?;
    let pipeline =
        WorkflowDispatch::new(config.pipeline(), clock).context("Failed to build CI client")?;
    if config.ci_token.as_deref().map_or(true, str::is_empty) {
        warn!("QIP_CI_TOKEN is not set; pipeline triggers will be refused");
    }
    info!("Using Firestore project {}", config.firebase_project_id);
    Ok(Backends {
        store: Arc::new(store),
        identity: Arc::new(identity),
        pipeline: Arc::new(pipeline),
    })
}

fn build_state(config: &DashboardConfig, backends: Backends, clock: Arc<dyn Clock>) -> AppState {
    let loader = DashboardLoader::new(
        backends.store.clone(),
        clock.clone(),
        config.cache_ttl_secs,
        config.cache_max_entries,
    );
    let sessions = SessionStore::new(
        backends.identity,
        backends.store,
        clock.clone(),
        config.session_idle_secs,
        config.cache_ttl_secs,
        config.tls_paths().is_some(),
    );
    AppState {
        sessions: Arc::new(sessions),
        loader: Arc::new(loader),
        pipeline: backends.pipeline,
        clock,
        page_size: config.page_size,
    }
}

fn resolve_period(raw: Option<&str>, clock: &dyn Clock) -> anyhow::Result<Period> {
    match raw {
        Some(raw) => Ok(Period::parse(raw)?),
        None => Ok(Period::current(clock)),
    }
}

async fn serve(config: &DashboardConfig, state: AppState) -> anyhow::Result<()> {
    let app = http::router(state);
    let addr = config.bind_address;

    match config.tls_paths() {
        Some((cert_path, key_path)) => {
            let tls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
                .await
                .with_context(|| {
                    format!("Failed to load TLS cert/key: {:?}, {:?}", cert_path, key_path)
                })?;
            info!(
                "TLS configuration loaded successfully from {:?} and {:?}",
                cert_path, key_path
            );
            info!("Starting server on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            warn!("No TLS cert/key configured; session cookies are not marked Secure");
            info!("Starting server on http://{}", addr);
            axum_server::bind(addr).serve(app.into_make_service()).await?;
        }
    }
    Ok(())
}

// --- Main Application Logic ---

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = DashboardConfig::from_env().context("Failed to read QIP_* configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backends = build_backends(&config, clock.clone())?;
    let state = build_state(&config, backends, clock.clone());
    info!("Application state initialized.");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, state).await,
        Command::Report { period } => {
            let period = resolve_period(period.as_deref(), clock.as_ref())?;
            let loaded = state.loader.load_all(period, &StoreAuth::Anonymous).await;
            for banner in &loaded.banners {
                warn!("{}: {}", banner.source, banner.message);
            }
            let report = ActionReport::build(&loaded);
            info!("{} employees flagged for {}", report.flagged_count(), period);
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Export { period, out } => {
            let period = resolve_period(period.as_deref(), clock.as_ref())?;
            let loaded = state.loader.load_all(period, &StoreAuth::Anonymous).await;
            let csv = export_csv(&loaded.employees, &loaded.thresholds, &TableQuery::default())?;
            std::fs::write(&out, csv).with_context(|| format!("Failed to write {:?}", out))?;
            info!("Exported {} employees for {} to {:?}", loaded.employees.len(), period, out);
            Ok(())
        }
    }
}
