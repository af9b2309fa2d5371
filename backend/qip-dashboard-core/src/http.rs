// src/http.rs
use axum::{
    extract::{Form, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::admin::{self, RecipientForm};
use crate::clock::Clock;
use crate::html;
use crate::identity::IdentityError;
use crate::loader::DashboardLoader;
use crate::period::Period;
use crate::pipeline::PipelineTrigger;
use crate::session::{Session, SessionStore};
use crate::thresholds::{FormErrors, SaveError, ThresholdForm};
use crate::views::charts::all_charts;
use crate::views::detail::EmployeeDetail;
use crate::views::kpi::KpiCards;
use crate::views::report::ActionReport;
use crate::views::table::{build_page_with_size, dropdown_options, export_csv, TableQuery};
use crate::AppError;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub loader: Arc<DashboardLoader>,
    pub pipeline: Arc<dyn PipelineTrigger>,
    pub clock: Arc<dyn Clock>,
    pub page_size: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/login", get(handle_login_page).post(handle_login))
        .route("/logout", post(handle_logout))
        .route("/", get(handle_dashboard_page))
        .route("/admin", get(handle_admin_page))
        .route("/admin/thresholds", post(handle_admin_thresholds_form))
        .route("/api/periods/{period}/dashboard", get(handle_dashboard))
        .route("/api/periods/{period}/employees", get(handle_employees))
        .route("/api/periods/{period}/employees.csv", get(handle_employees_csv))
        .route("/api/periods/{period}/employees/{emp_no}", get(handle_employee_detail))
        .route("/api/periods/{period}/report", get(handle_report))
        .route(
            "/api/periods/{period}/thresholds",
            get(handle_get_thresholds).put(handle_save_thresholds),
        )
        .route("/api/periods/{period}/pipeline", post(handle_trigger_pipeline))
        .route(
            "/api/admin/recipients",
            get(handle_list_recipients).post(handle_add_recipient),
        )
        .route("/api/admin/recipients/{email}", delete(handle_remove_recipient))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn login_redirect() -> Response {
    Redirect::to("/login").into_response()
}

fn parse_period(raw: &str) -> Result<Period, AppError> {
    Ok(Period::parse(raw)?)
}

// --- Public ---

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    email: String,
    password: String,
}

async fn handle_login_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if state.sessions.check_authenticated(&headers).await.is_ok() {
        return Redirect::to("/").into_response();
    }
    Html(html::login_page(None)).into_response()
}

async fn handle_login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    match state.sessions.sign_in(&form.email, &form.password).await {
        Ok(session) => (
            [(header::SET_COOKIE, state.sessions.session_cookie(&session.id))],
            Redirect::to("/"),
        )
            .into_response(),
        Err(IdentityError::InvalidCredentials) => {
            warn!("Rejected sign-in for {}", form.email.trim());
            (
                StatusCode::UNAUTHORIZED,
                Html(html::login_page(Some("Email or password is incorrect."))),
            )
                .into_response()
        }
        Err(e) => AppError::from(e).into_response(),
    }
}

async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    state.sessions.sign_out(&headers).await;
    (
        [(header::SET_COOKIE, state.sessions.clear_cookie())],
        Redirect::to("/login"),
    )
        .into_response()
}

// --- HTML pages ---

#[derive(Debug, Default, Deserialize)]
struct PeriodParam {
    period: Option<String>,
}

impl PeriodParam {
    fn resolve(&self, clock: &dyn Clock) -> Result<Period, AppError> {
        match self.period.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(raw) => parse_period(raw),
            None => Ok(Period::current(clock)),
        }
    }
}

async fn handle_dashboard_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(param): Query<PeriodParam>,
    Query(query): Query<TableQuery>,
) -> Result<Response, AppError> {
    let Ok(session) = state.sessions.check_authenticated(&headers).await else {
        return Ok(login_redirect());
    };
    let period = param.resolve(state.clock.as_ref())?;
    let loaded = state.loader.load_all(period, &session.store_auth()).await;
    let kpis = KpiCards::build(&loaded);
    let table = build_page_with_size(&loaded.employees, &loaded.thresholds, &query, state.page_size);
    let latest = Period::current(state.clock.as_ref()).max(period);
    Ok(Html(html::dashboard_page(&session, &loaded, &kpis, &table, &query, latest)).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct SavedParam {
    saved: Option<usize>,
}

async fn render_admin_page(
    state: &AppState,
    session: &Session,
    period: Period,
    saved: Option<usize>,
    errors: Option<&FormErrors>,
) -> Result<String, AppError> {
    let auth = session.store_auth();
    let thresholds = state.loader.current_thresholds(period, &auth).await?;
    let recipients = admin::list_recipients(state.loader.store().as_ref(), &auth).await?;
    Ok(html::admin_page(
        session,
        period,
        &thresholds,
        &recipients,
        saved,
        errors,
    ))
}

async fn handle_admin_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(param): Query<PeriodParam>,
    Query(saved): Query<SavedParam>,
) -> Result<Response, AppError> {
    let Ok(session) = state.sessions.require_administrator(&headers).await else {
        return Ok(login_redirect());
    };
    let period = param.resolve(state.clock.as_ref())?;
    let page = render_admin_page(&state, &session, period, saved.saved, None).await?;
    Ok(Html(page).into_response())
}

/// Browser submission of the admin threshold form. Same validation as the
/// JSON endpoint; errors re-render the page instead of returning JSON.
async fn handle_admin_thresholds_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(param): Query<PeriodParam>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let Ok(session) = state.sessions.require_administrator(&headers).await else {
        return Ok(login_redirect());
    };
    let period = param.resolve(state.clock.as_ref())?;
    let saved = match ThresholdForm::from_form_fields(&fields) {
        Ok(form) => {
            state
                .loader
                .save_thresholds(period, &form, &session.email, &session.store_auth())
                .await
        }
        Err(errors) => Err(SaveError::Invalid(errors)),
    };

    match saved {
        Ok(outcome) => {
            info!(
                "Admin form saved thresholds for {} ({} change(s))",
                period,
                outcome.changes.len()
            );
            let location = format!("/admin?period={}&saved={}", period, outcome.changes.len());
            Ok(Redirect::to(&location).into_response())
        }
        Err(SaveError::Invalid(errors)) => {
            warn!("Admin form for {} rejected: {}", period, errors);
            let page = render_admin_page(&state, &session, period, None, Some(&errors)).await?;
            Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(page)).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

// --- JSON API (session) ---

async fn signed_in(state: &AppState, headers: &HeaderMap) -> Result<Session, AppError> {
    Ok(state.sessions.check_authenticated(headers).await?)
}

async fn administrator(state: &AppState, headers: &HeaderMap) -> Result<Session, AppError> {
    Ok(state.sessions.require_administrator(headers).await?)
}

async fn handle_dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(period): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = signed_in(&state, &headers).await?;
    let period = parse_period(&period)?;
    let loaded = state.loader.load_all(period, &session.store_auth()).await;
    Ok(Json(json!({
        "period": loaded.period,
        "label": loaded.period.label(),
        "kpis": KpiCards::build(&loaded),
        "charts": all_charts(&loaded),
        "summary": loaded.summary,
        "thresholds": loaded.thresholds,
        "dropdowns": dropdown_options(&loaded.employees),
        "banners": loaded.banners,
    })))
}

async fn handle_employees(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(period): Path<String>,
    Query(query): Query<TableQuery>,
) -> Result<Response, AppError> {
    let session = signed_in(&state, &headers).await?;
    let period = parse_period(&period)?;
    let loaded = state.loader.load_all(period, &session.store_auth()).await;
    let page = build_page_with_size(&loaded.employees, &loaded.thresholds, &query, state.page_size);
    Ok(Json(page).into_response())
}

async fn handle_employees_csv(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(period): Path<String>,
    Query(query): Query<TableQuery>,
) -> Result<Response, AppError> {
    let session = signed_in(&state, &headers).await?;
    let period = parse_period(&period)?;
    let loaded = state.loader.load_all(period, &session.store_auth()).await;
    let csv = export_csv(&loaded.employees, &loaded.thresholds, &query)?;
    let disposition = format!("attachment; filename=\"qip_{}.csv\"", period);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

async fn handle_employee_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((period, emp_no)): Path<(String, String)>,
) -> Result<Json<EmployeeDetail>, AppError> {
    let session = signed_in(&state, &headers).await?;
    let period = parse_period(&period)?;
    let loaded = state.loader.load_all(period, &session.store_auth()).await;
    let employee = loaded
        .employee(&emp_no)
        .ok_or_else(|| AppError::NotFound(format!("Employee {} in {}", emp_no, period)))?;
    Ok(Json(EmployeeDetail::build(employee, &loaded.thresholds)))
}

async fn handle_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(period): Path<String>,
) -> Result<Json<ActionReport>, AppError> {
    let session = signed_in(&state, &headers).await?;
    let period = parse_period(&period)?;
    let loaded = state.loader.load_all(period, &session.store_auth()).await;
    Ok(Json(ActionReport::build(&loaded)))
}

// --- JSON API (administrator) ---

async fn handle_get_thresholds(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(period): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = administrator(&state, &headers).await?;
    let period = parse_period(&period)?;
    let thresholds = state
        .loader
        .current_thresholds(period, &session.store_auth())
        .await?;
    Ok(Json(json!({ "period": period, "thresholds": thresholds })))
}

async fn handle_save_thresholds(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(period): Path<String>,
    Json(form): Json<ThresholdForm>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = administrator(&state, &headers).await?;
    let period = parse_period(&period)?;
    let outcome = state
        .loader
        .save_thresholds(period, &form, &session.email, &session.store_auth())
        .await?;
    Ok(Json(json!({
        "thresholds": outcome.thresholds,
        "changes": outcome.changes,
        "entry": outcome.entry,
    })))
}

async fn handle_trigger_pipeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(period): Path<String>,
) -> Result<Response, AppError> {
    let session = administrator(&state, &headers).await?;
    let period = parse_period(&period)?;
    let receipt = state.pipeline.trigger(period, &session.email).await?;
    info!("Pipeline triggered for {} by {}", period, session.email);
    Ok((StatusCode::ACCEPTED, Json(receipt)).into_response())
}

async fn handle_list_recipients(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = administrator(&state, &headers).await?;
    let recipients =
        admin::list_recipients(state.loader.store().as_ref(), &session.store_auth()).await?;
    Ok(Json(json!({ "recipients": recipients })))
}

async fn handle_add_recipient(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<RecipientForm>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = administrator(&state, &headers).await?;
    let recipients =
        admin::add_recipient(state.loader.store().as_ref(), &session.store_auth(), &form).await?;
    Ok(Json(json!({ "recipients": recipients })))
}

async fn handle_remove_recipient(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(email): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = administrator(&state, &headers).await?;
    let recipients =
        admin::remove_recipient(state.loader.store().as_ref(), &session.store_auth(), &email)
            .await?;
    Ok(Json(json!({ "recipients": recipients })))
}
