//! Axum JSON API over the partner portal workflows.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pps_core::{
    Candidate, CandidateFilter, CandidateStatus, DuplicateProbeFields, NewCandidate, Viewer,
};
use pps_sync::{
    EnrichmentError, PinError, Portal, PortalConfig, PortalError, RegistrationOutcome,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

pub const CRATE_NAME: &str = "pps-web";

pub const USER_HEADER: &str = "x-pps-user-id";
pub const ROLE_HEADER: &str = "x-pps-role";

#[derive(Clone)]
pub struct AppState {
    pub portal: Portal,
}

impl AppState {
    pub fn new(portal: Portal) -> Self {
        Self { portal }
    }
}

type Shared = State<Arc<AppState>>;

#[derive(Debug, Deserialize, Default)]
struct ListQuery {
    filter: Option<String>,
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    #[serde(flatten)]
    candidate: NewCandidate,
    #[serde(default)]
    confirm: bool,
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    candidate: Candidate,
    status: CandidateStatus,
}

#[derive(Debug, Deserialize)]
struct CandidatesRequest {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct LookupRequest {
    linkedin_url: String,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/candidates", get(list_handler).post(register_handler))
        .route("/candidates/duplicates", post(duplicates_handler))
        .route("/candidates/pin", post(pin_handler))
        .route("/candidates/status", post(status_handler))
        .route("/candidates/delete", post(delete_handler))
        .route("/enrichment/lookup", post(lookup_handler))
        .route("/enrichment/candidate", post(enrich_candidate_handler))
        .route("/enrichment/batch", post(batch_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(config: &PortalConfig, port: u16) -> anyhow::Result<()> {
    let portal = Portal::from_config(config).await?;
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening");
    axum::serve(listener, app(AppState::new(portal))).await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("PPS_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    serve(&PortalConfig::from_env(), port).await
}

/// Identity as forwarded by the auth gateway in front of this service.
fn viewer_from_headers(headers: &HeaderMap) -> Viewer {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    match header(USER_HEADER) {
        Some(user_id) if header(ROLE_HEADER).is_some_and(|r| r.eq_ignore_ascii_case("admin")) => {
            Viewer::admin(user_id)
        }
        Some(user_id) => Viewer::user(user_id),
        None => Viewer::anonymous(),
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn enrichment_status(err: &EnrichmentError) -> StatusCode {
    match err {
        EnrichmentError::MissingLinkedinUrl => StatusCode::BAD_REQUEST,
        EnrichmentError::NotFound => StatusCode::NOT_FOUND,
        EnrichmentError::PollingTimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
        EnrichmentError::Incomplete => StatusCode::ACCEPTED,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn portal_error(err: PortalError) -> Response {
    let status = match &err {
        PortalError::Unauthenticated | PortalError::Pin(PinError::Unauthenticated) => {
            StatusCode::UNAUTHORIZED
        }
        PortalError::Forbidden(_) => StatusCode::FORBIDDEN,
        PortalError::Conflict(_) => StatusCode::CONFLICT,
        PortalError::NotCanonical | PortalError::Invalid(_) | PortalError::Pin(PinError::Unkeyed) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        PortalError::Enrichment(inner) => enrichment_status(inner),
        PortalError::Store(_) | PortalError::Pin(PinError::Store(_)) => {
            error!(error = %err, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, err.to_string())
}

async fn healthz_handler() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

async fn list_handler(
    State(state): Shared,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let filter = match query.filter.as_deref().map(str::parse::<CandidateFilter>) {
        None => CandidateFilter::default(),
        Some(Ok(filter)) => filter,
        Some(Err(err)) => return error_response(StatusCode::BAD_REQUEST, err.to_string()),
    };
    let viewer = viewer_from_headers(&headers);
    match state
        .portal
        .list_candidates(&viewer, filter, query.q.as_deref())
        .await
    {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => portal_error(err.into()),
    }
}

async fn register_handler(
    State(state): Shared,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Response {
    let viewer = viewer_from_headers(&headers);
    match state
        .portal
        .register_candidate(&viewer, req.candidate, req.confirm)
        .await
    {
        Ok(outcome @ RegistrationOutcome::Duplicate(_)) => {
            (StatusCode::CONFLICT, Json(outcome)).into_response()
        }
        Ok(outcome @ RegistrationOutcome::Existing { .. }) => Json(outcome).into_response(),
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(err) => portal_error(err),
    }
}

async fn duplicates_handler(State(state): Shared, Json(fields): Json<DuplicateProbeFields>) -> Response {
    Json(state.portal.check_duplicate(&fields).await).into_response()
}

async fn pin_handler(State(state): Shared, headers: HeaderMap, Json(candidate): Json<Candidate>) -> Response {
    let viewer = viewer_from_headers(&headers);
    match state.portal.toggle_pin(&viewer, &candidate) {
        Ok(pinned) => Json(json!({ "pinned": pinned })).into_response(),
        Err(err) => portal_error(err.into()),
    }
}

async fn status_handler(State(state): Shared, headers: HeaderMap, Json(req): Json<StatusRequest>) -> Response {
    let viewer = viewer_from_headers(&headers);
    match state
        .portal
        .set_status(&viewer, &req.candidate, req.status)
        .await
    {
        Ok(candidate) => Json(candidate).into_response(),
        Err(err) => portal_error(err),
    }
}

async fn delete_handler(
    State(state): Shared,
    headers: HeaderMap,
    Json(req): Json<CandidatesRequest>,
) -> Response {
    let viewer = viewer_from_headers(&headers);
    match state.portal.delete_candidates(&viewer, &req.candidates).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => portal_error(err),
    }
}

async fn lookup_handler(State(state): Shared, headers: HeaderMap, Json(req): Json<LookupRequest>) -> Response {
    if viewer_from_headers(&headers).user_id().is_none() {
        return portal_error(PortalError::Unauthenticated);
    }
    match state.portal.lookup_contact(&req.linkedin_url).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(err) => error_response(enrichment_status(&err), err.to_string()),
    }
}

async fn enrich_candidate_handler(
    State(state): Shared,
    headers: HeaderMap,
    Json(candidate): Json<Candidate>,
) -> Response {
    let viewer = viewer_from_headers(&headers);
    match state.portal.enrich_candidate(&viewer, &candidate).await {
        Ok(enriched) => Json(enriched).into_response(),
        Err(err) => portal_error(err),
    }
}

async fn batch_handler(
    State(state): Shared,
    headers: HeaderMap,
    Json(req): Json<CandidatesRequest>,
) -> Response {
    let viewer = viewer_from_headers(&headers);
    match state.portal.run_batch(&viewer, &req.candidates, None).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => portal_error(err),
    }
}
