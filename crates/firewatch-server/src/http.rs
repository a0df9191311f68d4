use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use firewatch_core::{
    compute_stats, filter_by_status_risk, filter_by_window, session_recent, Incident,
    IncidentDraft, IncidentStats, StatusRiskFilter, SyncError, TimeWindow,
};
use firewatch_feed::FeedStatus;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SyncError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SyncError::NotFound(_) => StatusCode::NOT_FOUND,
            SyncError::RemoteWrite(_) => StatusCode::BAD_GATEWAY,
            SyncError::FeedDisruption(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct FilterQuery {
    window: Option<String>,
    status: Option<String>,
    risk: Option<String>,
    recent: Option<bool>,
}

struct FilterParams {
    window: TimeWindow,
    filter: StatusRiskFilter,
    recent: bool,
}

impl FilterQuery {
    fn parse(self) -> Result<FilterParams, SyncError> {
        Ok(FilterParams {
            window: match self.window.as_deref() {
                Some(raw) => raw.parse()?,
                None => TimeWindow::All,
            },
            filter: StatusRiskFilter {
                status: self
                    .status
                    .as_deref()
                    .map(|raw| raw.parse::<firewatch_core::IncidentStatus>())
                    .transpose()?,
                risk: self
                    .risk
                    .as_deref()
                    .map(|raw| raw.parse::<firewatch_core::RiskLevel>())
                    .transpose()?,
            },
            recent: self.recent.unwrap_or(false),
        })
    }
}

fn apply_filters(
    records: &[Incident],
    params: &FilterParams,
    session_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<Incident> {
    let mut result = filter_by_window(records, params.window, now);
    result = filter_by_status_risk(&result, params.filter);
    if params.recent {
        result = session_recent(&result, session_start);
    }
    result
}

#[derive(Deserialize)]
struct CreateIncidentBody {
    latitude: f64,
    longitude: f64,
    description: String,
    risk_level: String,
}

#[derive(Deserialize)]
struct StatusBody {
    status: String,
}

#[derive(Deserialize)]
struct AssistanceBody {
    assistance_type: Option<String>,
}

#[derive(Deserialize)]
struct DispatchBody {
    resources: Vec<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: FeedStatus,
    incidents: usize,
    uptime_seconds: u64,
    session_start: DateTime<Utc>,
}

#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    stats: IncidentStats,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/incidents", get(list_handler).post(create_handler))
        .route("/incidents/filtered", get(filtered_handler))
        .route("/incidents/:id", delete(delete_handler))
        .route("/incidents/:id/status", post(status_handler))
        .route("/incidents/:id/assistance", post(assistance_handler))
        .route("/incidents/:id/dispatch", post(dispatch_handler))
        .route("/stats", get(stats_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let incidents = state.store.read().await.len();
    Json(HealthResponse {
        status: state.feed_status(),
        incidents,
        uptime_seconds: state.uptime_seconds(),
        session_start: state.session_start,
    })
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

async fn list_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.read().await.all())
}

async fn filtered_handler(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Vec<Incident>>, ApiError> {
    let params = query.parse()?;
    let snapshot = state.store.read().await.all();
    Ok(Json(apply_filters(
        &snapshot,
        &params,
        state.session_start,
        Utc::now(),
    )))
}

async fn stats_handler(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    let params = query.parse()?;
    let now = Utc::now();
    let snapshot = state.store.read().await.all();
    let filtered = apply_filters(&snapshot, &params, state.session_start, now);
    Ok(Json(StatsResponse {
        stats: compute_stats(&filtered, now),
    }))
}

async fn create_handler(
    State(state): State<AppState>,
    Json(body): Json<CreateIncidentBody>,
) -> Result<impl IntoResponse, ApiError> {
    let draft = IncidentDraft {
        latitude: body.latitude,
        longitude: body.longitude,
        description: body.description,
        risk_level: body.risk_level.parse()?,
    };
    let created = state.coordinator.create_incident(draft).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn status_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> Result<Json<Incident>, ApiError> {
    let status = body.status.parse()?;
    let updated = state.coordinator.change_status(&id, status).await?;
    Ok(Json(updated))
}

async fn assistance_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AssistanceBody>,
) -> Result<Json<Incident>, ApiError> {
    // Absent or "unset" clears the assignment
    let kind = match body.assistance_type.as_deref() {
        None | Some("unset") => None,
        Some(raw) => Some(raw.parse()?),
    };
    let updated = state.coordinator.change_assistance_type(&id, kind).await?;
    Ok(Json(updated))
}

async fn dispatch_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DispatchBody>,
) -> Result<Json<Incident>, ApiError> {
    let updated = state
        .coordinator
        .dispatch_resources(&id, body.resources)
        .await?;
    Ok(Json(updated))
}

async fn delete_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.coordinator.delete_incident(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
