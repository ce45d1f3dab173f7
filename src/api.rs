//! HTTP surface: conventional JSON-in/JSON-out handlers over the injected
//! storage adapter and generative client.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{error, warn};
use uuid::Uuid;

use crate::ai::aggregate::{generate_aggregated_report, ReportType};
use crate::ai::trend::generate_trend_report;
use crate::ai::weekly::{cluster_issues_by_ai, generate_weekly_report};
use crate::ai::SharedAiClient;
use crate::collect::build_providers;
use crate::config::{DomainConfig, SearchKeys};
use crate::jobs::{job_status, spawn_job, JobKind};
use crate::model::{
    ActivityLog, ApiResponse, Domain, IssueItem, JobState, JobStatus, LogAction,
};
use crate::pipeline::generate_daily_brief;
use crate::store::{kv_get_as, kv_set_as, today_utc, usage_limit_key, SharedStorage,
    USAGE_TTL_SECS};

const DAILY_USAGE_LIMIT: i64 = 3;
const WEEKLY_WINDOW_DAYS: u32 = 7;

#[derive(Clone)]
pub struct AppState {
    pub storage: SharedStorage,
    pub ai: SharedAiClient,
    pub search_keys: Arc<SearchKeys>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/brief", get(get_brief).delete(delete_brief))
        .route("/api/generate", get(generate_via_get).post(generate))
        .route("/api/trend-report", post(start_trend_report))
        .route("/api/trend-report/status", get(trend_report_status))
        .route("/api/weekly-report", post(start_weekly_report))
        .route("/api/weekly-report/status", get(weekly_report_status))
        .route("/api/log", post(record_log))
        .route("/api/admin/logs", get(admin_logs))
        .route("/api/cart/request", post(cart_request))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn ok_json<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::ok(data))).into_response()
}

/// Lenient body parsing: browsers, beacons and cron services sometimes send
/// empty or untyped bodies, so a missing/unreadable body decodes to `None`
/// instead of a rejection.
fn parse_body<T: serde::de::DeserializeOwned>(bytes: &Bytes) -> Option<T> {
    serde_json::from_slice(bytes).ok()
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(ApiResponse::<Value>::err(message))).into_response()
}

async fn health() -> &'static str {
    "ok"
}

// ------------------------------------------------------------
// Brief CRUD
// ------------------------------------------------------------

#[derive(Deserialize)]
struct BriefQuery {
    date: Option<String>,
    list: Option<String>,
    include_issues: Option<String>,
    domain: Option<Domain>,
}

/// Listing shape: issue bodies only on request, to keep archives light.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BriefSummary {
    id: String,
    date: String,
    day_of_week: String,
    total_issues: usize,
    generated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    issues: Option<Vec<IssueItem>>,
}

async fn get_brief(State(state): State<AppState>, Query(q): Query<BriefQuery>) -> Response {
    let domain = q.domain.unwrap_or_default();

    if q.list.as_deref() == Some("true") {
        let include_issues = q.include_issues.as_deref() == Some("true");
        return match state.storage.all_briefs(50).await {
            Ok(briefs) => {
                let summaries: Vec<BriefSummary> = briefs
                    .into_iter()
                    .filter(|b| domain.owns_date_key(&b.date))
                    .map(|b| BriefSummary {
                        id: b.id,
                        date: b.date,
                        day_of_week: b.day_of_week,
                        total_issues: b.total_issues,
                        generated_at: b.generated_at,
                        issues: include_issues.then_some(b.issues),
                    })
                    .collect();
                ok_json(summaries)
            }
            Err(e) => {
                error!(error = ?e, "brief listing failed");
                error_json(StatusCode::INTERNAL_SERVER_ERROR, "failed to list briefs")
            }
        };
    }

    if let Some(date) = q.date {
        if !domain.owns_date_key(&date) {
            return error_json(
                StatusCode::FORBIDDEN,
                "that date does not belong to this domain",
            );
        }
        return match state.storage.brief_by_date(&date).await {
            Ok(Some(brief)) => ok_json(brief),
            Ok(None) => error_json(StatusCode::NOT_FOUND, "no brief exists for that date"),
            Err(e) => {
                error!(error = ?e, "brief lookup failed");
                error_json(StatusCode::INTERNAL_SERVER_ERROR, "failed to read brief")
            }
        };
    }

    // Latest for the domain.
    match state.storage.all_briefs(10).await {
        Ok(briefs) => match briefs.into_iter().find(|b| domain.owns_date_key(&b.date)) {
            Some(brief) => ok_json(brief),
            None => error_json(StatusCode::NOT_FOUND, "no brief has been generated yet"),
        },
        Err(e) => {
            error!(error = ?e, "latest brief lookup failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "failed to read briefs")
        }
    }
}

#[derive(Deserialize)]
struct DeleteQuery {
    date: Option<String>,
}

async fn delete_brief(State(state): State<AppState>, Query(q): Query<DeleteQuery>) -> Response {
    let Some(date) = q.date else {
        return error_json(StatusCode::BAD_REQUEST, "a date to delete is required");
    };

    let domain = if date.starts_with("battery-") {
        Domain::Battery
    } else {
        Domain::Ai
    };
    if date != domain.date_key(today_utc()) {
        return error_json(
            StatusCode::FORBIDDEN,
            "only the current day's brief can be deleted",
        );
    }

    match state.storage.delete_brief(&date).await {
        Ok(true) => ok_json(json!({ "deleted": date })),
        Ok(false) => error_json(StatusCode::INTERNAL_SERVER_ERROR, "brief deletion failed"),
        Err(e) => {
            error!(error = ?e, "brief deletion errored");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "brief deletion failed")
        }
    }
}

// ------------------------------------------------------------
// Daily generation
// ------------------------------------------------------------

#[derive(Default, Deserialize)]
struct GenerateBody {
    #[serde(default)]
    force: bool,
    #[serde(default)]
    domain: Option<Domain>,
}

/// Scheduler-friendly alias: external cron services often only speak GET.
async fn generate_via_get(state: State<AppState>) -> Response {
    run_generate(state.0, GenerateBody::default()).await
}

async fn generate(State(state): State<AppState>, body: Bytes) -> Response {
    run_generate(state, parse_body(&body).unwrap_or_default()).await
}

async fn run_generate(state: AppState, body: GenerateBody) -> Response {
    let config = DomainConfig::for_domain(body.domain.unwrap_or_default());
    let providers = build_providers(config, &state.search_keys);

    match generate_daily_brief(
        state.storage.as_ref(),
        &state.ai,
        &providers,
        config,
        body.force,
    )
    .await
    {
        Ok(outcome) => {
            let message = if outcome.fresh {
                format!("Successfully generated {} issues.", outcome.report.total_issues)
            } else {
                "A brief for today already exists.".to_string()
            };
            (
                StatusCode::OK,
                Json(json!({ "success": true, "data": outcome.report, "message": message })),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = ?e, "brief generation failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "brief generation failed")
        }
    }
}

// ------------------------------------------------------------
// Background jobs: deep-dive and weekly reports
// ------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobStarted {
    job_id: String,
    message: &'static str,
}

#[derive(Deserialize)]
struct TrendBody {
    issue: Option<IssueItem>,
}

async fn start_trend_report(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(issue) = parse_body::<TrendBody>(&body).and_then(|b| b.issue) else {
        return error_json(StatusCode::BAD_REQUEST, "an issue is required");
    };

    let ai = state.ai.clone();
    let spawned = spawn_job(
        state.storage.clone(),
        JobKind::Trend,
        JobStatus::running(JobState::Generating, 10),
        move |progress| async move {
            let report = generate_trend_report(&ai, &issue).await?;
            progress.write(JobStatus::completed(report)).await;
            Ok(())
        },
    )
    .await;

    match spawned {
        Ok(job_id) => ok_json(JobStarted {
            job_id,
            message: "Trend report generation started",
        }),
        Err(e) => {
            error!(error = ?e, "trend job spawn failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "failed to start the job")
        }
    }
}

#[derive(Deserialize)]
struct StatusQuery {
    #[serde(rename = "jobId")]
    job_id: Option<String>,
}

async fn job_status_response(state: &AppState, kind: JobKind, q: StatusQuery) -> Response {
    let Some(job_id) = q.job_id else {
        return error_json(StatusCode::BAD_REQUEST, "jobId is required");
    };
    match job_status(state.storage.as_ref(), kind, &job_id).await {
        Ok(Some(status)) => ok_json(status),
        Ok(None) => error_json(StatusCode::NOT_FOUND, "job not found"),
        Err(e) => {
            error!(error = ?e, "job status lookup failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "failed to read job status")
        }
    }
}

async fn trend_report_status(
    State(state): State<AppState>,
    Query(q): Query<StatusQuery>,
) -> Response {
    job_status_response(&state, JobKind::Trend, q).await
}

async fn weekly_report_status(
    State(state): State<AppState>,
    Query(q): Query<StatusQuery>,
) -> Response {
    job_status_response(&state, JobKind::Weekly, q).await
}

#[derive(Default, Deserialize)]
struct WeeklyBody {
    #[serde(default)]
    domain: Option<Domain>,
}

async fn start_weekly_report(State(state): State<AppState>, body: Bytes) -> Response {
    let domain = parse_body::<WeeklyBody>(&body)
        .and_then(|b| b.domain)
        .unwrap_or_default();
    let config = DomainConfig::for_domain(domain);
    let storage = state.storage.clone();
    let ai = state.ai.clone();

    let spawned = spawn_job(
        state.storage.clone(),
        JobKind::Weekly,
        JobStatus::running(JobState::Collecting, 5),
        move |progress| async move {
            progress.running(JobState::Collecting, 10, None).await;
            let issues = match storage.recent_issues(WEEKLY_WINDOW_DAYS, domain).await {
                Ok(issues) => issues,
                Err(e) => {
                    warn!(error = ?e, "weekly issue collection failed");
                    Vec::new()
                }
            };
            if issues.is_empty() {
                progress
                    .write(JobStatus::failed("No issues collected in the last 7 days."))
                    .await;
                return Ok(());
            }

            progress
                .running(
                    JobState::Clustering,
                    25,
                    Some(format!("Clustering {} issues into themes...", issues.len())),
                )
                .await;
            let clusters = cluster_issues_by_ai(&ai, &issues, config).await;

            progress
                .running(
                    JobState::Generating,
                    50,
                    Some(format!(
                        "Synthesizing {} clusters for analysis...",
                        clusters.len()
                    )),
                )
                .await;
            let report = generate_weekly_report(&ai, &clusters, &issues, config).await?;

            let mut done = JobStatus::completed(report);
            done.cluster_count = Some(clusters.len());
            done.issue_count = Some(issues.len());
            progress.write(done).await;
            Ok(())
        },
    )
    .await;

    match spawned {
        Ok(job_id) => ok_json(JobStarted {
            job_id,
            message: "Weekly trend report generation started",
        }),
        Err(e) => {
            error!(error = ?e, "weekly job spawn failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "failed to start the job")
        }
    }
}

// ------------------------------------------------------------
// Activity log
// ------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogBody {
    action: Option<LogAction>,
    target_id: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

async fn record_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(body) = parse_body::<LogBody>(&body) else {
        return error_json(StatusCode::BAD_REQUEST, "a JSON body is required");
    };
    let (Some(action), Some(target_id)) = (body.action, body.target_id) else {
        return error_json(StatusCode::BAD_REQUEST, "action and targetId are required");
    };

    let header_value =
        |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);

    let entry = ActivityLog {
        id: Uuid::new_v4().to_string(),
        timestamp: Utc::now().timestamp_millis(),
        action,
        target_id,
        metadata: body.metadata,
        user_agent: header_value("user-agent"),
        ip: header_value("x-forwarded-for"),
    };

    // Fire and forget: a slow log write should not delay the beacon reply.
    let storage = state.storage.clone();
    tokio::spawn(async move {
        if let Err(e) = storage.save_log(&entry).await {
            warn!(error = ?e, "activity log write failed");
        }
    });

    (StatusCode::OK, Json(json!({ "success": true }))).into_response()
}

#[derive(Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

async fn admin_logs(State(state): State<AppState>, Query(q): Query<LogsQuery>) -> Response {
    match state.storage.logs(q.limit.unwrap_or(100)).await {
        Ok(logs) => ok_json(logs),
        Err(e) => {
            error!(error = ?e, "log listing failed");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "failed to read logs")
        }
    }
}

// ------------------------------------------------------------
// Aggregated ("cart") reports, rate-limited per IP
// ------------------------------------------------------------

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartBody {
    #[serde(default)]
    items: Vec<IssueItem>,
    #[serde(default)]
    manual_urls: Vec<String>,
    #[serde(default)]
    manual_texts: Vec<String>,
    #[serde(rename = "type", default)]
    report_type: ReportType,
}

async fn cart_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body: CartBody = parse_body(&body).unwrap_or_default();
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("127.0.0.1")
        .to_string();

    let today = today_utc().format("%Y-%m-%d").to_string();
    let limit_key = usage_limit_key(&today, &ip);

    // Atomic increment; two concurrent requests can never share a slot.
    let used = match state.storage.kv_incr(&limit_key, Some(USAGE_TTL_SECS)).await {
        Ok(used) => used,
        Err(e) => {
            error!(error = ?e, "usage counter failed");
            return error_json(StatusCode::INTERNAL_SERVER_ERROR, "usage check failed");
        }
    };
    if used > DAILY_USAGE_LIMIT {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": format!("Daily report limit reached (max {DAILY_USAGE_LIMIT} per day)."),
                "limitReached": true,
            })),
        )
            .into_response();
    }

    // Admin-facing request trail, newest first, capped at 100.
    let record = json!({
        "id": Uuid::new_v4().to_string(),
        "timestamp": Utc::now().timestamp_millis(),
        "ip": ip,
        "itemCount": body.items.len(),
        "manualUrlCount": body.manual_urls.len(),
        "manualTextCount": body.manual_texts.len(),
        "items": body.items.iter().map(|i| i.headline.clone()).collect::<Vec<_>>(),
    });
    let mut trail: Vec<Value> = kv_get_as(state.storage.as_ref(), "cart_request_list")
        .await
        .ok()
        .flatten()
        .unwrap_or_default();
    trail.insert(0, record);
    trail.truncate(100);
    if let Err(e) = kv_set_as(state.storage.as_ref(), "cart_request_list", &trail, None).await {
        warn!(error = ?e, "cart request trail write failed");
    }

    let period_label = format!("User Selection ({today})");
    match generate_aggregated_report(
        &state.ai,
        &body.items,
        &body.manual_urls,
        &body.manual_texts,
        body.report_type,
        &period_label,
    )
    .await
    {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "report": report,
                "remainingUsage": (DAILY_USAGE_LIMIT - used).max(0),
            })),
        )
            .into_response(),
        Err(e) => {
            error!(error = ?e, "aggregated report generation failed");
            error_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                "report generation failed",
            )
        }
    }
}
