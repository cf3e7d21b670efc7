use actix_web::{HttpRequest, HttpResponse, delete, get, post, web};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;
use watchup_service::registry::CreateMonitor;

use super::json_body;
use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_HEARTBEAT_LIMIT: usize = 50;
const MAX_HEARTBEAT_LIMIT: usize = 500;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMonitorBody {
    url: Option<String>,
    name: Option<String>,
    interval_seconds: Option<Value>,
    timeout_ms: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatQuery {
    limit: Option<usize>,
}

/// Read an integer field leniently: numbers (fractions truncated) and numeric
/// strings are accepted, range is left to clamping
fn integer_field(field: &str, value: Option<Value>) -> Result<Option<i64>, ApiError> {
    let invalid = || ApiError::BadRequest(format!("{field} must be an integer"));
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(n) => Ok(Some(n)),
            None => n.as_f64().map(|f| Some(f as i64)).ok_or_else(invalid),
        },
        Some(Value::String(s)) => s.trim().parse::<i64>().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

fn parse_monitor_id(raw: &str) -> Result<Uuid, ApiError> {
    // Ids that cannot exist are reported the same as unknown ones.
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound)
}

/// Register a monitor. 201 when created, 200 when an active one already existed.
#[post("/monitors")]
pub async fn create_monitor_route(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let admission = state.admit(&req).await?;
    let body: CreateMonitorBody = json_body(&body)?;

    let request = CreateMonitor {
        url: body.url.unwrap_or_default(),
        name: body.name,
        interval_seconds: integer_field("intervalSeconds", body.interval_seconds)?,
        timeout_ms: integer_field("timeoutMs", body.timeout_ms)?,
    };
    let registered = state.registry.create_monitor(&admission.project_id, request, Utc::now()).await?;

    let mut response = if registered.created { HttpResponse::Created() } else { HttpResponse::Ok() };
    Ok(response.json(registered.monitor))
}

#[get("/monitors")]
pub async fn list_monitors_route(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let admission = state.admit(&req).await?;
    let monitors = state.registry.list_monitors(&admission.project_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "projectId": admission.project_id,
        "monitors": monitors,
    })))
}

#[delete("/monitors/{id}")]
pub async fn delete_monitor_route(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let admission = state.admit(&req).await?;
    let id = parse_monitor_id(&path)?;

    if !state.registry.delete_monitor(id, &admission.project_id, Utc::now()).await? {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::Ok().json(json!({ "ok": true })))
}

/// Recent heartbeats plus a 24h aggregate for one monitor of the caller's project
#[get("/monitors/{id}/heartbeats")]
pub async fn monitor_heartbeats_route(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<HeartbeatQuery>,
) -> Result<HttpResponse, ApiError> {
    let admission = state.admit(&req).await?;
    let id = parse_monitor_id(&path)?;

    let monitor = state
        .database
        .get_monitor(id)
        .await?
        .filter(|m| m.project_id == admission.project_id && m.deleted_at.is_none())
        .ok_or(ApiError::NotFound)?;

    let limit = query.limit.unwrap_or(DEFAULT_HEARTBEAT_LIMIT).clamp(1, MAX_HEARTBEAT_LIMIT);
    let heartbeats = state.database.recent_heartbeats(monitor.id, limit).await?;
    let stats = state.database.heartbeat_stats(monitor.id, Utc::now() - Duration::hours(24)).await?;

    Ok(HttpResponse::Ok().json(json!({
        "monitor": monitor,
        "heartbeats": heartbeats,
        "stats": {
            "total": stats.total,
            "up": stats.up,
            "avgLatencyMs": stats.avg_latency_ms,
            "uptimePercent": stats.uptime_percent(),
        },
    })))
}
