use actix_web::{HttpRequest, HttpResponse, get, web};
use serde::Deserialize;
use serde_json::json;
use watchup_service::database::models::IncidentFilter;
use watchup_service::monitoring::{IncidentStatus, Severity};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IncidentQuery {
    status: Option<String>,
    severity: Option<String>,
}

impl IncidentQuery {
    fn filter(&self) -> Result<IncidentFilter, ApiError> {
        let status = match self.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(
                IncidentStatus::from_filter(raw)
                    .ok_or_else(|| ApiError::BadRequest(format!("Unknown incident status: {raw}")))?,
            ),
            None => None,
        };
        let severity = match self.severity.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(
                Severity::from_filter(raw)
                    .ok_or_else(|| ApiError::BadRequest(format!("Unknown severity: {raw}")))?,
            ),
            None => None,
        };
        Ok(IncidentFilter { status, severity })
    }
}

/// Incidents of the caller's project, newest first
#[get("/incidents")]
pub async fn list_incidents_route(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<IncidentQuery>,
) -> Result<HttpResponse, ApiError> {
    let admission = state.admit(&req).await?;
    let filter = query.filter()?;
    let incidents = state.database.list_incidents(&admission.project_id, filter).await?;

    let incidents: Vec<_> = incidents
        .into_iter()
        .map(|incident| {
            let severity = incident.severity();
            json!({
                "id": incident.id,
                "monitorId": incident.monitor_id,
                "status": incident.status,
                "severity": severity,
                "startedAt": incident.started_at,
                "startedReason": incident.started_reason,
                "resolvedAt": incident.resolved_at,
                "resolvedReason": incident.resolved_reason,
                "lastError": incident.last_error,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "projectId": admission.project_id,
        "incidents": incidents,
    })))
}
