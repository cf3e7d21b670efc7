use actix_web::{HttpResponse, ResponseError, post, web};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::json_body;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkAuthRequest {
    project_id: Option<String>,
    api_key: Option<String>,
}

/// Credential check for SDK clients. Does not count against the rate limit.
#[post("/sdk/auth")]
pub async fn sdk_auth_route(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> HttpResponse {
    let body: SdkAuthRequest = match json_body(&body) {
        Ok(body) => body,
        Err(e) => {
            return HttpResponse::build(e.status_code()).json(json!({ "ok": false, "error": e.public_message() }));
        }
    };
    let project_id = body.project_id.as_deref().map(str::trim).filter(|v| !v.is_empty());
    let api_key = body.api_key.as_deref().map(str::trim).filter(|v| !v.is_empty());

    if project_id.is_none() || api_key.is_none() {
        return HttpResponse::BadRequest().json(json!({ "ok": false, "error": "Missing projectId or apiKey" }));
    }

    match state.gate.verify(project_id, api_key, Utc::now()).await {
        Ok(admission) => HttpResponse::Ok().json(json!({
            "ok": true,
            "userId": admission.user_id,
            "projectId": admission.project_id,
            "isFree": admission.plan.is_free(),
            "plan": admission.plan,
        })),
        Err(e) => {
            let error = ApiError::from(e);
            HttpResponse::build(error.status_code()).json(json!({ "ok": false, "error": error.public_message() }))
        }
    }
}
