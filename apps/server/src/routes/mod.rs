use actix_web::web;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

mod health;
mod incidents;
mod monitors;
mod sdk;


pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health::health_route).service(sdk::sdk_auth_route).service(
        web::scope("/v1")
            .service(monitors::create_monitor_route)
            .service(monitors::list_monitors_route)
            .service(monitors::delete_monitor_route)
            .service(monitors::monitor_heartbeats_route)
            .service(incidents::list_incidents_route),
    );
}

/// Decode an optional JSON body. An empty body is the default request, a
/// malformed one is a 400 carrying the parser's message.
fn json_body<T: DeserializeOwned + Default>(bytes: &[u8]) -> Result<T, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}
