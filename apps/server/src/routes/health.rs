use actix_web::{HttpResponse, Responder, get};
use serde_json::json;

/// Liveness probe for load balancers
#[get("/")]
pub async fn health_route() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "watchup",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
