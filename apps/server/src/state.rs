use std::sync::Arc;

use actix_web::HttpRequest;
use chrono::Utc;
use watchup_service::config::GateConfig;
use watchup_service::database::Database;
use watchup_service::gate::{Admission, FixedWindowLimiter, IngressGate};
use watchup_service::registry::MonitorRegistry;

use crate::error::ApiError;

pub const PROJECT_HEADER: &str = "x-project-id";
pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared handler state
pub struct AppState {
    pub database: Arc<dyn Database>,
    pub gate: IngressGate,
    pub registry: MonitorRegistry,
}

impl AppState {
    pub fn new(database: Arc<dyn Database>, gate: &GateConfig) -> Self {
        Self {
            gate: IngressGate::new(
                database.clone(),
                FixedWindowLimiter::in_memory(gate.window_seconds, gate.limit),
            ),
            registry: MonitorRegistry::new(database.clone()),
            database,
        }
    }

    /// Run the ingress gate on the credential headers of `req`
    pub async fn admit(&self, req: &HttpRequest) -> Result<Admission, ApiError> {
        let header = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok());
        Ok(self.gate.admit(header(PROJECT_HEADER), header(API_KEY_HEADER), Utc::now()).await?)
    }
}
