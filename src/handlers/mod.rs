pub mod dashboard;
pub mod health;
pub mod movements;
pub mod products;

use std::sync::Arc;

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::services::{
    dashboard::DashboardService, movements::MovementService, products::ProductService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub movements: Arc<MovementService>,
    pub products: Arc<ProductService>,
    pub dashboard: Arc<DashboardService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        let event_sender = Arc::new(event_sender);

        Self {
            movements: Arc::new(MovementService::new(db_pool.clone(), event_sender.clone())),
            products: Arc::new(ProductService::new(db_pool.clone(), event_sender)),
            dashboard: Arc::new(DashboardService::new(db_pool)),
        }
    }
}

/// The acting user, as placed in `X-User-Id` by the fronting authentication
/// gateway. Authentication itself is not this service's concern.
pub(crate) fn actor_id(headers: &HeaderMap) -> Result<Uuid, ServiceError> {
    let raw = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ServiceError::ValidationError("Missing X-User-Id header".to_string())
        })?;

    Uuid::parse_str(raw)
        .map_err(|_| ServiceError::ValidationError("X-User-Id header must be a UUID".to_string()))
}
