//! HTTP surface of the server
//!
//! - `GET /health`: liveness with the running version
//! - `POST /hooks/entity-mutations`: the platform reports a saved router,
//!   device, subscription or payment; runs the cache invalidation hook
//! - `GET /ws/map-updates`: live map updates (when realtime is enabled)

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use ispsync_realtime::{CacheInvalidationHook, MonitoredEntity, TenantEventBus, ws};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub hook: CacheInvalidationHook,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub fn build_router(state: AppState, bus: Arc<TenantEventBus>, realtime_enabled: bool) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/hooks/entity-mutations", post(entity_mutation))
        .with_state(state);

    if realtime_enabled {
        router = router.merge(ws::routes(bus));
    }

    router.layer(TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Always 202: the hook logs and swallows its own failures
async fn entity_mutation(
    State(state): State<AppState>,
    Json(entity): Json<MonitoredEntity>,
) -> StatusCode {
    state.hook.on_mutation(&entity).await;
    StatusCode::ACCEPTED
}
