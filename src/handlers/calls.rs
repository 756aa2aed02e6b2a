use crate::{
    error::{AppError, AppResult},
    state::AppState,
};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// List every live call leg with its relay counters.
pub async fn list_calls(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "active_calls": state.registry.active_call_count(),
        "max_concurrent_calls": state.get_config().performance.max_concurrent_calls,
        "calls": state.registry.summaries()
    })))
}

/// Inspect one call leg by its connection id.
pub async fn get_call(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let connection_id = path.into_inner();

    let session = state
        .registry
        .get(&connection_id)
        .ok_or_else(|| AppError::NotFound(format!("No active call '{}'", connection_id)))?;

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "call": session.summary()
    })))
}
