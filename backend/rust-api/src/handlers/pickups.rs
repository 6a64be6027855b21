use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::{
    middlewares::auth::JwtClaims,
    models::pickup::{SchedulePickupRequest, ACCEPTED_ITEMS, TIME_SLOTS},
    services::{pickup_service::PickupService, AppState},
};

/// GET /api/v1/pickups/options - Available time slots and accepted items
pub async fn pickup_options() -> impl IntoResponse {
    Json(json!({
        "time_slots": TIME_SLOTS,
        "accepted_items": ACCEPTED_ITEMS,
    }))
}

/// POST /api/v1/pickups - Schedule a doorstep pickup
pub async fn schedule_pickup(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Json(req): Json<SchedulePickupRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, format!("Validation error: {}", e)));
    }

    let service = PickupService::new(state.mongo.clone());
    let pickup = service.schedule(&claims.sub, req).await.map_err(|e| {
        tracing::error!("Failed to schedule pickup: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to schedule pickup".to_string(),
        )
    })?;

    Ok((StatusCode::CREATED, Json(pickup)))
}

/// GET /api/v1/pickups - List the user's pickups
pub async fn list_pickups(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = PickupService::new(state.mongo.clone());
    let pickups = service.list(&claims.sub).await.map_err(|e| {
        tracing::error!("Failed to list pickups: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to list pickups".to_string(),
        )
    })?;

    Ok(Json(pickups))
}

/// POST /api/v1/pickups/{id}/cancel - Cancel a scheduled pickup
pub async fn cancel_pickup(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(pickup_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = PickupService::new(state.mongo.clone());

    match service.cancel(&claims.sub, &pickup_id).await {
        Ok(pickup) => Ok(Json(pickup)),
        Err(e) => {
            let message = e.to_string();
            let status = if message.contains("not found") {
                StatusCode::NOT_FOUND
            } else if message.contains("Only scheduled") {
                StatusCode::CONFLICT
            } else {
                tracing::error!("Failed to cancel pickup: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Err((status, message))
        }
    }
}
