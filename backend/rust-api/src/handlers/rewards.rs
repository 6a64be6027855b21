use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Extension, Json,
};
use futures::stream::{self, Stream};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::{
    metrics::SSE_CONNECTIONS_ACTIVE,
    middlewares::auth::JwtClaims,
    models::activity::ListActivitiesQuery,
    services::{
        points_service::{PointsService, PointsUpdate},
        AppState,
    },
};

fn points_service(state: &AppState) -> PointsService {
    PointsService::new(
        state.mongo.clone(),
        state.redis.clone(),
        state.points_events.clone(),
    )
}

/// GET /api/v1/rewards/points - Current points balance
pub async fn get_points(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let total = points_service(&state)
        .get_points(&claims.sub)
        .await
        .map_err(|e| {
            tracing::error!("Failed to read points: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read points".to_string(),
            )
        })?;

    Ok(Json(json!({ "total_points": total })))
}

/// SSE endpoint for live points updates
/// GET /api/v1/rewards/stream
pub async fn points_stream(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> impl IntoResponse {
    tracing::info!(user_id = %claims.sub, "Client connected to points stream");

    let receiver = state.points_events.subscribe();
    let stream = create_points_stream(receiver, claims.sub);

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Decrements the connection gauge when the stream is dropped, whether the
/// client disconnected or the channel closed.
struct ConnectionGuard;

impl ConnectionGuard {
    fn new() -> Self {
        SSE_CONNECTIONS_ACTIVE.inc();
        Self
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        SSE_CONNECTIONS_ACTIVE.dec();
    }
}

/// Stream of points-update events for one user, filtered from the shared
/// broadcast channel. Lagged receivers skip ahead instead of disconnecting.
fn create_points_stream(
    receiver: broadcast::Receiver<PointsUpdate>,
    user_id: String,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let guard = ConnectionGuard::new();
    stream::unfold(
        (receiver, user_id, guard),
        move |(mut rx, uid, guard)| async move {
            loop {
                match rx.recv().await {
                    Ok(update) => {
                        if update.user_id != uid {
                            continue;
                        }
                        let data = match serde_json::to_string(&update) {
                            Ok(data) => data,
                            Err(_) => continue,
                        };
                        let event = Event::default().event("points-update").data(data);
                        return Some((Ok(event), (rx, uid, guard)));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(user_id = %uid, skipped, "Points stream lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        },
    )
}

/// GET /api/v1/activity - List the user's activity feed
pub async fn list_activities(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Query(query): Query<ListActivitiesQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let response = points_service(&state)
        .list_activities(&claims.sub, &query)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list activities: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list activities".to_string(),
            )
        })?;

    Ok(Json(response))
}
