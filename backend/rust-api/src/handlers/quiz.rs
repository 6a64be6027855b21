use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    metrics::{QUIZ_ANSWERS_TOTAL, QUIZ_SESSIONS_TOTAL},
    middlewares::auth::JwtClaims,
    models::{
        activity::ActivityKind,
        quiz::{QuizError, QuizSessionView},
    },
    services::{
        points_service::PointsService,
        question_source::GeminiQuestionSource,
        quiz_service::{QuizService, SessionLookupError},
        AppState,
    },
};

const DEFAULT_TOPIC: &str = "e-waste recycling";

#[derive(Debug, Deserialize)]
pub struct StartQuizRequest {
    pub topic: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub index: usize,
    pub option: String,
}

/// Answer feedback: correctness plus the per-question reveal.
#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub correct: bool,
    pub correct_option: String,
    pub explanation: String,
    pub session: QuizSessionView,
}

#[derive(Debug, Serialize)]
pub struct CommitPointsResponse {
    pub awarded: bool,
    pub earned_points: u32,
    pub session: QuizSessionView,
}

fn map_quiz_error(e: QuizError) -> (StatusCode, String) {
    let status = match e {
        QuizError::InvalidIndex(_) => StatusCode::BAD_REQUEST,
        QuizError::InvalidOption => StatusCode::UNPROCESSABLE_ENTITY,
        QuizError::AlreadyAnswered(_) | QuizError::NotAnswered | QuizError::AtStart => {
            StatusCode::CONFLICT
        }
    };
    (status, e.to_string())
}

fn map_lookup_error(e: SessionLookupError) -> (StatusCode, String) {
    match e {
        SessionLookupError::NotFound => {
            (StatusCode::NOT_FOUND, "Quiz session not found".to_string())
        }
        SessionLookupError::Backend(e) => {
            tracing::error!("Quiz session lookup failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

/// POST /api/v1/quiz - Start a new quiz session
pub async fn start_quiz(
    State(state): State<Arc<AppState>>,
    claims: Option<Extension<JwtClaims>>,
    Json(req): Json<StartQuizRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let topic = req
        .topic
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TOPIC.to_string());
    let user_id = claims.map(|Extension(c)| c.sub);

    let service = QuizService::new(state.redis.clone());
    let source = GeminiQuestionSource::new(state.gemini.clone());

    let session = service
        .start(&source, &topic, user_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to start quiz session: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to start quiz".to_string(),
            )
        })?;

    Ok((StatusCode::CREATED, Json(QuizSessionView::from(&session))))
}

/// GET /api/v1/quiz/{id} - Fetch the current session state
pub async fn get_quiz(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = QuizService::new(state.redis.clone());
    let session = service.get(&session_id).await.map_err(map_lookup_error)?;

    Ok(Json(QuizSessionView::from(&session)))
}

/// POST /api/v1/quiz/{id}/answers - Answer a question
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<AnswerRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = QuizService::new(state.redis.clone());
    let mut session = service.get(&session_id).await.map_err(map_lookup_error)?;

    let correct = session
        .select_answer(req.index, &req.option)
        .map_err(map_quiz_error)?;

    service.save(&session).await.map_err(|e| {
        tracing::error!("Failed to save quiz session: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to save answer".to_string(),
        )
    })?;

    QUIZ_ANSWERS_TOTAL
        .with_label_values(&[if correct { "true" } else { "false" }])
        .inc();

    let question = &session.questions()[req.index];
    Ok(Json(AnswerResponse {
        correct,
        correct_option: question.correct_option.clone(),
        explanation: question.explanation.clone(),
        session: QuizSessionView::from(&session),
    }))
}

/// POST /api/v1/quiz/{id}/advance - Move to the next question
pub async fn advance(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = QuizService::new(state.redis.clone());
    let mut session = service.get(&session_id).await.map_err(map_lookup_error)?;

    let completed = session.advance().map_err(map_quiz_error)?;

    service.save(&session).await.map_err(|e| {
        tracing::error!("Failed to save quiz session: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to save progress".to_string(),
        )
    })?;

    if completed {
        QUIZ_SESSIONS_TOTAL.with_label_values(&["completed"]).inc();
        tracing::info!(
            session_id = %session_id,
            score = session.score(),
            "Quiz session completed"
        );
    }

    Ok(Json(QuizSessionView::from(&session)))
}

/// POST /api/v1/quiz/{id}/retreat - Move back to the previous question
pub async fn retreat(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = QuizService::new(state.redis.clone());
    let mut session = service.get(&session_id).await.map_err(map_lookup_error)?;

    session.retreat().map_err(map_quiz_error)?;

    service.save(&session).await.map_err(|e| {
        tracing::error!("Failed to save quiz session: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to save progress".to_string(),
        )
    })?;

    Ok(Json(QuizSessionView::from(&session)))
}

/// POST /api/v1/quiz/{id}/points - Commit the session's reward points
///
/// Requires authentication. Safe to call repeatedly; points are credited at
/// most once per session and the account store rejects duplicate awards via
/// the session-scoped idempotency key.
pub async fn commit_points(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = QuizService::new(state.redis.clone());
    let mut session = service.get(&session_id).await.map_err(map_lookup_error)?;

    // Bind the session to the caller on first commit if it was started
    // anonymously, and refuse cross-user commits.
    match &session.user_id {
        Some(owner) if owner != &claims.sub => {
            return Err((
                StatusCode::FORBIDDEN,
                "Quiz session belongs to another user".to_string(),
            ));
        }
        Some(_) => {}
        None => session.user_id = Some(claims.sub.clone()),
    }

    let points_service = PointsService::new(
        state.mongo.clone(),
        state.redis.clone(),
        state.points_events.clone(),
    );

    let user_id = claims.sub.clone();
    let idempotency_key = format!("quiz:{}", session.id);
    let label = format!("Quiz reward: {}", session.topic);

    let awarded = session
        .commit_points_if_eligible(true, |points| async move {
            points_service
                .add_points(
                    &user_id,
                    points as i64,
                    Some(&idempotency_key),
                    ActivityKind::QuizReward,
                    &label,
                    Some("quiz"),
                )
                .await
                .map(|_| ())
        })
        .await
        .map_err(|e| {
            tracing::error!("Failed to credit quiz points: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to credit points".to_string(),
            )
        })?;

    service.save(&session).await.map_err(|e| {
        tracing::error!("Failed to save quiz session: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to save session".to_string(),
        )
    })?;

    Ok(Json(CommitPointsResponse {
        awarded,
        earned_points: session.earned_points(),
        session: QuizSessionView::from(&session),
    }))
}

/// POST /api/v1/quiz/{id}/restart - Retake the same questions
pub async fn restart(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = QuizService::new(state.redis.clone());
    let mut session = service.get(&session_id).await.map_err(map_lookup_error)?;

    session.restart();

    service.save(&session).await.map_err(|e| {
        tracing::error!("Failed to save quiz session: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to restart quiz".to_string(),
        )
    })?;

    QUIZ_SESSIONS_TOTAL.with_label_values(&["restarted"]).inc();

    Ok(Json(QuizSessionView::from(&session)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_errors_map_to_the_documented_statuses() {
        assert_eq!(
            map_quiz_error(QuizError::AlreadyAnswered(2)).0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            map_quiz_error(QuizError::NotAnswered).0,
            StatusCode::CONFLICT
        );
        assert_eq!(map_quiz_error(QuizError::AtStart).0, StatusCode::CONFLICT);
        assert_eq!(
            map_quiz_error(QuizError::InvalidOption).0,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            map_quiz_error(QuizError::InvalidIndex(9)).0,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn quiz_error_responses_carry_the_domain_message() {
        let (_, message) = map_quiz_error(QuizError::AlreadyAnswered(2));
        assert_eq!(message, QuizError::AlreadyAnswered(2).to_string());
    }

    #[test]
    fn missing_sessions_map_to_not_found() {
        let (status, message) = map_lookup_error(SessionLookupError::NotFound);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(message, "Quiz session not found");
    }

    #[test]
    fn backend_lookup_failures_map_to_internal_error_without_leaking_detail() {
        let (status, message) =
            map_lookup_error(SessionLookupError::Backend(anyhow::anyhow!("redis down")));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!message.contains("redis"));
    }
}
