use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use thiserror::Error;
use uuid::Uuid;

use super::question_source::QuestionSource;
use crate::metrics::QUIZ_SESSIONS_TOTAL;
use crate::models::quiz::QuizSession;

const SESSION_TTL_SECONDS: u64 = 3600;

/// Lookup failure for a stored session. Distinguishes an expired or unknown
/// id from a backend fault so handlers can map to 404 vs 500 without
/// inspecting error text.
#[derive(Debug, Error)]
pub enum SessionLookupError {
    #[error("quiz session not found")]
    NotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence and orchestration around the quiz session state machine.
///
/// The state machine itself lives in `models::quiz`; this service only loads
/// a session from Redis, lets the handler apply one operation, and writes the
/// whole session back. The HTTP layer serializes calls per session, matching
/// the single-writer ownership the controller expects.
pub struct QuizService {
    redis: ConnectionManager,
}

impl QuizService {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Load a question batch and open a fresh session. Question Source
    /// failures never surface here; the source falls back internally.
    pub async fn start(
        &self,
        source: &dyn QuestionSource,
        topic: &str,
        user_id: Option<String>,
    ) -> Result<QuizSession> {
        let questions = source.load(topic).await;
        let session = QuizSession::new(
            Uuid::new_v4().to_string(),
            user_id,
            topic.to_string(),
            questions,
        );

        self.save(&session).await?;

        QUIZ_SESSIONS_TOTAL.with_label_values(&["created"]).inc();
        tracing::info!(
            session_id = %session.id,
            topic = %topic,
            "Quiz session created"
        );

        Ok(session)
    }

    pub async fn get(&self, session_id: &str) -> Result<QuizSession, SessionLookupError> {
        let mut conn = self.redis.clone();
        let session_json: Option<String> = redis::cmd("GET")
            .arg(format!("quiz:session:{}", session_id))
            .query_async(&mut conn)
            .await
            .context("Failed to read quiz session")?;

        let session_json = session_json.ok_or(SessionLookupError::NotFound)?;

        let session = serde_json::from_str(&session_json)
            .context("Failed to deserialize quiz session")?;
        Ok(session)
    }

    /// Persist the session, refreshing its TTL.
    pub async fn save(&self, session: &QuizSession) -> Result<()> {
        let mut conn = self.redis.clone();
        let session_json =
            serde_json::to_string(session).context("Failed to serialize quiz session")?;

        redis::cmd("SETEX")
            .arg(format!("quiz:session:{}", session.id))
            .arg(SESSION_TTL_SECONDS)
            .arg(session_json)
            .query_async::<()>(&mut conn)
            .await
            .context("Failed to save quiz session")?;

        Ok(())
    }
}
