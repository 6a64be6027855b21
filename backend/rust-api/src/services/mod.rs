use crate::config::Config;
use mongodb::{Client as MongoClient, Database};
use redis::aio::ConnectionManager;
use tokio::sync::broadcast;

use self::gemini::GeminiClient;
use self::points_service::PointsUpdate;

pub struct AppState {
    pub config: Config,
    pub mongo: Database,
    pub redis: ConnectionManager,
    /// Shared handle to the generative-language API. Conversation state is
    /// never stored here; services own their own histories.
    pub gemini: GeminiClient,
    /// In-process fan-out of account point changes, consumed by the SSE
    /// rewards stream.
    pub points_events: broadcast::Sender<PointsUpdate>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        tracing::info!("Redis ConnectionManager created, testing with PING...");

        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        let gemini = GeminiClient::new(
            config.gemini_api_url.clone(),
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
        );

        let (points_events, _) = broadcast::channel(64);

        Ok(Self {
            config,
            mongo,
            redis,
            gemini,
            points_events,
        })
    }
}

pub mod auth_service;
pub mod chat_service;
pub mod gemini;
pub mod pickup_service;
pub mod points_service;
pub mod question_source;
pub mod quiz_service;
