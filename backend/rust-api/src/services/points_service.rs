use anyhow::{Context, Result};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Database;
use redis::aio::ConnectionManager;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::metrics::POINTS_AWARDED_TOTAL;
use crate::models::activity::{Activity, ActivityKind, ListActivitiesQuery, ListActivitiesResponse};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

/// Idempotency markers outlive any plausible client retry horizon.
const IDEMPOTENCY_TTL_SECONDS: u64 = 30 * 24 * 3600;

/// Claims the idempotency key and credits the counter in one atomic step, so
/// a claimed key always implies a credited counter. A repeated call with the
/// same key (including a replay after a lost reply) takes the first branch
/// and reads back the already-credited total.
///
/// KEYS[1] = idempotency key, KEYS[2] = points counter
/// ARGV[1] = delta, ARGV[2] = idempotency TTL seconds
const CLAIM_AND_CREDIT_SCRIPT: &str = r#"
    if redis.call('SET', KEYS[1], 1, 'NX', 'EX', tonumber(ARGV[2])) == false then
        return {0, tonumber(redis.call('GET', KEYS[2])) or 0}
    end
    return {1, redis.call('INCRBY', KEYS[2], tonumber(ARGV[1]))}
"#;

/// Pushed to subscribers whenever an account's points counter changes.
#[derive(Debug, Clone, Serialize)]
pub struct PointsUpdate {
    pub user_id: String,
    pub total_points: i64,
    pub delta: i64,
}

/// Account Store operations: the per-user cumulative points counter (Redis,
/// authoritative) and the durable activity feed (MongoDB).
pub struct PointsService {
    mongo: Database,
    redis: ConnectionManager,
    events: broadcast::Sender<PointsUpdate>,
}

impl PointsService {
    pub fn new(
        mongo: Database,
        redis: ConnectionManager,
        events: broadcast::Sender<PointsUpdate>,
    ) -> Self {
        Self {
            mongo,
            redis,
            events,
        }
    }

    pub async fn get_points(&self, user_id: &str) -> Result<i64> {
        let mut conn = self.redis.clone();
        let total: Option<i64> = redis::cmd("GET")
            .arg(format!("user:points:{}", user_id))
            .query_async(&mut conn)
            .await
            .context("Failed to read points counter")?;
        Ok(total.unwrap_or(0))
    }

    /// Credit points to an account and append the matching activity entry.
    ///
    /// When an idempotency key is supplied, the claim and the credit are a
    /// single atomic script: `Ok` means the delta is on the counter, applied
    /// either by this call or by the earlier call that holds the key, and
    /// `Err` means neither the key nor the counter changed, so the caller may
    /// retry. Returns the resulting total.
    pub async fn add_points(
        &self,
        user_id: &str,
        delta: i64,
        idempotency_key: Option<&str>,
        kind: ActivityKind,
        label: &str,
        category: Option<&str>,
    ) -> Result<i64> {
        let aggressive = RetryConfig::aggressive();

        let (credited, total) = match idempotency_key {
            Some(key) => {
                retry_async_with_config(aggressive.clone(), || async {
                    self.claim_and_credit(user_id, delta, key).await
                })
                .await?
            }
            None => {
                let total = retry_async_with_config(aggressive.clone(), || async {
                    self.increment_counter(user_id, delta).await
                })
                .await?;
                (true, total)
            }
        };

        if !credited {
            tracing::info!(
                user_id = %user_id,
                idempotency_key = ?idempotency_key,
                "Duplicate points award suppressed"
            );
            return Ok(total);
        }

        let activity = Activity {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind,
            label: label.to_string(),
            category: category.map(|c| c.to_string()),
            points: delta,
            created_at: Utc::now(),
        };

        // The counter is already credited at this point; a lost feed entry is
        // logged but must not fail the award.
        if let Err(e) =
            retry_async_with_config(aggressive, || async { self.save_activity(&activity).await })
                .await
        {
            tracing::error!(
                user_id = %user_id,
                activity_id = %activity.id,
                "Failed to record activity entry: {}",
                e
            );
        }

        if delta > 0 {
            POINTS_AWARDED_TOTAL.inc_by(delta as u64);
        }

        // Receivers may come and go; a lagging or absent subscriber is not
        // an error for the award path.
        let _ = self.events.send(PointsUpdate {
            user_id: user_id.to_string(),
            total_points: total,
            delta,
        });

        tracing::info!(user_id = %user_id, delta, total, "Points credited");

        Ok(total)
    }

    /// Receiver for live point changes (all users; callers filter).
    pub fn subscribe(&self) -> broadcast::Receiver<PointsUpdate> {
        self.events.subscribe()
    }

    pub async fn list_activities(
        &self,
        user_id: &str,
        query: &ListActivitiesQuery,
    ) -> Result<ListActivitiesResponse> {
        let sort = match query.sort.as_deref() {
            Some("oldest") => doc! { "createdAt": 1 },
            Some("points-high") => doc! { "points": -1 },
            Some("points-low") => doc! { "points": 1 },
            _ => doc! { "createdAt": -1 },
        };

        let mut filter = doc! { "user_id": user_id };
        if let Some(category) = &query.category {
            filter.insert(
                "category",
                doc! { "$regex": format!("^{}$", regex::escape(category)), "$options": "i" },
            );
        }

        let activities: Vec<Activity> = self
            .mongo
            .collection::<Activity>("activities")
            .find(filter)
            .sort(sort)
            .await
            .context("Failed to query activities")?
            .try_collect()
            .await
            .context("Failed to collect activities")?;

        let total_points = activities.iter().map(|a| a.points).sum();

        Ok(ListActivitiesResponse {
            activities,
            total_points,
        })
    }

    /// Returns `(credited_now, total)`. `credited_now` is false when a prior
    /// award already holds the key; the total then includes that award.
    async fn claim_and_credit(&self, user_id: &str, delta: i64, key: &str) -> Result<(bool, i64)> {
        let mut conn = self.redis.clone();
        let (credited, total): (i64, i64) = redis::Script::new(CLAIM_AND_CREDIT_SCRIPT)
            .key(format!("idempotency:points:{}", key))
            .key(format!("user:points:{}", user_id))
            .arg(delta)
            .arg(IDEMPOTENCY_TTL_SECONDS)
            .invoke_async(&mut conn)
            .await
            .context("Failed to credit points")?;
        Ok((credited == 1, total))
    }

    async fn increment_counter(&self, user_id: &str, delta: i64) -> Result<i64> {
        let mut conn = self.redis.clone();
        let total: i64 = redis::cmd("INCRBY")
            .arg(format!("user:points:{}", user_id))
            .arg(delta)
            .query_async(&mut conn)
            .await
            .context("Failed to update points counter")?;
        Ok(total)
    }

    async fn save_activity(&self, activity: &Activity) -> Result<()> {
        self.mongo
            .collection::<Activity>("activities")
            .insert_one(activity)
            .await
            .context("Failed to save activity")?;
        Ok(())
    }
}
