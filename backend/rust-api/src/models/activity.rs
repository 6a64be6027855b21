use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::bson_datetime_as_chrono;

/// One entry in a user's recycling activity feed, stored in the MongoDB
/// "activities" collection. Points here are the delta credited by this
/// entry; the running total lives in the account points counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub kind: ActivityKind,
    /// Human-readable label, e.g. "Recycled Laptop" or "Quiz reward".
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub points: i64,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Recycled,
    QuizReward,
    PickupScheduled,
}

#[derive(Debug, Deserialize)]
pub struct ListActivitiesQuery {
    /// Filter to a single category (case-insensitive).
    pub category: Option<String>,
    /// One of "newest" (default), "oldest", "points-high", "points-low".
    pub sort: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListActivitiesResponse {
    pub activities: Vec<Activity>,
    pub total_points: i64,
}
