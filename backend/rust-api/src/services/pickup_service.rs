use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Database;
use uuid::Uuid;

use crate::metrics::PICKUPS_SCHEDULED_TOTAL;
use crate::models::pickup::{PickupRequest, PickupStatus, SchedulePickupRequest};

/// Doorstep collection scheduling, backed by the MongoDB
/// "pickup_requests" collection.
pub struct PickupService {
    mongo: Database,
}

impl PickupService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    pub async fn schedule(
        &self,
        user_id: &str,
        req: SchedulePickupRequest,
    ) -> Result<PickupRequest> {
        let pickup = PickupRequest {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            contact_name: req.contact_name,
            email: req.email,
            phone: req.phone,
            address: req.address,
            city: req.city,
            zip_code: req.zip_code,
            date: req.date,
            time_slot: req.time_slot,
            items: req.items,
            special_instructions: req.special_instructions,
            status: PickupStatus::Scheduled,
            created_at: Utc::now(),
        };

        self.mongo
            .collection::<PickupRequest>("pickup_requests")
            .insert_one(&pickup)
            .await
            .context("Failed to insert pickup request")?;

        PICKUPS_SCHEDULED_TOTAL.inc();
        tracing::info!(
            pickup_id = %pickup.id,
            user_id = %user_id,
            date = %pickup.date,
            "Pickup scheduled"
        );

        Ok(pickup)
    }

    /// List a user's pickup requests, newest first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<PickupRequest>> {
        self.mongo
            .collection::<PickupRequest>("pickup_requests")
            .find(doc! { "user_id": user_id })
            .sort(doc! { "createdAt": -1 })
            .await
            .context("Failed to query pickup requests")?
            .try_collect()
            .await
            .context("Failed to collect pickup requests")
    }

    /// Cancel a pickup the user owns. Only scheduled pickups can be
    /// cancelled.
    pub async fn cancel(&self, user_id: &str, pickup_id: &str) -> Result<PickupRequest> {
        let collection = self.mongo.collection::<PickupRequest>("pickup_requests");

        let pickup = collection
            .find_one(doc! { "_id": pickup_id, "user_id": user_id })
            .await
            .context("Failed to query pickup request")?
            .ok_or_else(|| anyhow!("Pickup request not found"))?;

        if pickup.status != PickupStatus::Scheduled {
            return Err(anyhow!("Only scheduled pickups can be cancelled"));
        }

        collection
            .update_one(
                doc! { "_id": pickup_id },
                doc! { "$set": { "status": "cancelled" } },
            )
            .await
            .context("Failed to cancel pickup request")?;

        tracing::info!(pickup_id = %pickup_id, user_id = %user_id, "Pickup cancelled");

        Ok(PickupRequest {
            status: PickupStatus::Cancelled,
            ..pickup
        })
    }
}
