use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::user::bson_datetime_as_chrono;

/// Pickup time slots offered by the doorstep service.
pub const TIME_SLOTS: [&str; 4] = [
    "09:00 - 11:00",
    "11:00 - 13:00",
    "13:00 - 15:00",
    "15:00 - 17:00",
];

/// Item categories the collection service accepts at the doorstep.
pub const ACCEPTED_ITEMS: [&str; 8] = [
    "Computers & Laptops",
    "Monitors & TVs",
    "Printers & Scanners",
    "Mobile Phones & Tablets",
    "Keyboards & Peripherals",
    "Cables & Wires",
    "Batteries",
    "Small Household Electronics",
];

/// Doorstep pickup request, stored in the MongoDB "pickup_requests"
/// collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupRequest {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub zip_code: String,
    pub date: NaiveDate,
    pub time_slot: String,
    pub items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
    pub status: PickupStatus,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickupStatus {
    Scheduled,
    Completed,
    Cancelled,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SchedulePickupRequest {
    #[validate(length(min = 1, max = 100, message = "contact name is required"))]
    pub contact_name: String,
    #[validate(email(message = "invalid email address"))]
    pub email: String,
    #[validate(length(min = 5, max = 30, message = "phone number is required"))]
    pub phone: String,
    #[validate(length(min = 1, max = 200, message = "address is required"))]
    pub address: String,
    #[validate(length(min = 1, max = 100, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 3, max = 12, message = "zip code is required"))]
    pub zip_code: String,
    pub date: NaiveDate,
    #[validate(custom(function = validate_time_slot))]
    pub time_slot: String,
    #[validate(custom(function = validate_items))]
    pub items: Vec<String>,
    #[validate(length(max = 500, message = "special instructions too long"))]
    pub special_instructions: Option<String>,
}

fn validate_time_slot(slot: &str) -> Result<(), ValidationError> {
    if TIME_SLOTS.contains(&slot) {
        Ok(())
    } else {
        Err(ValidationError::new("unknown_time_slot"))
    }
}

fn validate_items(items: &[String]) -> Result<(), ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::new("no_items_selected"));
    }
    if items.iter().any(|i| !ACCEPTED_ITEMS.contains(&i.as_str())) {
        return Err(ValidationError::new("unaccepted_item"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SchedulePickupRequest {
        SchedulePickupRequest {
            contact_name: "Demo User".to_string(),
            email: "demo@example.com".to_string(),
            phone: "+1 555 123 4567".to_string(),
            address: "123 Green Street".to_string(),
            city: "Eco City".to_string(),
            zip_code: "12345".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 9, 15).unwrap(),
            time_slot: TIME_SLOTS[0].to_string(),
            items: vec![ACCEPTED_ITEMS[0].to_string()],
            special_instructions: None,
        }
    }

    #[test]
    fn valid_request_passes_validation() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn unknown_time_slot_is_rejected() {
        let mut req = request();
        req.time_slot = "02:00 - 04:00".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn empty_item_list_is_rejected() {
        let mut req = request();
        req.items.clear();
        assert!(req.validate().is_err());
    }

    #[test]
    fn unaccepted_item_is_rejected() {
        let mut req = request();
        req.items.push("Refrigerators".to_string());
        assert!(req.validate().is_err());
    }
}
