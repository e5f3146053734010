//! Contact DTOs

use chrono::{DateTime, Utc};
use dialer_core::models::{Contact, ContactStatus};
use dialer_core::AppError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContactCreateRequest {
    #[validate(length(min = 2, max = 32, message = "phone number is required"))]
    pub phone_number: String,

    #[validate(length(max = 200))]
    pub name: Option<String>,

    #[validate(length(max = 100))]
    pub campaign_tag: Option<String>,

    #[serde(default)]
    #[validate(length(max = 20))]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkTagRequest {
    #[validate(length(min = 1, max = 1000))]
    pub contact_ids: Vec<Uuid>,

    #[validate(length(min = 1, max = 20))]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusRequest {
    #[validate(length(min = 1, max = 1000))]
    pub contact_ids: Vec<Uuid>,

    pub status: String,
}

impl BulkStatusRequest {
    pub fn parsed_status(&self) -> Result<ContactStatus, AppError> {
        ContactStatus::from_str(&self.status)
            .ok_or_else(|| AppError::Validation(format!("unknown contact status '{}'", self.status)))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResponse {
    pub id: Uuid,
    pub phone_number: String,
    pub name: Option<String>,
    pub campaign_tag: Option<String>,
    pub tags: Vec<String>,
    pub status: ContactStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Contact> for ContactResponse {
    fn from(contact: Contact) -> Self {
        Self {
            id: contact.id,
            phone_number: contact.phone_number,
            name: contact.name,
            campaign_tag: contact.campaign_tag,
            tags: contact.tags.into_iter().collect(),
            status: contact.status,
            created_at: contact.created_at,
            updated_at: contact.updated_at,
        }
    }
}

/// Count of contacts touched by a bulk operation
#[derive(Debug, Clone, Serialize)]
pub struct BulkResult {
    pub updated: u64,
}
