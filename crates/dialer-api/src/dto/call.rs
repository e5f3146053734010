//! Call DTOs
//!
//! Request and response types for batch enqueueing and call reporting.

use super::common::PaginationParams;
use chrono::{DateTime, Utc};
use dialer_core::models::{CallRecord, CallRequest, CallStatus};
use dialer_core::AppError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// One call in a batch
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CallRequestDto {
    /// Destination phone number, E.164 after normalization
    #[validate(length(min = 2, max = 32, message = "destination is required"))]
    pub destination: String,

    /// Text spoken to the callee
    #[validate(length(max = 2000))]
    pub message: Option<String>,

    pub scheduled_at: Option<DateTime<Utc>>,

    #[validate(length(max = 100))]
    pub campaign_tag: Option<String>,
}

impl From<CallRequestDto> for CallRequest {
    fn from(dto: CallRequestDto) -> Self {
        CallRequest {
            destination: dto.destination,
            message: dto.message,
            scheduled_at: dto.scheduled_at,
            campaign_tag: dto.campaign_tag,
        }
    }
}

/// Batch enqueue request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BatchEnqueueRequest {
    #[validate(length(min = 1, max = 1000, message = "between 1 and 1000 calls"), nested)]
    pub calls: Vec<CallRequestDto>,

    /// Seconds between consecutive calls; defaults to the configured stagger
    #[validate(range(max = 3600))]
    pub inter_call_delay_secs: Option<u64>,
}

/// Call listing filter
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CallListParams {
    #[serde(flatten)]
    #[validate(nested)]
    pub pagination: PaginationParams,

    pub status: Option<String>,
}

impl CallListParams {
    /// Parsed status filter; empty means no filter
    pub fn status_filter(&self) -> Result<Option<CallStatus>, AppError> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => CallStatus::from_str(raw)
                .map(Some)
                .ok_or_else(|| AppError::Validation(format!("unknown call status '{}'", raw))),
        }
    }
}

/// Call record response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecordResponse {
    pub id: Uuid,
    pub contact_id: Uuid,
    pub destination: String,
    pub campaign_tag: Option<String>,
    pub message: Option<String>,
    pub status: CallStatus,
    pub attempts: i32,
    pub duration_seconds: Option<i32>,
    pub cost: Option<Decimal>,
    pub provider_call_id: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error_detail: Option<String>,
    pub recording_url: Option<String>,
    pub recording_duration_seconds: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CallRecord> for CallRecordResponse {
    fn from(record: CallRecord) -> Self {
        let (recording_url, recording_duration_seconds) = match record.recording {
            Some(rec) => (Some(rec.url), rec.duration_seconds),
            None => (None, None),
        };

        Self {
            id: record.id,
            contact_id: record.contact_id,
            destination: record.destination,
            campaign_tag: record.campaign_tag,
            message: record.message,
            status: record.status,
            attempts: record.attempts,
            duration_seconds: record.duration_seconds,
            cost: record.cost,
            provider_call_id: record.provider_call_id,
            scheduled_at: record.scheduled_at,
            started_at: record.started_at,
            ended_at: record.ended_at,
            error_detail: record.error_detail,
            recording_url,
            recording_duration_seconds,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Result of a manual reconcile
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<CallRecordResponse>,
}
