//! Inbound requests handled by the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One outbound call request from an upstream producer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    /// Destination phone number; normalized to E.164 before use
    pub destination: String,

    #[serde(default)]
    pub message: Option<String>,

    /// Absolute dial time; ignored when not in the future
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub campaign_tag: Option<String>,
}

impl CallRequest {
    pub fn new(destination: impl Into<String>, message: Option<String>) -> Self {
        Self {
            destination: destination.into(),
            message,
            scheduled_at: None,
            campaign_tag: None,
        }
    }
}

/// Provider status callback after transport decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub provider_call_id: String,
    /// Raw provider status code
    pub status: String,
    pub duration_seconds: Option<i32>,
    pub recording_url: Option<String>,
    pub recording_duration_seconds: Option<i32>,
}

impl StatusUpdate {
    pub fn new(
        provider_call_id: impl Into<String>,
        status: impl Into<String>,
        duration_seconds: Option<i32>,
    ) -> Self {
        Self {
            provider_call_id: provider_call_id.into(),
            status: status.into(),
            duration_seconds,
            recording_url: None,
            recording_duration_seconds: None,
        }
    }
}
