//! Provider-facing request and response types

use super::call::CallStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status vocabulary of the telephony provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderStatus {
    Queued,
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Failed,
    Busy,
    NoAnswer,
    Canceled,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderStatus::Queued => "queued",
            ProviderStatus::Initiated => "initiated",
            ProviderStatus::Ringing => "ringing",
            ProviderStatus::InProgress => "in-progress",
            ProviderStatus::Completed => "completed",
            ProviderStatus::Failed => "failed",
            ProviderStatus::Busy => "busy",
            ProviderStatus::NoAnswer => "no-answer",
            ProviderStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

impl ProviderStatus {
    /// Parse a provider status code; `_` and `-` are interchangeable
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().replace('_', "-").as_str() {
            "queued" => Some(ProviderStatus::Queued),
            "initiated" => Some(ProviderStatus::Initiated),
            "ringing" => Some(ProviderStatus::Ringing),
            "in-progress" | "answered" => Some(ProviderStatus::InProgress),
            "completed" => Some(ProviderStatus::Completed),
            "failed" => Some(ProviderStatus::Failed),
            "busy" => Some(ProviderStatus::Busy),
            "no-answer" => Some(ProviderStatus::NoAnswer),
            "canceled" | "cancelled" => Some(ProviderStatus::Canceled),
            _ => None,
        }
    }

    /// Local status this provider status maps onto
    pub fn local_status(&self) -> CallStatus {
        match self {
            ProviderStatus::Queued | ProviderStatus::Initiated | ProviderStatus::Ringing => {
                CallStatus::Queued
            }
            ProviderStatus::InProgress => CallStatus::InProgress,
            ProviderStatus::Completed => CallStatus::Completed,
            ProviderStatus::Failed => CallStatus::Failed,
            ProviderStatus::Busy => CallStatus::Busy,
            ProviderStatus::NoAnswer => CallStatus::NoAnswer,
            ProviderStatus::Canceled => CallStatus::Canceled,
        }
    }
}

/// Arguments to `PlaceCall`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceCallRequest {
    pub destination: String,
    pub message: Option<String>,
    pub status_callback_url: String,
    pub timeout_seconds: u32,
}

/// Provider acceptance of a placed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedCall {
    pub provider_call_id: String,
    pub status: ProviderStatus,
}

/// Result of `FetchStatus`
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedStatus {
    pub status: ProviderStatus,
    pub duration_seconds: Option<i32>,
    /// Provider-reported price, when the provider exposes one
    pub cost: Option<Decimal>,
}
