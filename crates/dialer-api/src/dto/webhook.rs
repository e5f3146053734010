//! Provider status callback payload
//!
//! Twilio posts `application/x-www-form-urlencoded` with PascalCase keys;
//! other producers post JSON with camelCase keys. Both decode into the same
//! struct. Numbers may arrive as strings, and an empty string counts as absent.

use actix_web::web;
use dialer_core::models::StatusUpdate;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusCallbackPayload {
    #[serde(default, rename = "CallSid", alias = "providerCallId", alias = "call_sid")]
    pub call_sid: Option<String>,

    #[serde(default, rename = "CallStatus", alias = "status", alias = "call_status")]
    pub call_status: Option<String>,

    #[serde(
        default,
        rename = "CallDuration",
        alias = "durationSeconds",
        deserialize_with = "lenient_i32"
    )]
    pub call_duration: Option<i32>,

    #[serde(default, rename = "RecordingUrl", alias = "recordingUrl")]
    pub recording_url: Option<String>,

    #[serde(
        default,
        rename = "RecordingDuration",
        alias = "recordingDurationSeconds",
        deserialize_with = "lenient_i32"
    )]
    pub recording_duration: Option<i32>,
}

/// Query string of the callback URL
#[derive(Debug, Clone, Deserialize)]
pub struct StatusCallbackQuery {
    pub call_id: Option<Uuid>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(i64),
    Text(String),
}

fn lenient_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(n)) => i32::try_from(n).map(Some).map_err(de::Error::custom),
        Some(NumberOrText::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrText::Text(s)) => s.trim().parse().map(Some).map_err(de::Error::custom),
    }
}

impl StatusCallbackPayload {
    /// Decode a callback body by content type
    pub fn parse(content_type: &str, body: &[u8]) -> Result<Self, String> {
        if content_type.starts_with("application/json") {
            return serde_json::from_slice(body).map_err(|e| e.to_string());
        }

        let text = std::str::from_utf8(body).map_err(|e| e.to_string())?;
        web::Query::<Self>::from_query(text)
            .map(web::Query::into_inner)
            .map_err(|e| e.to_string())
    }

    /// Transport-independent update, if the payload names a call and a status
    pub fn into_update(self) -> Option<StatusUpdate> {
        let provider_call_id = self.call_sid.filter(|s| !s.trim().is_empty())?;
        let status = self.call_status.filter(|s| !s.trim().is_empty())?;

        Some(StatusUpdate {
            provider_call_id,
            status,
            duration_seconds: self.call_duration,
            recording_url: self.recording_url.filter(|u| !u.trim().is_empty()),
            recording_duration_seconds: self.recording_duration,
        })
    }
}
