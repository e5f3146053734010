//! Contact model
//!
//! A dialable destination. Normalization and validation are plain functions
//! called in a fixed order by the constructor and by the contact service;
//! nothing runs implicitly on save.

use crate::error::AppError;
use crate::AppResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Maximum number of free-form tags on one contact
pub const MAX_TAGS: usize = 20;

/// Maximum length of a single tag, in characters
pub const MAX_TAG_LENGTH: usize = 50;

/// Contact lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    #[default]
    Active,
    Inactive,
    Blocked,
    DoNotCall,
}

impl fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContactStatus::Active => write!(f, "active"),
            ContactStatus::Inactive => write!(f, "inactive"),
            ContactStatus::Blocked => write!(f, "blocked"),
            ContactStatus::DoNotCall => write!(f, "do_not_call"),
        }
    }
}

impl ContactStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(ContactStatus::Active),
            "inactive" => Some(ContactStatus::Inactive),
            "blocked" => Some(ContactStatus::Blocked),
            "do_not_call" | "do-not-call" | "dnc" => Some(ContactStatus::DoNotCall),
            _ => None,
        }
    }

    /// Blocked and do-not-call contacts must never be dialed
    pub fn can_be_dialed(&self) -> bool {
        !matches!(self, ContactStatus::Blocked | ContactStatus::DoNotCall)
    }
}

/// Contact entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// Unique identifier
    pub id: Uuid,

    /// E.164 phone number, globally unique
    pub phone_number: String,

    /// Display name
    pub name: Option<String>,

    /// Campaign this contact was imported for
    pub campaign_tag: Option<String>,

    /// Free-form tags (at most 20, each at most 50 characters)
    pub tags: BTreeSet<String>,

    /// Lifecycle status
    pub status: ContactStatus,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Build a validated contact
    ///
    /// Steps run in order: normalize phone, validate E.164, normalize tags.
    /// The safe-mode prefix check is deployment policy and is applied by the
    /// caller (see [`crate::models::SafetyPolicy`]).
    pub fn new<I>(
        phone_number: &str,
        name: Option<String>,
        campaign_tag: Option<String>,
        tags: I,
    ) -> AppResult<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let phone_number = Self::normalize_phone(phone_number);
        Self::validate_e164(&phone_number)?;
        let tags = Self::normalize_tags(tags)?;
        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            phone_number,
            name: name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            campaign_tag: campaign_tag
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            tags,
            status: ContactStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    /// Strip formatting characters and coerce to a leading `+`
    ///
    /// `00` international prefixes become `+`; a bare digit string is assumed
    /// to already carry its country code.
    pub fn normalize_phone(raw: &str) -> String {
        let compact: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.' | '\t'))
            .collect();

        if let Some(rest) = compact.strip_prefix("00") {
            format!("+{}", rest)
        } else if compact.starts_with('+') || compact.is_empty() {
            compact
        } else {
            format!("+{}", compact)
        }
    }

    /// Check `+` followed by 2 to 15 digits, the first non-zero
    pub fn validate_e164(phone: &str) -> AppResult<()> {
        let digits = phone
            .strip_prefix('+')
            .ok_or_else(|| AppError::InvalidDestination(format!("{} is missing '+'", phone)))?;

        let valid = (2..=15).contains(&digits.len())
            && digits.chars().all(|c| c.is_ascii_digit())
            && !digits.starts_with('0');

        if valid {
            Ok(())
        } else {
            Err(AppError::InvalidDestination(format!(
                "{} is not a valid E.164 number",
                phone
            )))
        }
    }

    /// Trim, lowercase, dedupe and bound-check tags
    pub fn normalize_tags<I>(tags: I) -> AppResult<BTreeSet<String>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut normalized = BTreeSet::new();
        for tag in tags {
            let tag = tag.trim().to_lowercase();
            if tag.is_empty() {
                continue;
            }
            if tag.chars().count() > MAX_TAG_LENGTH {
                return Err(AppError::Validation(format!(
                    "tag '{}' exceeds {} characters",
                    tag, MAX_TAG_LENGTH
                )));
            }
            normalized.insert(tag);
        }

        if normalized.len() > MAX_TAGS {
            return Err(AppError::Validation(format!(
                "at most {} tags allowed, got {}",
                MAX_TAGS,
                normalized.len()
            )));
        }

        Ok(normalized)
    }

    /// Merge tags into the existing set, keeping the limits
    pub fn add_tags<I>(&mut self, tags: I) -> AppResult<()>
    where
        I: IntoIterator<Item = String>,
    {
        let merged = Self::normalize_tags(self.tags.iter().cloned().chain(tags))?;
        self.tags = merged;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Change lifecycle status
    pub fn set_status(&mut self, status: ContactStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
