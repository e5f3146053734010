//! Call record model and its state machine
//!
//! ```text
//! pending -> queued -> in_progress -> completed | failed | no_answer | busy
//!    |          |            |
//!    +----------+------------+--> canceled
//! queued -> failed | no_answer | busy
//! ```
//!
//! Terminal states accept no further transition. A transition attempt out of
//! a terminal state is a logged no-op, so redelivered provider callbacks can
//! never corrupt a finished record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use uuid::Uuid;

/// Call status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Created by the enqueuer, not yet picked up
    #[default]
    Pending,
    /// Accepted by the job processor for execution
    Queued,
    /// Provider accepted the call
    InProgress,
    Completed,
    Failed,
    NoAnswer,
    Busy,
    Canceled,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CallStatus {
    pub const ALL: [CallStatus; 8] = [
        CallStatus::Pending,
        CallStatus::Queued,
        CallStatus::InProgress,
        CallStatus::Completed,
        CallStatus::Failed,
        CallStatus::NoAnswer,
        CallStatus::Busy,
        CallStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Pending => "pending",
            CallStatus::Queued => "queued",
            CallStatus::InProgress => "in_progress",
            CallStatus::Completed => "completed",
            CallStatus::Failed => "failed",
            CallStatus::NoAnswer => "no_answer",
            CallStatus::Busy => "busy",
            CallStatus::Canceled => "canceled",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(CallStatus::Pending),
            "queued" => Some(CallStatus::Queued),
            "in_progress" => Some(CallStatus::InProgress),
            "completed" => Some(CallStatus::Completed),
            "failed" => Some(CallStatus::Failed),
            "no_answer" => Some(CallStatus::NoAnswer),
            "busy" => Some(CallStatus::Busy),
            "canceled" => Some(CallStatus::Canceled),
            _ => None,
        }
    }

    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Completed
                | CallStatus::Failed
                | CallStatus::NoAnswer
                | CallStatus::Busy
                | CallStatus::Canceled
        )
    }

    /// Whether `self -> next` is an edge of the state machine
    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        use CallStatus::*;

        match (self, next) {
            (Pending, Queued) | (Pending, Canceled) => true,
            (Queued, InProgress)
            | (Queued, Failed)
            | (Queued, NoAnswer)
            | (Queued, Busy)
            | (Queued, Canceled) => true,
            (InProgress, Completed)
            | (InProgress, Failed)
            | (InProgress, NoAnswer)
            | (InProgress, Busy)
            | (InProgress, Canceled) => true,
            _ => false,
        }
    }
}

/// Outcome of a transition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// Target equals the current status
    Unchanged,
    Rejected { from: CallStatus, to: CallStatus },
}

impl Transition {
    #[inline]
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

/// Recording reference attached by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    pub url: String,
    pub duration_seconds: Option<i32>,
}

/// Call record entity
///
/// Mutated only by the job processor, status ingestion and cancellation,
/// always through the transition methods below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    /// Unique identifier
    pub id: Uuid,

    /// Owning contact
    pub contact_id: Uuid,

    /// E.164 destination, snapshotted from the contact at enqueue time
    pub destination: String,

    /// Campaign the request belonged to
    pub campaign_tag: Option<String>,

    /// Free-text message synthesized into the voice script
    pub message: Option<String>,

    /// Current status
    pub status: CallStatus,

    /// Number of `PlaceCall` invocations made for this record
    pub attempts: i32,

    /// Billed duration reported by the provider
    pub duration_seconds: Option<i32>,

    /// Cost, set once the provider accepts the call
    pub cost: Option<Decimal>,

    /// Provider-assigned call identifier, unique once set
    pub provider_call_id: Option<String>,

    /// Requested dial time
    pub scheduled_at: Option<DateTime<Utc>>,

    /// Set exactly when status first becomes in_progress
    pub started_at: Option<DateTime<Utc>>,

    pub ended_at: Option<DateTime<Utc>>,

    /// Why the record failed
    pub error_detail: Option<String>,

    pub recording: Option<Recording>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Bumped by every successful write; writers must hold the current value
    #[serde(default)]
    pub version: i32,
}

impl CallRecord {
    /// Create a pending record
    pub fn new(
        contact_id: Uuid,
        destination: String,
        message: Option<String>,
        campaign_tag: Option<String>,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            contact_id,
            destination,
            campaign_tag,
            message,
            status: CallStatus::Pending,
            attempts: 0,
            duration_seconds: None,
            cost: None,
            provider_call_id: None,
            scheduled_at,
            started_at: None,
            ended_at: None,
            error_detail: None,
            recording: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `next` if the state machine allows it
    ///
    /// Stamps `started_at` the first time the record enters in_progress and
    /// `ended_at` on entering any terminal state.
    pub fn transition(&mut self, next: CallStatus, now: DateTime<Utc>) -> Transition {
        if self.status == next {
            return Transition::Unchanged;
        }

        if !self.status.can_transition_to(next) {
            warn!(
                call_id = %self.id,
                from = %self.status,
                to = %next,
                "Ignoring invalid call status transition"
            );
            return Transition::Rejected {
                from: self.status,
                to: next,
            };
        }

        self.status = next;
        if next == CallStatus::InProgress && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if next.is_terminal() && self.ended_at.is_none() {
            self.ended_at = Some(now);
        }
        self.updated_at = now;
        Transition::Applied
    }

    /// Provider accepted the call: queued -> in_progress with id and estimated cost
    ///
    /// A record an early callback already moved to in_progress only gains the
    /// ID and the estimate.
    pub fn mark_placed(
        &mut self,
        provider_call_id: String,
        estimated_cost: Decimal,
        now: DateTime<Utc>,
    ) -> Transition {
        if self.status == CallStatus::InProgress && self.provider_call_id.is_none() {
            self.provider_call_id = Some(provider_call_id);
            self.cost.get_or_insert(estimated_cost);
            self.updated_at = now;
            return Transition::Applied;
        }

        let outcome = self.transition(CallStatus::InProgress, now);
        if outcome.is_applied() {
            self.provider_call_id = Some(provider_call_id);
            self.cost = Some(estimated_cost);
        }
        outcome
    }

    /// Finalize as failed with the given detail
    pub fn fail(&mut self, detail: impl Into<String>, now: DateTime<Utc>) -> Transition {
        let outcome = self.transition(CallStatus::Failed, now);
        if outcome.is_applied() {
            self.error_detail = Some(detail.into());
        }
        outcome
    }

    /// Finalize with a provider-reported terminal status
    ///
    /// Duration and cost come from the signal; cost is only written for
    /// completed calls.
    pub fn finish(
        &mut self,
        status: CallStatus,
        duration_seconds: Option<i32>,
        final_cost: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Transition {
        let outcome = self.transition(status, now);
        if outcome.is_applied() {
            if duration_seconds.is_some() {
                self.duration_seconds = duration_seconds;
            }
            if status == CallStatus::Completed {
                if let Some(cost) = final_cost {
                    self.cost = Some(cost);
                }
            }
        }
        outcome
    }

    /// Operator cancellation
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Transition {
        self.transition(CallStatus::Canceled, now)
    }
}
