//! Status ingestion
//!
//! Applies provider status signals, from webhooks or from polling, to call
//! records. Unknown calls and finished records are discarded without error:
//! providers redeliver callbacks, and a redelivery must never change a
//! finished record. The budget is never touched here; the estimate debited at
//! placement stands.

use chrono::Utc;
use dialer_core::{
    models::{CallRecord, CallStatus, PricingTable, ProviderStatus, Recording, StatusUpdate},
    traits::{CallRepository, ProviderClient},
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// What happened to one status signal
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// The record moved to a new status
    Applied(CallRecord),
    /// Signal matched the current status or lagged behind it
    Unchanged(CallRecord),
    /// Record already finished; signal dropped
    AlreadyTerminal(CallRecord),
    /// No record for this provider call
    UnknownRecord,
    /// Signal could not be applied to the record
    Ignored(String),
}

impl IngestOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            IngestOutcome::Applied(_) => "applied",
            IngestOutcome::Unchanged(_) => "unchanged",
            IngestOutcome::AlreadyTerminal(_) => "already_terminal",
            IngestOutcome::UnknownRecord => "unknown_record",
            IngestOutcome::Ignored(_) => "ignored",
        }
    }
}

pub struct StatusIngestion {
    calls: Arc<dyn CallRepository>,
    provider: Arc<dyn ProviderClient>,
}

impl StatusIngestion {
    pub fn new(calls: Arc<dyn CallRepository>, provider: Arc<dyn ProviderClient>) -> Self {
        Self { calls, provider }
    }

    /// Apply one provider status signal
    ///
    /// The record is found by provider call ID. `call_id_hint` (the ID carried
    /// in the callback URL) is used only when that lookup fails and the
    /// hinted record has no provider ID yet or the same one.
    #[instrument(skip(self, update), fields(provider_call_id = %update.provider_call_id, status = %update.status))]
    pub async fn apply_status(
        &self,
        update: &StatusUpdate,
        call_id_hint: Option<Uuid>,
    ) -> AppResult<IngestOutcome> {
        let provider_status = ProviderStatus::from_code(&update.status);
        loop {
            let record = match self.resolve(update, call_id_hint).await? {
                Some(record) => record,
                None => {
                    warn!(
                        "Discarding status '{}' for unknown provider call {}",
                        update.status, update.provider_call_id
                    );
                    return Ok(IngestOutcome::UnknownRecord);
                }
            };

            if record.is_terminal() {
                debug!(
                    "Call {} already {}, discarding '{}'",
                    record.id, record.status, update.status
                );
                return Ok(IngestOutcome::AlreadyTerminal(record));
            }

            let Some(provider_status) = provider_status else {
                warn!("Unrecognized provider status '{}'", update.status);
                return Ok(IngestOutcome::Ignored(format!(
                    "unrecognized status '{}'",
                    update.status
                )));
            };

            let call_id = record.id;
            match self.apply(record, provider_status, update).await? {
                Some(outcome) => return Ok(outcome),
                None => debug!("Call {} changed under '{}', reapplying", call_id, update.status),
            }
        }
    }

    async fn resolve(
        &self,
        update: &StatusUpdate,
        call_id_hint: Option<Uuid>,
    ) -> AppResult<Option<CallRecord>> {
        if let Some(record) = self
            .calls
            .find_by_provider_call_id(&update.provider_call_id)
            .await?
        {
            return Ok(Some(record));
        }

        let Some(id) = call_id_hint else {
            return Ok(None);
        };

        Ok(self.calls.find_by_id(id).await?.filter(|record| {
            record
                .provider_call_id
                .as_deref()
                .map_or(true, |pid| pid == update.provider_call_id)
        }))
    }

    /// Apply the signal to `record`; `None` when another writer got there
    /// first and the record must be reloaded
    async fn apply(
        &self,
        mut record: CallRecord,
        provider_status: ProviderStatus,
        update: &StatusUpdate,
    ) -> AppResult<Option<IngestOutcome>> {
        let now = Utc::now();
        let target = provider_status.local_status();

        // Matched through the callback URL before the job stored the ID
        let adopted = record.provider_call_id.is_none();
        if adopted {
            record.provider_call_id = Some(update.provider_call_id.clone());
            record.updated_at = now;
        }

        // Ringing after acceptance is old news
        let behind = target == CallStatus::Queued && record.status == CallStatus::InProgress;
        if record.status == target || behind {
            let recorded = self.attach_recording(&mut record, update);
            if !recorded && !adopted {
                return Ok(Some(IngestOutcome::Unchanged(record)));
            }
            return self.save(record, IngestOutcome::Unchanged).await;
        }

        // A short call can finish before its in_progress signal arrives
        if target == CallStatus::Completed && record.status == CallStatus::Queued {
            record.transition(CallStatus::InProgress, now);
        }

        let outcome = match target {
            CallStatus::Completed => {
                let duration = update.duration_seconds.unwrap_or(0).max(0);
                let rate = self.provider.rate_per_minute(&record.destination);
                let cost = PricingTable::cost_for_duration(rate, duration);
                record.finish(CallStatus::Completed, Some(duration), Some(cost), now)
            }
            CallStatus::Failed | CallStatus::Busy | CallStatus::NoAnswer | CallStatus::Canceled => {
                record.finish(target, update.duration_seconds, None, now)
            }
            _ => record.transition(target, now),
        };

        if !outcome.is_applied() {
            return Ok(Some(IngestOutcome::Ignored(format!(
                "cannot move call from {} to {}",
                record.status, target
            ))));
        }

        self.attach_recording(&mut record, update);
        let saved = self.save(record, IngestOutcome::Applied).await?;
        if let Some(IngestOutcome::Applied(ref r)) = saved {
            info!("Call {} is now {}", r.id, r.status);
        }
        Ok(saved)
    }

    fn attach_recording(&self, record: &mut CallRecord, update: &StatusUpdate) -> bool {
        let Some(url) = update.recording_url.as_ref().filter(|u| !u.is_empty()) else {
            return false;
        };
        record.recording = Some(Recording {
            url: url.clone(),
            duration_seconds: update.recording_duration_seconds,
        });
        record.updated_at = Utc::now();
        true
    }

    async fn save(
        &self,
        mut record: CallRecord,
        on_saved: fn(CallRecord) -> IngestOutcome,
    ) -> AppResult<Option<IngestOutcome>> {
        if self.calls.update(&mut record).await? {
            return Ok(Some(on_saved(record)));
        }
        Ok(None)
    }

    /// Poll the provider for a live call and apply what it reports
    ///
    /// For operators when a webhook was lost.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, call_id: Uuid) -> AppResult<IngestOutcome> {
        let record = self
            .calls
            .find_by_id(call_id)
            .await?
            .ok_or_else(|| AppError::CallNotFound(call_id.to_string()))?;

        if record.is_terminal() {
            return Ok(IngestOutcome::AlreadyTerminal(record));
        }

        let Some(provider_call_id) = record.provider_call_id.clone() else {
            return Ok(IngestOutcome::Ignored(format!(
                "call {} has not been placed",
                call_id
            )));
        };

        let fetched = self.provider.fetch_status(&provider_call_id).await?;
        let update = StatusUpdate::new(
            provider_call_id,
            fetched.status.to_string(),
            fetched.duration_seconds,
        );
        self.apply_status(&update, Some(call_id)).await
    }
}
