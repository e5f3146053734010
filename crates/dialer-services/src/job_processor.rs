//! Job processor
//!
//! Drives one call record from `pending` to `in_progress` (or a terminal
//! failure) through the provider client:
//!
//! 1. load; return at once if terminal or already placed
//! 2. `pending -> queued`
//! 3. pre-flight estimate, reserved against the budget (failure is terminal)
//! 4. `PlaceCall` with retries on transient errors only
//! 5. on acceptance store provider ID and estimate
//!
//! The reservation is the call's one debit. It is refunded when the job ends
//! without the provider accepting a call. Provider-reported terminal states
//! arrive later through status ingestion.

use crate::budget::BudgetLedgerService;
use crate::constants::STATUS_CALLBACK_PATH;
use crate::retry::RetryPolicy;
use chrono::Utc;
use dialer_core::{
    models::{CallRecord, CallStatus, PlaceCallRequest},
    traits::{CallRepository, ProviderClient},
    AppError, AppResult, ErrorClass, ProviderError,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Executes call jobs
pub struct JobProcessor {
    calls: Arc<dyn CallRepository>,
    provider: Arc<dyn ProviderClient>,
    budget: Arc<BudgetLedgerService>,
    retry: RetryPolicy,
    callback_base_url: String,
    call_timeout_secs: u32,
}

impl JobProcessor {
    pub fn new(
        calls: Arc<dyn CallRepository>,
        provider: Arc<dyn ProviderClient>,
        budget: Arc<BudgetLedgerService>,
        retry: RetryPolicy,
        callback_base_url: &str,
        call_timeout_secs: u32,
    ) -> Self {
        Self {
            calls,
            provider,
            budget,
            retry,
            callback_base_url: callback_base_url.trim_end_matches('/').to_string(),
            call_timeout_secs,
        }
    }

    /// Status callback URL embedding the record's identifier
    pub fn callback_url(&self, call_id: Uuid) -> String {
        format!(
            "{}{}?call_id={}",
            self.callback_base_url, STATUS_CALLBACK_PATH, call_id
        )
    }

    /// Process one call record
    ///
    /// Idempotent: a terminal or already placed record is returned unchanged.
    /// Classified failures finalize the record and return `Ok`; anything else
    /// marks the record failed and is returned as the error.
    #[instrument(skip(self))]
    pub async fn process(&self, call_id: Uuid) -> AppResult<CallRecord> {
        let record = self
            .calls
            .find_by_id(call_id)
            .await?
            .ok_or_else(|| AppError::CallNotFound(call_id.to_string()))?;

        if record.is_terminal() {
            debug!("Call {} already {}, nothing to do", call_id, record.status);
            return Ok(record);
        }
        if record.status == CallStatus::InProgress {
            debug!("Call {} already placed, nothing to do", call_id);
            return Ok(record);
        }

        match self.run(record).await {
            Ok(record) => Ok(record),
            Err(e) => {
                error!("Unexpected failure processing call {}: {}", call_id, e);
                self.fail_after_error(call_id, &e).await;
                Err(e)
            }
        }
    }

    async fn run(&self, mut record: CallRecord) -> AppResult<CallRecord> {
        while record.status == CallStatus::Pending {
            record.transition(CallStatus::Queued, Utc::now());
            self.save(&mut record).await?;
        }
        if record.status != CallStatus::Queued {
            debug!("Call {} is {}, not dialing", record.id, record.status);
            return Ok(record);
        }

        let estimate = self.provider.estimate_cost(&record.destination);
        let reservation = match self.budget.reserve(estimate).await {
            Ok(reservation) => reservation,
            Err(e @ AppError::BudgetExceeded { .. }) => {
                warn!("Call {} blocked by budget: {}", record.id, e);
                return self.finalize_failed(record, e.to_string()).await;
            }
            Err(e) => return Err(e),
        };

        let call_id = record.id;
        let mut placed = false;
        let result = self.dial(record, estimate, &mut placed).await;
        if !placed {
            if let Err(e) = self.budget.release(&reservation).await {
                error!(
                    "Could not release {} reserved for call {}: {}",
                    reservation.amount, call_id, e
                );
            }
        }
        result
    }

    /// Place the call, retrying transient errors; sets `placed` once the
    /// provider accepts
    async fn dial(
        &self,
        mut record: CallRecord,
        estimate: Decimal,
        placed: &mut bool,
    ) -> AppResult<CallRecord> {
        let request = PlaceCallRequest {
            destination: record.destination.clone(),
            message: record.message.clone(),
            status_callback_url: self.callback_url(record.id),
            timeout_seconds: self.call_timeout_secs,
        };

        let mut attempt: u32 = 0;
        loop {
            // Operator may have canceled while we were waiting
            if let Some(latest) = self.calls.find_by_id(record.id).await? {
                if latest.is_terminal() {
                    info!("Call {} became {} before dialing", record.id, latest.status);
                    return Ok(latest);
                }
                if latest.status == CallStatus::InProgress {
                    // A timed-out attempt reached the provider after all
                    info!("Call {} reported live by the provider", record.id);
                    *placed = true;
                    return Ok(latest);
                }
                record = latest;
            }

            record.attempts += 1;
            record.updated_at = Utc::now();
            if !self.save(&mut record).await? {
                continue;
            }
            attempt += 1;

            match self.provider.place_call(&request).await {
                Ok(accepted) => {
                    *placed = true;
                    return self.on_placed(record, accepted.provider_call_id, estimate).await;
                }
                Err(e) if self.retry.should_retry(&e, attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        call_id = %record.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient provider error, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return self.on_provider_error(record, e, attempt).await,
            }
        }
    }

    async fn on_placed(
        &self,
        mut record: CallRecord,
        provider_call_id: String,
        estimate: Decimal,
    ) -> AppResult<CallRecord> {
        loop {
            if record.is_terminal() {
                if record.provider_call_id.as_deref() != Some(provider_call_id.as_str()) {
                    warn!(
                        "Call {} was finalized while dialing; canceling provider call {}",
                        record.id, provider_call_id
                    );
                    if let Err(e) = self.provider.cancel_call(&provider_call_id).await {
                        warn!("Best-effort cancel of {} failed: {}", provider_call_id, e);
                    }
                }
                return Ok(record);
            }

            if !record
                .mark_placed(provider_call_id.clone(), estimate, Utc::now())
                .is_applied()
            {
                // A callback already stored this placement
                return Ok(record);
            }

            if self.save(&mut record).await? {
                info!(
                    "Call {} placed as {} (estimated cost {})",
                    record.id, provider_call_id, estimate
                );
                return Ok(record);
            }
        }
    }

    async fn on_provider_error(
        &self,
        record: CallRecord,
        err: ProviderError,
        attempt: u32,
    ) -> AppResult<CallRecord> {
        let detail = match err.class() {
            ErrorClass::Retryable => {
                format!("{} (gave up after {} attempts)", err, attempt)
            }
            ErrorClass::Fatal => {
                error!(
                    "Provider rejected credentials; operator action required: {}",
                    err
                );
                err.to_string()
            }
            ErrorClass::Permanent => err.to_string(),
        };

        warn!("Call {} failed: {}", record.id, detail);
        self.finalize_failed(record, detail).await
    }

    /// Mark failed, reapplying on top of any concurrent write
    async fn finalize_failed(&self, mut record: CallRecord, detail: String) -> AppResult<CallRecord> {
        loop {
            if !record.fail(detail.clone(), Utc::now()).is_applied() {
                return Ok(record);
            }
            if self.save(&mut record).await? {
                return Ok(record);
            }
        }
    }

    /// Record an unclassified error on the call, best effort
    async fn fail_after_error(&self, call_id: Uuid, err: &AppError) {
        let record = match self.calls.find_by_id(call_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                error!("Could not reload call {} to record failure: {}", call_id, e);
                return;
            }
        };

        if let Err(e) = self.finalize_failed(record, err.to_string()).await {
            error!("Could not mark call {} failed: {}", call_id, e);
        }
    }

    /// Persist; on a lost race, replace `record` with the stored row
    async fn save(&self, record: &mut CallRecord) -> AppResult<bool> {
        if self.calls.update(record).await? {
            return Ok(true);
        }

        let stored = self
            .calls
            .find_by_id(record.id)
            .await?
            .ok_or_else(|| AppError::CallNotFound(record.id.to_string()))?;
        debug!("Call {} write lost to status {}", record.id, stored.status);
        *record = stored;
        Ok(false)
    }
}
