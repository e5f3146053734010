//! Batch enqueuer
//!
//! Validates a whole batch before touching storage (E.164, safety allow-list,
//! contact dialability), then creates one pending record per request and
//! hands each to the scheduler. A request with a future `scheduled_at` runs
//! at that time; otherwise the Nth request (0-based) runs
//! N × `inter_call_delay` from now.

use crate::constants::{MAX_BATCH_SIZE, MAX_INTER_CALL_DELAY_SECS};
use crate::contacts::ContactService;
use crate::job_processor::JobProcessor;
use crate::scheduler::JobScheduler;
use chrono::{DateTime, Utc};
use dialer_core::{
    models::{CallRecord, CallRequest},
    traits::CallRepository,
    AppError, AppResult,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Request after destination normalization
struct PreparedRequest {
    destination: String,
    request: CallRequest,
}

pub struct BatchEnqueuer {
    contacts: Arc<ContactService>,
    calls: Arc<dyn CallRepository>,
    processor: Arc<JobProcessor>,
    scheduler: Arc<JobScheduler>,
}

impl BatchEnqueuer {
    pub fn new(
        contacts: Arc<ContactService>,
        calls: Arc<dyn CallRepository>,
        processor: Arc<JobProcessor>,
        scheduler: Arc<JobScheduler>,
    ) -> Self {
        Self {
            contacts,
            calls,
            processor,
            scheduler,
        }
    }

    /// Create pending records for every request and schedule them
    ///
    /// Any invalid request fails the whole batch before a record exists.
    #[instrument(skip(self, requests), fields(batch_size = requests.len()))]
    pub async fn enqueue_many(
        &self,
        requests: Vec<CallRequest>,
        inter_call_delay: Duration,
    ) -> AppResult<Vec<CallRecord>> {
        if inter_call_delay > Duration::from_secs(MAX_INTER_CALL_DELAY_SECS) {
            return Err(AppError::Validation(format!(
                "inter-call delay must not exceed {} seconds",
                MAX_INTER_CALL_DELAY_SECS
            )));
        }

        let records = self.create_records(requests).await?;
        let now = Utc::now();

        for (index, record) in records.iter().enumerate() {
            let delay = Self::delay_for(record.scheduled_at, index, inter_call_delay, now);
            self.scheduler.schedule(record.id, delay);
        }

        info!(
            "Enqueued {} calls with {:?} between calls",
            records.len(),
            inter_call_delay
        );
        Ok(records)
    }

    /// Validate the batch and insert pending records without scheduling
    pub async fn create_records(&self, requests: Vec<CallRequest>) -> AppResult<Vec<CallRecord>> {
        if requests.is_empty() {
            return Err(AppError::Validation("batch contains no calls".to_string()));
        }
        if requests.len() > MAX_BATCH_SIZE {
            return Err(AppError::Validation(format!(
                "batch of {} exceeds the maximum of {}",
                requests.len(),
                MAX_BATCH_SIZE
            )));
        }

        let mut prepared = Vec::with_capacity(requests.len());
        for (index, request) in requests.into_iter().enumerate() {
            let destination = self
                .contacts
                .prepare_destination(&request.destination)
                .map_err(|e| Self::at_index(index, e))?;
            self.contacts
                .ensure_dialable(&destination)
                .await
                .map_err(|e| Self::at_index(index, e))?;
            prepared.push(PreparedRequest {
                destination,
                request,
            });
        }

        let mut records = Vec::with_capacity(prepared.len());
        for item in prepared {
            let contact = self
                .contacts
                .find_or_create_for_request(&item.destination, item.request.campaign_tag.clone())
                .await?;

            let record = CallRecord::new(
                contact.id,
                item.destination,
                item.request.message,
                item.request.campaign_tag,
                item.request.scheduled_at,
            );
            records.push(self.calls.insert(&record).await?);
        }

        Ok(records)
    }

    /// Schedule records a previous run created but never placed
    ///
    /// Run once at startup, before traffic arrives. A future `scheduled_at`
    /// is honored; everything else is due now. Returns how many jobs were
    /// scheduled.
    #[instrument(skip(self))]
    pub async fn resume_unplaced(&self) -> AppResult<usize> {
        let records = self.calls.list_unplaced().await?;
        let now = Utc::now();

        let mut resumed = 0;
        for record in &records {
            if record.attempts > 0 {
                warn!(
                    "Call {} stopped mid-dial after {} attempts; dialing again",
                    record.id, record.attempts
                );
            }
            let delay = Self::delay_for(record.scheduled_at, 0, Duration::ZERO, now);
            if self.scheduler.schedule(record.id, delay) {
                resumed += 1;
            }
        }

        if resumed > 0 {
            info!("Resumed {} unplaced calls", resumed);
        }
        Ok(resumed)
    }

    /// Process records inline, in order, and return their refreshed state
    ///
    /// Unclassified failures are logged and already recorded on the record by
    /// the processor; the remaining records still run.
    pub async fn process_all_now(&self, records: &[CallRecord]) -> AppResult<Vec<CallRecord>> {
        let mut refreshed = Vec::with_capacity(records.len());
        for record in records {
            match self.processor.process(record.id).await {
                Ok(updated) => refreshed.push(updated),
                Err(e) => {
                    error!("Inline processing of call {} failed: {}", record.id, e);
                    let latest = self
                        .calls
                        .find_by_id(record.id)
                        .await?
                        .ok_or_else(|| AppError::CallNotFound(record.id.to_string()))?;
                    refreshed.push(latest);
                }
            }
        }
        Ok(refreshed)
    }

    /// Point a batch validation error at the offending request
    fn at_index(index: usize, err: AppError) -> AppError {
        match err {
            AppError::Validation(m) => AppError::Validation(format!("call {}: {}", index, m)),
            AppError::InvalidDestination(m) => {
                AppError::InvalidDestination(format!("call {}: {}", index, m))
            }
            other => other,
        }
    }

    fn delay_for(
        scheduled_at: Option<DateTime<Utc>>,
        index: usize,
        inter_call_delay: Duration,
        now: DateTime<Utc>,
    ) -> Duration {
        if let Some(at) = scheduled_at {
            if let Ok(wait) = (at - now).to_std() {
                if !wait.is_zero() {
                    return wait;
                }
            }
        }
        inter_call_delay.saturating_mul(index as u32)
    }
}
