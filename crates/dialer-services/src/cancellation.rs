//! Operator cancellation
//!
//! Local state flips first; the provider is told afterwards, best effort.
//! A job already dialing is not interrupted. If it stores the placement first,
//! the cancel write loses the version check, reloads and sees the provider
//! ID. If the cancel lands first, the job's save loses and the job hangs the
//! new call up itself.

use crate::scheduler::JobScheduler;
use chrono::Utc;
use dialer_core::{
    models::{CallRecord, CallStatus},
    traits::{CallRepository, ProviderClient},
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub struct CancellationService {
    calls: Arc<dyn CallRepository>,
    provider: Arc<dyn ProviderClient>,
    scheduler: Arc<JobScheduler>,
}

impl CancellationService {
    pub fn new(
        calls: Arc<dyn CallRepository>,
        provider: Arc<dyn ProviderClient>,
        scheduler: Arc<JobScheduler>,
    ) -> Self {
        Self {
            calls,
            provider,
            scheduler,
        }
    }

    /// Cancel a call that has not finished
    ///
    /// Canceling a canceled call returns it unchanged. Any other finished
    /// call is a validation error.
    #[instrument(skip(self))]
    pub async fn cancel(&self, call_id: Uuid) -> AppResult<CallRecord> {
        let mut record = self.load(call_id).await?;
        if record.is_terminal() {
            return Self::already_finished(record);
        }

        self.scheduler.abort(call_id);

        loop {
            record.cancel(Utc::now());
            if self.calls.update(&mut record).await? {
                break;
            }
            record = self.load(call_id).await?;
            debug!("Cancel of call {} raced a write, now {}", call_id, record.status);
            if record.is_terminal() {
                return Self::already_finished(record);
            }
        }
        info!("Call {} canceled", call_id);

        if let Some(provider_call_id) = record.provider_call_id.as_deref() {
            match self.provider.cancel_call(provider_call_id).await {
                Ok(()) => info!("Provider call {} canceled upstream", provider_call_id),
                Err(e) => warn!(
                    "Upstream cancel of {} failed, local cancel stands: {}",
                    provider_call_id, e
                ),
            }
        }

        Ok(record)
    }

    async fn load(&self, call_id: Uuid) -> AppResult<CallRecord> {
        self.calls
            .find_by_id(call_id)
            .await?
            .ok_or_else(|| AppError::CallNotFound(call_id.to_string()))
    }

    fn already_finished(record: CallRecord) -> AppResult<CallRecord> {
        if record.status == CallStatus::Canceled {
            return Ok(record);
        }
        Err(AppError::Validation(format!(
            "call {} is already {}",
            record.id, record.status
        )))
    }
}
