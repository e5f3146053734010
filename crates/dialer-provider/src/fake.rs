//! Scripted in-process provider
//!
//! Never dials. Each `place_call` consumes the next scripted outcome (success
//! when the script is empty) and records the request, so tests can assert on
//! exactly how many attempts were made and with what arguments.

use crate::preflight;
use async_trait::async_trait;
use dialer_core::models::{
    FetchedStatus, PlaceCallRequest, PlacedCall, PricingTable, ProviderStatus, SafetyPolicy,
};
use dialer_core::traits::ProviderClient;
use dialer_core::ProviderError;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use tracing::debug;
use uuid::Uuid;

/// Scripted result of one `place_call`
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    Accept,
    Fail(ProviderError),
}

/// Fake provider client for tests and dry runs
pub struct FakeProviderClient {
    pricing: PricingTable,
    safety: SafetyPolicy,
    script: Mutex<VecDeque<FakeOutcome>>,
    requests: Mutex<Vec<PlaceCallRequest>>,
    statuses: Mutex<HashMap<String, FetchedStatus>>,
    canceled: Mutex<Vec<String>>,
    cancel_error: Mutex<Option<ProviderError>>,
}

impl Default for FakeProviderClient {
    fn default() -> Self {
        Self::new(PricingTable::default(), SafetyPolicy::unrestricted())
    }
}

impl FakeProviderClient {
    pub fn new(pricing: PricingTable, safety: SafetyPolicy) -> Self {
        Self {
            pricing,
            safety,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
            canceled: Mutex::new(Vec::new()),
            cancel_error: Mutex::new(None),
        }
    }

    /// Queue the outcome of the next unscripted `place_call`
    pub fn push_outcome(&self, outcome: FakeOutcome) {
        self.script.lock().push_back(outcome);
    }

    /// Queue `times` failures with the same error
    pub fn fail_times(&self, times: usize, err: ProviderError) {
        let mut script = self.script.lock();
        for _ in 0..times {
            script.push_back(FakeOutcome::Fail(err.clone()));
        }
    }

    /// Make every `cancel_call` fail with `err`
    pub fn fail_cancels(&self, err: ProviderError) {
        *self.cancel_error.lock() = Some(err);
    }

    /// Set what `fetch_status` reports for a call
    pub fn set_status(&self, provider_call_id: &str, status: FetchedStatus) {
        self.statuses
            .lock()
            .insert(provider_call_id.to_string(), status);
    }

    /// Number of `place_call` invocations so far
    pub fn invocations(&self) -> usize {
        self.requests.lock().len()
    }

    /// Every `place_call` request received, in order
    pub fn requests(&self) -> Vec<PlaceCallRequest> {
        self.requests.lock().clone()
    }

    /// Provider IDs passed to `cancel_call`
    pub fn canceled(&self) -> Vec<String> {
        self.canceled.lock().clone()
    }

    fn new_call_id() -> String {
        format!("CA{}", Uuid::new_v4().simple())
    }
}

#[async_trait]
impl ProviderClient for FakeProviderClient {
    async fn place_call(&self, request: &PlaceCallRequest) -> Result<PlacedCall, ProviderError> {
        self.requests.lock().push(request.clone());
        preflight::check_destination(&request.destination, &self.safety)?;

        let outcome = self.script.lock().pop_front().unwrap_or(FakeOutcome::Accept);
        match outcome {
            FakeOutcome::Accept => {
                let provider_call_id = Self::new_call_id();
                debug!("Fake provider accepted call {}", provider_call_id);
                self.statuses.lock().insert(
                    provider_call_id.clone(),
                    FetchedStatus {
                        status: ProviderStatus::Queued,
                        duration_seconds: None,
                        cost: None,
                    },
                );
                Ok(PlacedCall {
                    provider_call_id,
                    status: ProviderStatus::Queued,
                })
            }
            FakeOutcome::Fail(err) => Err(err),
        }
    }

    async fn fetch_status(&self, provider_call_id: &str) -> Result<FetchedStatus, ProviderError> {
        self.statuses
            .lock()
            .get(provider_call_id)
            .cloned()
            .ok_or_else(|| ProviderError::Permanent(format!("unknown call {}", provider_call_id)))
    }

    async fn cancel_call(&self, provider_call_id: &str) -> Result<(), ProviderError> {
        self.canceled.lock().push(provider_call_id.to_string());
        match self.cancel_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn rate_per_minute(&self, destination: &str) -> Decimal {
        self.pricing.rate_per_minute(destination)
    }

    fn estimate_cost(&self, destination: &str) -> Decimal {
        self.pricing.estimate_cost(destination)
    }
}
