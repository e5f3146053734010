//! End-to-end campaign flows over the in-memory store and the fake provider

use async_trait::async_trait;
use chrono::Utc;
use dialer_core::models::{
    CallRecord, CallRequest, CallStatus, ContactStatus, FetchedStatus, PlaceCallRequest,
    PlacedCall, ProviderStatus, SafetyPolicy, StatusUpdate, DEFAULT_LEDGER_NAME,
};
use dialer_core::traits::{CallRepository, ProviderClient};
use dialer_core::{AppError, ProviderError};
use dialer_db::InMemoryStore;
use dialer_provider::{FakeOutcome, FakeProviderClient};
use dialer_services::{
    BatchEnqueuer, BudgetLedgerService, CancellationService, ContactService, IngestOutcome,
    JobProcessor, JobScheduler, RetryPolicy, StatusIngestion,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const TEST_NUMBER: &str = "+15005550006";

/// Fake provider whose `PlaceCall` takes a while to answer
struct SlowProvider {
    inner: Arc<FakeProviderClient>,
    latency: Duration,
}

#[async_trait]
impl ProviderClient for SlowProvider {
    async fn place_call(&self, request: &PlaceCallRequest) -> Result<PlacedCall, ProviderError> {
        tokio::time::sleep(self.latency).await;
        self.inner.place_call(request).await
    }

    async fn fetch_status(&self, provider_call_id: &str) -> Result<FetchedStatus, ProviderError> {
        self.inner.fetch_status(provider_call_id).await
    }

    async fn cancel_call(&self, provider_call_id: &str) -> Result<(), ProviderError> {
        self.inner.cancel_call(provider_call_id).await
    }

    fn rate_per_minute(&self, destination: &str) -> Decimal {
        self.inner.rate_per_minute(destination)
    }

    fn estimate_cost(&self, destination: &str) -> Decimal {
        self.inner.estimate_cost(destination)
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    provider: Arc<FakeProviderClient>,
    budget: Arc<BudgetLedgerService>,
    processor: Arc<JobProcessor>,
    scheduler: Arc<JobScheduler>,
    contacts: Arc<ContactService>,
    enqueuer: BatchEnqueuer,
    ingestion: StatusIngestion,
    cancellation: CancellationService,
}

struct Setup {
    daily: Decimal,
    monthly: Decimal,
    contact_safety: SafetyPolicy,
    provider_safety: SafetyPolicy,
    dial_latency: Duration,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            daily: dec!(10),
            monthly: Decimal::ZERO,
            contact_safety: SafetyPolicy::unrestricted(),
            provider_safety: SafetyPolicy::unrestricted(),
            dial_latency: Duration::ZERO,
        }
    }
}

async fn harness(setup: Setup) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(FakeProviderClient::new(
        Default::default(),
        setup.provider_safety,
    ));
    let budget = Arc::new(
        BudgetLedgerService::open(store.clone(), DEFAULT_LEDGER_NAME, setup.daily, setup.monthly)
            .await
            .unwrap(),
    );

    let dialer: Arc<dyn ProviderClient> = if setup.dial_latency.is_zero() {
        provider.clone()
    } else {
        Arc::new(SlowProvider {
            inner: provider.clone(),
            latency: setup.dial_latency,
        })
    };

    let processor = Arc::new(JobProcessor::new(
        store.clone(),
        dialer,
        budget.clone(),
        RetryPolicy::immediate(3),
        "http://dialer.test/",
        30,
    ));
    let scheduler = Arc::new(JobScheduler::new(processor.clone(), 4));
    let contacts = Arc::new(ContactService::new(store.clone(), setup.contact_safety));

    Harness {
        enqueuer: BatchEnqueuer::new(
            contacts.clone(),
            store.clone(),
            processor.clone(),
            scheduler.clone(),
        ),
        ingestion: StatusIngestion::new(store.clone(), provider.clone()),
        cancellation: CancellationService::new(store.clone(), provider.clone(), scheduler.clone()),
        store,
        provider,
        budget,
        processor,
        scheduler,
        contacts,
    }
}

async fn load(store: &InMemoryStore, id: Uuid) -> CallRecord {
    CallRepository::find_by_id(store, id).await.unwrap().unwrap()
}

async fn wait_for(store: &InMemoryStore, id: Uuid, status: CallStatus) -> CallRecord {
    for _ in 0..300 {
        let record = load(store, id).await;
        if record.status == status {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("call {} never reached {}", id, status);
}

/// Wait until the job is done with the record: placed or finished
async fn wait_settled(store: &InMemoryStore, id: Uuid) -> CallRecord {
    for _ in 0..300 {
        let record = load(store, id).await;
        if !matches!(record.status, CallStatus::Pending | CallStatus::Queued) {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("call {} never settled", id);
}

fn request(destination: &str) -> CallRequest {
    CallRequest::new(destination, Some("Your appointment is tomorrow".to_string()))
}

impl Harness {
    /// Create one record and process it inline
    async fn place_one(&self) -> CallRecord {
        let records = self.enqueuer.create_records(vec![request(TEST_NUMBER)]).await.unwrap();
        let processed = self.enqueuer.process_all_now(&records).await.unwrap();
        processed.into_iter().next().unwrap()
    }

    async fn daily_spend(&self) -> Decimal {
        self.budget.snapshot().await.unwrap().current_daily_spend()
    }
}

// ==================== Job processing ====================

#[tokio::test]
async fn test_placed_call_debits_estimate() {
    let h = harness(Setup::default()).await;
    let estimate = h.provider.estimate_cost(TEST_NUMBER);

    let record = h.place_one().await;

    assert_eq!(record.status, CallStatus::InProgress);
    let pid = record.provider_call_id.clone().unwrap();
    assert!(pid.starts_with("CA"));
    assert_eq!(pid.len(), 34);
    assert_eq!(record.cost, Some(estimate));
    assert_eq!(record.attempts, 1);
    assert!(record.started_at.is_some());
    assert!(record.ended_at.is_none());
    assert_eq!(h.daily_spend().await, estimate);
    assert_eq!(estimate, dec!(0.013));

    let sent = h.provider.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].destination, TEST_NUMBER);
    assert_eq!(
        sent[0].status_callback_url,
        format!("http://dialer.test/api/v1/webhooks/status?call_id={}", record.id)
    );
}

#[tokio::test]
async fn test_exhausted_budget_never_dials() {
    let h = harness(Setup {
        daily: dec!(0.01),
        ..Setup::default()
    })
    .await;
    h.budget.add_spend(dec!(0.01)).await.unwrap();

    let record = h.place_one().await;

    assert_eq!(record.status, CallStatus::Failed);
    assert!(record.error_detail.as_deref().unwrap().contains("budget"));
    assert!(record.ended_at.is_some());
    assert_eq!(h.provider.invocations(), 0);
    assert_eq!(h.daily_spend().await, dec!(0.01));
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let h = harness(Setup::default()).await;
    h.provider
        .fail_times(2, ProviderError::Transient("connection reset".into()));

    let record = h.place_one().await;

    assert_eq!(record.status, CallStatus::InProgress);
    assert_eq!(h.provider.invocations(), 3);
    assert_eq!(record.attempts, 3);
    assert_eq!(h.daily_spend().await, dec!(0.013));
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_call() {
    let h = harness(Setup::default()).await;
    h.provider.fail_times(3, ProviderError::Transient("timeout".into()));

    let record = h.place_one().await;

    assert_eq!(record.status, CallStatus::Failed);
    assert_eq!(h.provider.invocations(), 3);
    let detail = record.error_detail.unwrap();
    assert!(detail.contains("timeout"));
    assert!(detail.contains("3 attempts"));
    assert!(record.ended_at.is_some());
    assert_eq!(h.daily_spend().await, Decimal::ZERO);
}

#[tokio::test]
async fn test_failed_dial_refunds_its_reservation() {
    let h = harness(Setup {
        daily: dec!(0.02),
        ..Setup::default()
    })
    .await;
    h.provider.push_outcome(FakeOutcome::Fail(ProviderError::Permanent(
        "21215: geo permission".into(),
    )));

    let failed = h.place_one().await;
    assert_eq!(failed.status, CallStatus::Failed);
    assert_eq!(h.daily_spend().await, Decimal::ZERO);

    // The refunded allowance pays for the next call
    let placed = h.place_one().await;
    assert_eq!(placed.status, CallStatus::InProgress);
    assert_eq!(h.daily_spend().await, dec!(0.013));
}

#[tokio::test]
async fn test_authentication_error_is_not_retried() {
    let h = harness(Setup::default()).await;
    h.provider.push_outcome(FakeOutcome::Fail(ProviderError::Authentication(
        "20003".into(),
    )));

    let record = h.place_one().await;

    assert_eq!(record.status, CallStatus::Failed);
    assert_eq!(h.provider.invocations(), 1);
    assert!(record.error_detail.unwrap().contains("authentication"));
    assert_eq!(h.daily_spend().await, Decimal::ZERO);
}

#[tokio::test]
async fn test_unsafe_destination_fails_without_retry() {
    let h = harness(Setup {
        provider_safety: SafetyPolicy::restricted(["+1500555"]),
        ..Setup::default()
    })
    .await;

    let records = h
        .enqueuer
        .create_records(vec![request("+15551234567")])
        .await
        .unwrap();
    let record = h.processor.process(records[0].id).await.unwrap();

    assert_eq!(record.status, CallStatus::Failed);
    assert!(record.error_detail.unwrap().contains("Unsafe destination"));
    assert!(record.ended_at.is_some());
    assert_eq!(h.provider.invocations(), 1);
    assert_eq!(h.daily_spend().await, Decimal::ZERO);
}

#[tokio::test]
async fn test_processing_is_idempotent() {
    let h = harness(Setup::default()).await;
    let record = h.place_one().await;

    let again = h.processor.process(record.id).await.unwrap();

    assert_eq!(again.status, CallStatus::InProgress);
    assert_eq!(again.provider_call_id, record.provider_call_id);
    assert_eq!(h.provider.invocations(), 1);
    assert_eq!(h.daily_spend().await, dec!(0.013));
}

#[tokio::test]
async fn test_missing_record() {
    let h = harness(Setup::default()).await;
    let err = h.processor.process(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AppError::CallNotFound(_)));
}

// ==================== Enqueueing ====================

#[tokio::test]
async fn test_invalid_batch_creates_nothing() {
    let h = harness(Setup::default()).await;

    let err = h
        .enqueuer
        .enqueue_many(
            vec![request(TEST_NUMBER), request("call me maybe")],
            Duration::ZERO,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidDestination(_)));
    assert!(err.to_string().contains("call 1"));
    assert_eq!(h.store.call_count(), 0);
}

#[tokio::test]
async fn test_restricted_mode_rejects_batch() {
    let h = harness(Setup {
        contact_safety: SafetyPolicy::restricted(["+1"]),
        ..Setup::default()
    })
    .await;

    let err = h
        .enqueuer
        .create_records(vec![request("+442079460958")])
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::UnsafeDestination(_)));
    assert_eq!(h.store.call_count(), 0);
}

#[tokio::test]
async fn test_do_not_call_contact_rejected() {
    let h = harness(Setup::default()).await;
    let contact = h.contacts.create(TEST_NUMBER, None, None, vec![]).await.unwrap();
    h.contacts
        .bulk_set_status(&[contact.id], ContactStatus::DoNotCall)
        .await
        .unwrap();

    let err = h
        .enqueuer
        .create_records(vec![request(TEST_NUMBER)])
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(h.store.call_count(), 0);
}

#[tokio::test]
async fn test_same_number_reuses_contact() {
    let h = harness(Setup::default()).await;
    let records = h
        .enqueuer
        .create_records(vec![request(TEST_NUMBER), request("1-500-555-0006")])
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].contact_id, records[1].contact_id);
    assert_ne!(records[0].id, records[1].id);
    assert!(records.iter().all(|r| r.status == CallStatus::Pending));
}

#[tokio::test]
async fn test_enqueue_runs_scheduled_jobs() {
    let h = harness(Setup::default()).await;
    let records = h
        .enqueuer
        .enqueue_many(
            vec![request(TEST_NUMBER), request("+15005550007")],
            Duration::ZERO,
        )
        .await
        .unwrap();

    for record in &records {
        wait_for(&h.store, record.id, CallStatus::InProgress).await;
    }
    assert_eq!(h.provider.invocations(), 2);
    assert_eq!(h.daily_spend().await, dec!(0.026));
}

#[tokio::test]
async fn test_stagger_defers_later_calls() {
    let h = harness(Setup::default()).await;
    let records = h
        .enqueuer
        .enqueue_many(
            vec![request(TEST_NUMBER), request("+15005550007")],
            Duration::from_secs(600),
        )
        .await
        .unwrap();

    wait_for(&h.store, records[0].id, CallStatus::InProgress).await;

    let second = load(&h.store, records[1].id).await;
    assert_eq!(second.status, CallStatus::Pending);
    assert!(h.scheduler.is_scheduled(second.id));

    let canceled = h.cancellation.cancel(second.id).await.unwrap();
    assert_eq!(canceled.status, CallStatus::Canceled);
    assert!(!h.scheduler.is_scheduled(second.id));
    assert_eq!(h.provider.invocations(), 1);
}

#[tokio::test]
async fn test_resume_reschedules_unplaced_records() {
    let h = harness(Setup::default()).await;
    let mut later = request("+15005550007");
    later.scheduled_at = Some(Utc::now() + chrono::Duration::hours(1));

    // Records left behind by a process that stopped before dialing them
    let records = h
        .enqueuer
        .create_records(vec![request(TEST_NUMBER), later])
        .await
        .unwrap();
    assert_eq!(h.scheduler.pending(), 0);

    assert_eq!(h.enqueuer.resume_unplaced().await.unwrap(), 2);

    let placed = wait_for(&h.store, records[0].id, CallStatus::InProgress).await;
    assert!(placed.provider_call_id.is_some());
    assert_eq!(load(&h.store, records[1].id).await.status, CallStatus::Pending);
    assert!(h.scheduler.is_scheduled(records[1].id));
    assert_eq!(h.provider.invocations(), 1);

    // Already scheduled or already placed: nothing more to resume
    assert_eq!(h.enqueuer.resume_unplaced().await.unwrap(), 0);
}

// ==================== Status ingestion ====================

#[tokio::test]
async fn test_completed_callback_finalizes_cost() {
    let h = harness(Setup::default()).await;
    let placed = h.place_one().await;
    let pid = placed.provider_call_id.clone().unwrap();

    let outcome = h
        .ingestion
        .apply_status(&StatusUpdate::new(pid, "completed", Some(60)), None)
        .await
        .unwrap();

    let record = match outcome {
        IngestOutcome::Applied(record) => record,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(record.status, CallStatus::Completed);
    assert_eq!(record.cost, Some(dec!(0.013)));
    assert_eq!(record.duration_seconds, Some(60));
    assert!(record.ended_at.is_some());

    // No re-debit on completion
    assert_eq!(h.daily_spend().await, dec!(0.013));
}

#[tokio::test]
async fn test_redelivered_callback_is_discarded() {
    let h = harness(Setup::default()).await;
    let placed = h.place_one().await;
    let pid = placed.provider_call_id.clone().unwrap();

    h.ingestion
        .apply_status(&StatusUpdate::new(pid.clone(), "completed", Some(90)), None)
        .await
        .unwrap();
    let finished = load(&h.store, placed.id).await;

    let outcome = h
        .ingestion
        .apply_status(&StatusUpdate::new(pid, "failed", None), None)
        .await
        .unwrap();

    assert!(matches!(outcome, IngestOutcome::AlreadyTerminal(_)));
    let after = load(&h.store, placed.id).await;
    assert_eq!(after.status, CallStatus::Completed);
    assert_eq!(after.cost, finished.cost);
    assert_eq!(after.ended_at, finished.ended_at);
}

#[tokio::test]
async fn test_failed_record_ignores_callbacks() {
    let h = harness(Setup {
        daily: dec!(0.001),
        ..Setup::default()
    })
    .await;
    let failed = h.place_one().await;
    assert_eq!(failed.status, CallStatus::Failed);

    let outcome = h
        .ingestion
        .apply_status(
            &StatusUpdate::new("CAdeadbeef", "completed", Some(60)),
            Some(failed.id),
        )
        .await
        .unwrap();

    assert!(matches!(outcome, IngestOutcome::AlreadyTerminal(_)));
    let after = load(&h.store, failed.id).await;
    assert_eq!(after.status, CallStatus::Failed);
    assert_eq!(after.cost, None);
    assert_eq!(after.error_detail, failed.error_detail);
}

#[tokio::test]
async fn test_canceled_record_ignores_callbacks() {
    let h = harness(Setup::default()).await;
    let placed = h.place_one().await;
    let pid = placed.provider_call_id.clone().unwrap();
    h.cancellation.cancel(placed.id).await.unwrap();

    let outcome = h
        .ingestion
        .apply_status(&StatusUpdate::new(pid, "completed", Some(60)), None)
        .await
        .unwrap();

    assert!(matches!(outcome, IngestOutcome::AlreadyTerminal(_)));
    assert_eq!(load(&h.store, placed.id).await.status, CallStatus::Canceled);
}

#[tokio::test]
async fn test_unknown_provider_call_is_discarded() {
    let h = harness(Setup::default()).await;
    let outcome = h
        .ingestion
        .apply_status(&StatusUpdate::new("CAnever", "completed", Some(5)), None)
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::UnknownRecord));
}

#[tokio::test]
async fn test_ringing_after_acceptance_changes_nothing() {
    let h = harness(Setup::default()).await;
    let placed = h.place_one().await;
    let pid = placed.provider_call_id.clone().unwrap();

    let outcome = h
        .ingestion
        .apply_status(&StatusUpdate::new(pid, "ringing", None), None)
        .await
        .unwrap();

    assert!(matches!(outcome, IngestOutcome::Unchanged(_)));
    let after = load(&h.store, placed.id).await;
    assert_eq!(after.status, CallStatus::InProgress);
    assert_eq!(after.started_at, placed.started_at);
}

#[tokio::test]
async fn test_no_answer_and_recording() {
    let h = harness(Setup::default()).await;
    let placed = h.place_one().await;
    let mut update = StatusUpdate::new(placed.provider_call_id.clone().unwrap(), "no-answer", Some(0));
    update.recording_url = Some("https://api.twilio.com/rec/RE1".to_string());
    update.recording_duration_seconds = Some(3);

    h.ingestion.apply_status(&update, None).await.unwrap();

    let after = load(&h.store, placed.id).await;
    assert_eq!(after.status, CallStatus::NoAnswer);
    assert_eq!(after.cost, Some(dec!(0.013)));
    assert_eq!(after.recording.unwrap().duration_seconds, Some(3));
    assert!(after.ended_at.is_some());
}

#[tokio::test]
async fn test_reconcile_applies_polled_status() {
    let h = harness(Setup::default()).await;
    let placed = h.place_one().await;
    let pid = placed.provider_call_id.clone().unwrap();
    h.provider.set_status(
        &pid,
        FetchedStatus {
            status: ProviderStatus::Completed,
            duration_seconds: Some(120),
            cost: None,
        },
    );

    let outcome = h.ingestion.reconcile(placed.id).await.unwrap();

    assert!(matches!(outcome, IngestOutcome::Applied(_)));
    let after = load(&h.store, placed.id).await;
    assert_eq!(after.status, CallStatus::Completed);
    assert_eq!(after.cost, Some(dec!(0.026)));
}

#[tokio::test]
async fn test_callback_before_placement_is_stored() {
    let h = harness(Setup::default()).await;
    let records = h.enqueuer.create_records(vec![request(TEST_NUMBER)]).await.unwrap();
    let id = records[0].id;

    // In-progress callback matched through the URL hint only
    let outcome = h
        .ingestion
        .apply_status(&StatusUpdate::new("CAearly", "in-progress", None), Some(id))
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Ignored(_)));

    let mut record = load(&h.store, id).await;
    record.transition(CallStatus::Queued, Utc::now());
    assert!(CallRepository::update(&*h.store, &mut record).await.unwrap());

    let outcome = h
        .ingestion
        .apply_status(&StatusUpdate::new("CAearly", "in-progress", None), Some(id))
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Applied(_)));

    let stored = load(&h.store, id).await;
    assert_eq!(stored.status, CallStatus::InProgress);
    assert_eq!(stored.provider_call_id.as_deref(), Some("CAearly"));
    assert_eq!(
        h.store.find_by_provider_call_id("CAearly").await.unwrap().map(|r| r.id),
        Some(id)
    );
}

// ==================== Cancellation ====================

#[tokio::test]
async fn test_cancel_live_call_hangs_up() {
    let h = harness(Setup::default()).await;
    let placed = h.place_one().await;

    let canceled = h.cancellation.cancel(placed.id).await.unwrap();

    assert_eq!(canceled.status, CallStatus::Canceled);
    assert!(canceled.ended_at.is_some());
    assert_eq!(h.provider.canceled(), vec![placed.provider_call_id.unwrap()]);
}

#[tokio::test]
async fn test_upstream_cancel_failure_does_not_block() {
    let h = harness(Setup::default()).await;
    let placed = h.place_one().await;
    h.provider
        .fail_cancels(ProviderError::Transient("503".into()));

    let canceled = h.cancellation.cancel(placed.id).await.unwrap();

    assert_eq!(canceled.status, CallStatus::Canceled);
    assert_eq!(load(&h.store, placed.id).await.status, CallStatus::Canceled);
}

#[tokio::test]
async fn test_cancel_finished_call() {
    let h = harness(Setup::default()).await;
    let placed = h.place_one().await;
    h.ingestion
        .apply_status(
            &StatusUpdate::new(placed.provider_call_id.clone().unwrap(), "busy", None),
            None,
        )
        .await
        .unwrap();

    let err = h.cancellation.cancel(placed.id).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let records = h.enqueuer.create_records(vec![request(TEST_NUMBER)]).await.unwrap();
    let first = h.cancellation.cancel(records[0].id).await.unwrap();
    let second = h.cancellation.cancel(records[0].id).await.unwrap();
    assert_eq!(first.ended_at, second.ended_at);
    assert_eq!(second.status, CallStatus::Canceled);
}

// ==================== Budget ====================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_jobs_stay_under_daily_cap() {
    let h = harness(Setup {
        daily: dec!(0.02),
        dial_latency: Duration::from_millis(50),
        ..Setup::default()
    })
    .await;

    let records = h
        .enqueuer
        .enqueue_many(
            vec![
                request(TEST_NUMBER),
                request("+15005550007"),
                request("+15005550008"),
            ],
            Duration::ZERO,
        )
        .await
        .unwrap();

    let mut placed = 0;
    for record in &records {
        let settled = wait_settled(&h.store, record.id).await;
        match settled.status {
            CallStatus::InProgress => placed += 1,
            CallStatus::Failed => {
                assert!(settled.error_detail.unwrap().contains("budget"));
            }
            other => panic!("unexpected status {}", other),
        }
    }

    assert_eq!(placed, 1);
    assert_eq!(h.provider.invocations(), 1);
    let ledger = h.budget.snapshot().await.unwrap();
    assert!(ledger.current_daily_spend() <= ledger.daily_limit());
    assert_eq!(ledger.current_daily_spend(), dec!(0.013));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_spend_is_not_lost() {
    let h = harness(Setup {
        daily: Decimal::ZERO,
        ..Setup::default()
    })
    .await;

    let mut handles = Vec::new();
    for _ in 0..50 {
        let budget = h.budget.clone();
        handles.push(tokio::spawn(async move {
            budget.add_spend(dec!(0.013)).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let ledger = h.budget.snapshot().await.unwrap();
    assert_eq!(ledger.current_daily_spend(), dec!(0.650));
    assert_eq!(ledger.current_monthly_spend(), dec!(0.650));
}
