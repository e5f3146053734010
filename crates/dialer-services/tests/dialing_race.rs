//! An operator cancel landing while `PlaceCall` is in flight

use async_trait::async_trait;
use chrono::Utc;
use dialer_core::models::{
    CallRecord, CallStatus, Contact, FetchedStatus, PlaceCallRequest, PlacedCall,
    ProviderStatus, DEFAULT_LEDGER_NAME,
};
use dialer_core::traits::{CallRepository, ContactRepository, ProviderClient};
use dialer_core::{AppResult, ProviderError};
use dialer_db::InMemoryStore;
use dialer_services::{
    BudgetLedgerService, CancellationService, JobProcessor, JobScheduler, RetryPolicy,
};
use mockall::mock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

mock! {
    pub Provider {}

    #[async_trait]
    impl ProviderClient for Provider {
        async fn place_call(&self, request: &PlaceCallRequest) -> Result<PlacedCall, ProviderError>;
        async fn fetch_status(&self, provider_call_id: &str) -> Result<FetchedStatus, ProviderError>;
        async fn cancel_call(&self, provider_call_id: &str) -> Result<(), ProviderError>;
        fn rate_per_minute(&self, destination: &str) -> Decimal;
        fn estimate_cost(&self, destination: &str) -> Decimal;
    }
}

/// Store whose writes of a canceled record reach the backend late
struct SlowCancelStore {
    inner: Arc<InMemoryStore>,
    delay: Duration,
}

#[async_trait]
impl CallRepository for SlowCancelStore {
    async fn insert(&self, record: &CallRecord) -> AppResult<CallRecord> {
        CallRepository::insert(&*self.inner, record).await
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<CallRecord>> {
        CallRepository::find_by_id(&*self.inner, id).await
    }

    async fn find_by_provider_call_id(&self, provider_call_id: &str) -> AppResult<Option<CallRecord>> {
        self.inner.find_by_provider_call_id(provider_call_id).await
    }

    async fn update(&self, record: &mut CallRecord) -> AppResult<bool> {
        if record.status == CallStatus::Canceled {
            tokio::time::sleep(self.delay).await;
        }
        CallRepository::update(&*self.inner, record).await
    }

    async fn list(
        &self,
        status: Option<CallStatus>,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<CallRecord>, i64)> {
        self.inner.list(status, limit, offset).await
    }

    async fn list_unplaced(&self) -> AppResult<Vec<CallRecord>> {
        self.inner.list_unplaced().await
    }
}

async fn pending_record(store: &InMemoryStore) -> CallRecord {
    let contact = Contact::new("+15005550006", None, None, Vec::new()).unwrap();
    ContactRepository::insert(store, &contact).await.unwrap();

    let record = CallRecord::new(contact.id, contact.phone_number.clone(), None, None, None);
    CallRepository::insert(store, &record).await.unwrap()
}

#[tokio::test]
async fn test_cancel_during_dial_hangs_up_and_still_debits() {
    let store = Arc::new(InMemoryStore::new());
    let record = pending_record(&store).await;

    let mut provider = MockProvider::new();
    provider.expect_estimate_cost().returning(|_| dec!(0.013));

    let racing_store = store.clone();
    let call_id = record.id;
    provider
        .expect_place_call()
        .times(1)
        .returning(move |_| {
            // Operator cancels while the provider request is on the wire
            futures::executor::block_on(async {
                let mut current = CallRepository::find_by_id(&*racing_store, call_id)
                    .await
                    .unwrap()
                    .unwrap();
                current.cancel(Utc::now());
                assert!(CallRepository::update(&*racing_store, &mut current).await.unwrap());
            });
            Ok(PlacedCall {
                provider_call_id: "CA00000000000000000000000000000001".to_string(),
                status: ProviderStatus::Queued,
            })
        });
    provider.expect_cancel_call().times(1).returning(|_| Ok(()));

    let budget = Arc::new(
        BudgetLedgerService::open(store.clone(), DEFAULT_LEDGER_NAME, dec!(10), Decimal::ZERO)
            .await
            .unwrap(),
    );
    let processor = JobProcessor::new(
        store.clone(),
        Arc::new(provider),
        budget.clone(),
        RetryPolicy::immediate(3),
        "http://dialer.test",
        30,
    );

    let result = processor.process(record.id).await.unwrap();

    assert_eq!(result.status, CallStatus::Canceled);
    assert!(result.provider_call_id.is_none());
    assert_eq!(
        budget.snapshot().await.unwrap().current_daily_spend(),
        dec!(0.013)
    );
}

#[tokio::test]
async fn test_cancel_read_before_placement_hangs_up_stored_call() {
    const PROVIDER_CALL_ID: &str = "CA00000000000000000000000000000002";

    let store = Arc::new(InMemoryStore::new());
    let record = pending_record(&store).await;

    let mut provider = MockProvider::new();
    provider.expect_estimate_cost().returning(|_| dec!(0.013));
    provider.expect_place_call().times(1).returning(|_| {
        Ok(PlacedCall {
            provider_call_id: PROVIDER_CALL_ID.to_string(),
            status: ProviderStatus::Queued,
        })
    });
    provider
        .expect_cancel_call()
        .withf(|pid| pid == PROVIDER_CALL_ID)
        .times(1)
        .returning(|_| Ok(()));
    let provider = Arc::new(provider);

    let budget = Arc::new(
        BudgetLedgerService::open(store.clone(), DEFAULT_LEDGER_NAME, dec!(10), Decimal::ZERO)
            .await
            .unwrap(),
    );
    let processor = Arc::new(JobProcessor::new(
        store.clone(),
        provider.clone(),
        budget.clone(),
        RetryPolicy::immediate(3),
        "http://dialer.test",
        30,
    ));
    let scheduler = Arc::new(JobScheduler::new(processor.clone(), 1));
    let cancellation = CancellationService::new(
        Arc::new(SlowCancelStore {
            inner: store.clone(),
            delay: Duration::from_millis(100),
        }),
        provider,
        scheduler,
    );

    // Cancel reads the pending record, then its write stalls while the job
    // places the call and stores the provider ID
    let (canceled, processed) = tokio::join!(cancellation.cancel(record.id), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        processor.process(record.id).await
    });

    let processed = processed.unwrap();
    assert_eq!(processed.status, CallStatus::InProgress);

    let canceled = canceled.unwrap();
    assert_eq!(canceled.status, CallStatus::Canceled);
    assert_eq!(canceled.provider_call_id.as_deref(), Some(PROVIDER_CALL_ID));

    let stored = CallRepository::find_by_id(&*store, record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, CallStatus::Canceled);
    assert_eq!(stored.provider_call_id.as_deref(), Some(PROVIDER_CALL_ID));
    assert_eq!(stored.cost, Some(dec!(0.013)));
    assert_eq!(
        budget.snapshot().await.unwrap().current_daily_spend(),
        dec!(0.013)
    );
}

#[tokio::test]
async fn test_permanent_rejection_is_not_retried() {
    let store = Arc::new(InMemoryStore::new());
    let record = pending_record(&store).await;

    let mut provider = MockProvider::new();
    provider.expect_estimate_cost().returning(|_| dec!(0.013));
    provider
        .expect_place_call()
        .times(1)
        .returning(|_| Err(ProviderError::Permanent("21215: geo permission".into())));
    provider.expect_cancel_call().never();

    let budget = Arc::new(
        BudgetLedgerService::open(store.clone(), DEFAULT_LEDGER_NAME, Decimal::ZERO, Decimal::ZERO)
            .await
            .unwrap(),
    );
    let processor = JobProcessor::new(
        store.clone(),
        Arc::new(provider),
        budget.clone(),
        RetryPolicy::immediate(5),
        "http://dialer.test",
        30,
    );

    let result = processor.process(record.id).await.unwrap();

    assert_eq!(result.status, CallStatus::Failed);
    assert_eq!(result.attempts, 1);
    assert!(result.error_detail.unwrap().contains("21215"));
    assert_eq!(
        budget.snapshot().await.unwrap().current_daily_spend(),
        Decimal::ZERO
    );
}
