//! Common traits for repositories and the telephony provider
//!
//! Defines abstractions for storage access and the external calling service.

use crate::error::{AppError, ProviderError};
use crate::models::{
    BudgetLedger, CallRecord, CallStatus, Contact, ContactStatus, FetchedStatus, PlaceCallRequest,
    PlacedCall,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Call record storage
#[async_trait]
pub trait CallRepository: Send + Sync {
    /// Insert a new record
    async fn insert(&self, record: &CallRecord) -> Result<CallRecord, AppError>;

    /// Find record by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<CallRecord>, AppError>;

    /// Find record by the provider-assigned call ID
    async fn find_by_provider_call_id(
        &self,
        provider_call_id: &str,
    ) -> Result<Option<CallRecord>, AppError>;

    /// Compare-and-swap write of the whole record
    ///
    /// Writes only when the stored row still carries `record.version` and is
    /// not terminal, then bumps `record.version`. Returns `false` when
    /// nothing was written because another writer got there first; reload
    /// and reapply the change.
    async fn update(&self, record: &mut CallRecord) -> Result<bool, AppError>;

    /// Pending or queued records without a provider call ID, oldest first
    ///
    /// These are the jobs lost when the process stopped before placing them.
    async fn list_unplaced(&self) -> Result<Vec<CallRecord>, AppError>;

    /// List records, newest first, with total count
    async fn list(
        &self,
        status: Option<CallStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<CallRecord>, i64), AppError>;
}

/// Contact storage
#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn insert(&self, contact: &Contact) -> Result<Contact, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Contact>, AppError>;

    /// Find contact by normalized phone number
    async fn find_by_phone(&self, phone_number: &str) -> Result<Option<Contact>, AppError>;

    async fn update(&self, contact: &Contact) -> Result<Contact, AppError>;

    /// Delete the contact and its call records
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;

    /// Update lifecycle status for many contacts, returning the number changed
    async fn set_status(&self, ids: &[Uuid], status: ContactStatus) -> Result<u64, AppError>;
}

/// Mutation applied to a ledger inside its critical section
///
/// Must be pure: no I/O, no awaiting.
pub type LedgerOp<'a> = &'a (dyn Fn(&mut BudgetLedger) -> Result<(), AppError> + Send + Sync);

/// Budget ledger storage
#[async_trait]
pub trait BudgetRepository: Send + Sync {
    /// Insert the ledger if no row with its name exists; returns the stored row
    async fn ensure(&self, ledger: &BudgetLedger) -> Result<BudgetLedger, AppError>;

    async fn get(&self, name: &str) -> Result<Option<BudgetLedger>, AppError>;

    /// Lock the row, apply `op`, write it back, and return the new state
    ///
    /// The row stays untouched when `op` fails.
    async fn modify(&self, name: &str, op: LedgerOp<'_>) -> Result<BudgetLedger, AppError>;
}

/// Telephony provider client
///
/// One production implementation speaks HTTP to the provider; a fake one
/// drives tests. Every failure is classified through [`ProviderError`].
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Submit an outbound call
    ///
    /// Malformed or disallowed destinations fail before any network call.
    async fn place_call(&self, request: &PlaceCallRequest) -> Result<PlacedCall, ProviderError>;

    /// Current provider-side status of a call
    async fn fetch_status(&self, provider_call_id: &str) -> Result<FetchedStatus, ProviderError>;

    /// Cancel or hang up a call
    async fn cancel_call(&self, provider_call_id: &str) -> Result<(), ProviderError>;

    /// Per-minute rate for a destination
    fn rate_per_minute(&self, destination: &str) -> Decimal;

    /// Deterministic pre-flight cost estimate
    fn estimate_cost(&self, destination: &str) -> Decimal;
}

/// Pagination parameters
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 1000),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };

        Self {
            total,
            page,
            per_page,
            total_pages,
        }
    }
}
