//! Shared application state handed to every handler

use dialer_core::traits::CallRepository;
use dialer_services::{
    BatchEnqueuer, BudgetLedgerService, CancellationService, ContactService, StatusIngestion,
};
use std::sync::Arc;
use std::time::Duration;

pub struct AppState {
    pub calls: Arc<dyn CallRepository>,
    pub budget: Arc<BudgetLedgerService>,
    pub contacts: Arc<ContactService>,
    pub enqueuer: Arc<BatchEnqueuer>,
    pub ingestion: Arc<StatusIngestion>,
    pub cancellation: Arc<CancellationService>,
    /// Stagger used when a batch request does not set one
    pub default_inter_call_delay: Duration,
}
