//! Campaign execution services
//!
//! This crate contains the business logic that turns call requests into
//! provider calls and provider callbacks into finished call records.
//!
//! # Architecture
//!
//! Services are designed to be composable and testable:
//! - Each service owns its dependencies as trait objects (repositories, provider)
//! - Services are wrapped in Arc for safe sharing across async tasks
//! - All operations are instrumented with tracing
//! - Classified failures finalize records; everything else surfaces as AppError
//!
//! # Services
//!
//! - `BudgetLedgerService` - Daily and monthly spend caps with lazy calendar reset
//! - `JobProcessor` - Pre-flight, retries and placement of one call record
//! - `JobScheduler` - Delayed, bounded-concurrency execution of processor jobs
//! - `BatchEnqueuer` - Validation and staggered scheduling of call batches
//! - `StatusIngestion` - Provider status callbacks and polling onto records
//! - `CancellationService` - Operator cancellation of queued or live calls
//! - `ContactService` - Contact creation, tagging and lifecycle status

pub mod budget;
pub mod cancellation;
pub mod contacts;
pub mod enqueuer;
pub mod ingestion;
pub mod job_processor;
pub mod retry;
pub mod scheduler;

pub use budget::{BudgetLedgerService, Reservation};
pub use cancellation::CancellationService;
pub use contacts::ContactService;
pub use enqueuer::BatchEnqueuer;
pub use ingestion::{IngestOutcome, StatusIngestion};
pub use job_processor::JobProcessor;
pub use retry::RetryPolicy;
pub use scheduler::JobScheduler;

/// Business logic constants
pub mod constants {
    /// Path the provider posts status callbacks to
    pub const STATUS_CALLBACK_PATH: &str = "/api/v1/webhooks/status";

    /// Largest batch accepted in one enqueue
    pub const MAX_BATCH_SIZE: usize = 1000;

    /// Upper bound on the stagger between two calls of a batch, in seconds
    pub const MAX_INTER_CALL_DELAY_SECS: u64 = 3600;
}
