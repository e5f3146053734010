//! Campaign Dialer Storage Layer
//!
//! This crate provides storage for call records, contacts and budget ledgers.
//! It includes:
//!
//! - Connection pool management and embedded migrations with sqlx
//! - PostgreSQL repository implementations, with row-locked ledger updates
//! - An in-memory backend implementing the same repository traits

pub mod memory;
pub mod pool;
pub mod repositories;

pub use memory::InMemoryStore;
pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use dialer_core::{AppError, AppResult};
pub use sqlx::PgPool;
