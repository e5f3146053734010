//! Repository implementations
//!
//! This module contains concrete implementations of the repository traits
//! defined in dialer-core, using sqlx for PostgreSQL access.

pub mod budget_repo;
pub mod call_repo;
pub mod contact_repo;

pub use budget_repo::PgBudgetRepository;
pub use call_repo::PgCallRepository;
pub use contact_repo::PgContactRepository;
