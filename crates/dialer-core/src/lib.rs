//! Campaign Dialer Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the call campaign execution engine. It includes:
//!
//! - Domain models (Contact, CallRecord and its state machine, BudgetLedger, PricingTable)
//! - Repository and telephony provider traits
//! - Unified error handling with HTTP response mapping and provider error classification
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::{AppError, ErrorClass, ProviderError};

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
