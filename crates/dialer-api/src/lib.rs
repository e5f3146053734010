//! API layer for the campaign dialer
//!
//! HTTP handlers for batch enqueueing, call reporting and cancellation,
//! provider status callbacks, budget control and contact management.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;
pub mod state;

pub use dto::{ApiResponse, PaginationParams};
pub use handlers::configure_routes;
pub use state::AppState;
