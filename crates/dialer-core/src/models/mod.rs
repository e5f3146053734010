//! Domain models for the campaign dialer
//!
//! This module contains all the core domain models used throughout the application.

pub mod budget;
pub mod call;
pub mod contact;
pub mod pricing;
pub mod provider;
pub mod request;
pub mod safety;

pub use budget::{BudgetLedger, Remaining, DEFAULT_LEDGER_NAME};
pub use call::{CallRecord, CallStatus, Recording, Transition};
pub use contact::{Contact, ContactStatus, MAX_TAGS, MAX_TAG_LENGTH};
pub use pricing::{PriceEntry, PricingTable};
pub use provider::{FetchedStatus, PlaceCallRequest, PlacedCall, ProviderStatus};
pub use request::{CallRequest, StatusUpdate};
pub use safety::SafetyPolicy;
