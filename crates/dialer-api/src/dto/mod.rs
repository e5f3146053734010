//! Data Transfer Objects (DTOs) for API requests and responses

pub mod budget;
pub mod call;
pub mod common;
pub mod contact;
pub mod webhook;

pub use budget::*;
pub use call::*;
pub use common::*;
pub use contact::*;
pub use webhook::*;
