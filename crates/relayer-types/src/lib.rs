//! Shared types for the ZeroToll relayer.
//!
//! This crate defines the vocabulary used across the relayer workspace:
//! the RouterHub contract schema (intent struct and call interfaces),
//! ERC-4337 user operation types, HTTP API request/response types, and
//! the error taxonomy surfaced to API clients.

pub mod api;
pub mod errors;
pub mod execution;
pub mod router;
pub mod userop;

pub use api::*;
pub use errors::*;
pub use execution::*;
pub use router::*;
pub use userop::*;
