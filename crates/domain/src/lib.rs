//! # PolicyDesk Domain
//!
//! Business domain types and models for PolicyDesk.
//!
//! This crate contains:
//! - Entity types (Customer, Vehicle, Policy, User) and their change sets
//! - The local/remote field-name mapping tables
//! - Offline queue value types
//! - Domain error types and Result definitions
//! - Configuration structures and constants
//!
//! ## Architecture
//! - No dependencies on other PolicyDesk crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod mapping;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
