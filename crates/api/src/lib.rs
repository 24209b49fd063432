//! # PolicyDesk API
//!
//! Application layer - commands and main entry point.
//!
//! This crate contains:
//! - Commands (UI → backend bridge)
//! - Application context (dependency injection)
//! - Main entry point and setup
//!
//! ## Architecture
//! - Depends on `domain`, `core`, and `infra`
//! - Wires the local store, offline queue and sync orchestrator together

pub mod commands;
pub mod context;
pub mod utils;

pub use commands::*;
pub use context::*;
